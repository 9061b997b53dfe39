// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

pub mod appid;
pub mod auth;
pub mod client;
pub mod daemon;
pub mod environment;
pub mod logging;
pub mod remote_txn;
pub mod runtime;
pub mod signal;
pub mod tag;
pub mod transaction;

mod cli;

use thiserror::Error;

/// Parse argv, then either run the daemon or a single CLI subcommand.
pub async fn run() -> Result<(), Error> {
    cli::process().await.map_err(Error::Cli)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Cli(#[from] cli::Error),
}
