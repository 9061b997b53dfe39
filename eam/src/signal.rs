// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Signal handling

use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};

/// Resolves once SIGHUP, SIGTERM, or SIGINT is received, for the daemon's
/// graceful-shutdown path: release the bus name and exit.
pub async fn shutdown_requested() -> Result<(), Error> {
    let mut hup = signal(SignalKind::hangup()).map_err(Error::Listen)?;
    let mut term = signal(SignalKind::terminate()).map_err(Error::Listen)?;
    let mut int = signal(SignalKind::interrupt()).map_err(Error::Listen)?;

    tokio::select! {
        _ = hup.recv() => Ok(()),
        _ = term.recv() => Ok(()),
        _ = int.recv() => Ok(()),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("listen for signal")]
    Listen(#[source] std::io::Error),
}
