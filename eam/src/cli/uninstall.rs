// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Parser;
use thiserror::Error;

use crate::appid::AppId;
use crate::cli::Env;
use crate::daemon;
use crate::transaction::{Transaction, Uninstall};

#[derive(Debug, Parser)]
#[command(about = "Remove an installed application")]
pub struct Command {
    appid: String,
    #[arg(long, help = "Succeed even if the app isn't installed; requires running with privileges")]
    force: bool,
}

pub async fn handle(command: Command, env: Env) -> Result<(), Error> {
    let app: AppId = command.appid.parse()?;

    if env.privileged {
        let prefix = match daemon::resolve_installed_prefix(&env.config, &app) {
            Some(prefix) => prefix,
            None if command.force => return Ok(()),
            None => env.config.applications_dir.clone(),
        };
        let txn = Transaction::Uninstall(Uninstall { app, prefix, force: command.force });
        txn.run(&env.config, &eam_cancel::Token::new()).await.map_err(Error::Transaction)
    } else {
        let connection = zbus::Connection::system().await.map_err(Error::Bus)?;
        let root = crate::client::root(&connection).await.map_err(Error::Bus)?;
        root.uninstall(app.as_str()).await.map_err(Error::Bus)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    IllegalAppId(#[from] crate::appid::Error),
    #[error("transaction")]
    Transaction(#[source] crate::transaction::Error),
    #[error("bus")]
    Bus(#[source] zbus::Error),
}
