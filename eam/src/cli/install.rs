// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;
use zbus::zvariant::Value;

use crate::appid::AppId;
use crate::cli::Env;
use crate::transaction::{Install, Transaction};

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum Storage {
    Primary,
    Secondary,
}

#[derive(Debug, Parser)]
#[command(about = "Install an application bundle")]
pub struct Command {
    appid: String,
    bundle: PathBuf,
    #[arg(long, help = "Path to the detached signature, defaults to <bundle>.asc")]
    signature: Option<PathBuf>,
    #[arg(long, help = "Skip signature verification")]
    skip_signature: bool,
    #[arg(long, value_enum, default_value_t = Storage::Primary)]
    storage: Storage,
}

pub async fn handle(command: Command, env: Env) -> Result<(), Error> {
    let app: AppId = command.appid.parse()?;

    if env.privileged {
        let prefix = storage_dir(&env, command.storage);
        let signature = command.signature.clone().unwrap_or_else(|| default_signature_path(&command.bundle, &app));
        let txn = Transaction::Install(Install { app, prefix, bundle: command.bundle, signature, skip_sig: command.skip_signature });
        txn.run(&env.config, &eam_cancel::Token::new()).await.map_err(Error::Transaction)
    } else {
        run_over_bus(command, app).await
    }
}

fn storage_dir(env: &Env, storage: Storage) -> PathBuf {
    match storage {
        Storage::Primary => env.config.primary_storage.clone(),
        Storage::Secondary => env.config.secondary_storage.clone(),
    }
}

fn default_signature_path(bundle: &std::path::Path, app: &AppId) -> PathBuf {
    bundle.parent().unwrap_or_else(|| std::path::Path::new(".")).join(format!("{app}.asc"))
}

async fn run_over_bus(command: Command, app: AppId) -> Result<(), Error> {
    let connection = zbus::Connection::system().await.map_err(Error::Bus)?;
    let root = crate::client::root(&connection).await.map_err(Error::Bus)?;
    let path = root.install(app.as_str()).await.map_err(Error::Bus)?;
    let txn = crate::client::transaction(&connection, &path).await.map_err(Error::Bus)?;

    let mut opts: HashMap<&str, Value<'_>> = HashMap::new();
    opts.insert("BundlePath", Value::from(command.bundle.to_string_lossy().into_owned()));
    if let Some(sig) = &command.signature {
        opts.insert("SignaturePath", Value::from(sig.to_string_lossy().into_owned()));
    }
    opts.insert("StorageType", Value::from(match command.storage {
        Storage::Primary => "primary",
        Storage::Secondary => "secondary",
    }));

    txn.complete_transaction(opts).await.map_err(Error::Bus)?;
    Ok(())
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
