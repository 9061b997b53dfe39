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
use crate::cli::install::Storage;
use crate::transaction::{Transaction, Update};

#[derive(Debug, Parser)]
#[command(about = "Update an installed application to a new bundle")]
pub struct Command {
    appid: String,
    bundle: PathBuf,
    #[arg(long, help = "Path to the detached signature, defaults to <bundle>.asc")]
    signature: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Storage::Primary, help = "Where the app is currently installed")]
    source_storage: Storage,
    #[arg(long, value_enum, default_value_t = Storage::Primary, help = "Where the updated app should land")]
    target_storage: Storage,
}

pub async fn handle(command: Command, env: Env) -> Result<(), Error> {
    let app: AppId = command.appid.parse()?;

    if env.privileged {
        let src_prefix = storage_dir(&env, command.source_storage);
        let tgt_prefix = storage_dir(&env, command.target_storage);
        let txn = Transaction::Update(Update {
            app,
            src_prefix,
            tgt_prefix,
            bundle: command.bundle,
            signature: command.signature,
        });
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

fn storage_label(storage: Storage) -> &'static str {
    match storage {
        Storage::Primary => "primary",
        Storage::Secondary => "secondary",
    }
}

async fn run_over_bus(command: Command, app: AppId) -> Result<(), Error> {
    let connection = zbus::Connection::system().await.map_err(Error::Bus)?;
    let root = crate::client::root(&connection).await.map_err(Error::Bus)?;
    let path = root.update(app.as_str()).await.map_err(Error::Bus)?;
    let txn = crate::client::transaction(&connection, &path).await.map_err(Error::Bus)?;

    let mut opts: HashMap<&str, Value<'_>> = HashMap::new();
    opts.insert("BundlePath", Value::from(command.bundle.to_string_lossy().into_owned()));
    if let Some(sig) = &command.signature {
        opts.insert("SignaturePath", Value::from(sig.to_string_lossy().into_owned()));
    }
    opts.insert("SourceStorageType", Value::from(storage_label(command.source_storage)));
    opts.insert("TargetStorageType", Value::from(storage_label(command.target_storage)));

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
