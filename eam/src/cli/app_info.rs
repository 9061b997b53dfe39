// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Parser;
use eam_bundle::manifest::Manifest;
use thiserror::Error;

use crate::appid::AppId;
use crate::cli::Env;

#[derive(Debug, Parser)]
#[command(about = "Show details about an installed application")]
pub struct Command {
    appid: String,
}

pub fn handle(command: Command, env: Env) -> Result<(), Error> {
    let app: AppId = command.appid.parse()?;
    let app_dir = env.config.applications_dir.join(app.as_str());

    if !eam_fslayout::is_app_dir(&app_dir) {
        return Err(Error::NotInstalled(app));
    }

    let manifest = Manifest::parse_file(&app_dir.join(".info"))?;

    println!("{app}─┬─path───{}", app_dir.display());
    match &manifest.external {
        None => println!("  └─no external scripts"),
        Some(external) => {
            println!("  └─external─┬─url───{}", external.url);
            println!("             └─sha256───{}", external.sha256sum);
        }
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    IllegalAppId(#[from] crate::appid::Error),
    #[error("{0} is not installed")]
    NotInstalled(AppId),
    #[error("could not read manifest")]
    Manifest(#[from] eam_bundle::manifest::Error),
}
