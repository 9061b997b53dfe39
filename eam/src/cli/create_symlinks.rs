// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::appid::AppId;
use crate::cli::Env;

#[derive(Debug, Parser)]
#[command(about = "(Re)create an app's symlink farm entries")]
pub struct Command {
    appid: String,
    #[arg(long, help = "Prefix the app is installed under; defaults to the applications directory")]
    prefix: Option<PathBuf>,
    #[arg(long, help = "Move the farm entries to point at this prefix instead")]
    migrate_to: Option<PathBuf>,
}

pub fn handle(command: Command, env: Env) -> Result<(), Error> {
    let app: AppId = command.appid.parse()?;
    let prefix = command.prefix.unwrap_or_else(|| env.config.applications_dir.clone());

    match command.migrate_to {
        Some(migrate_to) => {
            eam_fslayout::prune_symlinks(&env.config.applications_dir, &prefix, app.as_str())?;
            eam_fslayout::create_symlinks(&env.config.applications_dir, &migrate_to, app.as_str())?;
        }
        None => {
            eam_fslayout::create_symlinks(&env.config.applications_dir, &prefix, app.as_str())?;
        }
    }

    if !eam_bundle::hooks::refresh_desktop_caches(&env.config.applications_dir) {
        return Err(Error::DesktopCacheRefresh);
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    IllegalAppId(#[from] crate::appid::Error),
    #[error("could not update symlink farm")]
    FsLayout(#[from] eam_fslayout::Error),
    #[error("desktop cache refresh failed")]
    DesktopCacheRefresh,
}
