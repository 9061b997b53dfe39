// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::appid::AppId;
use crate::cli::Env;

#[derive(Debug, Parser)]
#[command(about = "Move an installed application from one storage prefix to another")]
pub struct Command {
    appid: String,
    from: PathBuf,
    to: PathBuf,
}

pub fn handle(command: Command, env: Env) -> Result<(), Error> {
    let app: AppId = command.appid.parse()?;

    let from_dir = command.from.join(app.as_str());
    if !eam_fslayout::is_app_dir(&from_dir) {
        return Err(Error::NotInstalled(app, command.from));
    }

    let to_dir = command.to.join(app.as_str());
    if eam_fslayout::is_app_dir(&to_dir) {
        return Ok(());
    }

    eam_fslayout::deploy_app(&command.from, &command.to, app.as_str())?;

    let _ = eam_fslayout::prune_symlinks(&env.config.applications_dir, &command.from, app.as_str());
    eam_fslayout::create_symlinks(&env.config.applications_dir, &command.to, app.as_str())?;

    let mut ok = true;
    if !eam_bundle::hooks::compile_python(&command.to, app.as_str()) {
        ok = false;
    }
    if !eam_bundle::hooks::refresh_desktop_caches(&env.config.applications_dir) {
        ok = false;
    }

    if ok { Ok(()) } else { Err(Error::PostMigrateHook) }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    IllegalAppId(#[from] crate::appid::Error),
    #[error("{0} is not installed under {1:?}")]
    NotInstalled(AppId, PathBuf),
    #[error("could not move application")]
    FsLayout(#[from] eam_fslayout::Error),
    #[error("a post-migration hook failed")]
    PostMigrateHook,
}
