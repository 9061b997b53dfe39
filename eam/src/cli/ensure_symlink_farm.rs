// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Parser;
use thiserror::Error;

use crate::cli::Env;

#[derive(Debug, Parser)]
#[command(about = "Ensure the symlink farm exists and desktop caches are current")]
pub struct Command;

pub fn handle(_command: Command, env: Env) -> Result<(), Error> {
    eam_fslayout::sanity_check(&env.config.applications_dir)?;

    if !eam_bundle::hooks::refresh_desktop_caches(&env.config.applications_dir) {
        return Err(Error::DesktopCacheRefresh);
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not create symlink farm layout")]
    FsLayout(#[from] eam_fslayout::Error),
    #[error("desktop cache refresh failed")]
    DesktopCacheRefresh,
}
