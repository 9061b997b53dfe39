// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Parser;
use thiserror::Error;

use crate::cli::Env;

#[derive(Debug, Parser)]
#[command(about = "Create the symlink farm's directory layout")]
pub struct Command {
    #[arg(short, long)]
    verbose: bool,
}

pub fn handle(command: Command, env: Env) -> Result<(), Error> {
    eam_fslayout::sanity_check(&env.config.applications_dir)?;

    if command.verbose {
        println!("Creating farm directories under {:?}... ok", env.config.applications_dir);
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not create symlink farm layout")]
    FsLayout(#[from] eam_fslayout::Error),
}
