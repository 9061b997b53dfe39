// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Parser;
use eam_config::{ConfigSnapshot, Setting};
use thiserror::Error;

use crate::cli::Env;

#[derive(Debug, Parser)]
#[command(about = "Read or change daemon configuration")]
pub struct Command {
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, clap::Subcommand)]
enum Action {
    /// Print a setting's current value.
    Get { key: String },
    /// Set a setting and persist it to the config file.
    Set { key: String, value: String },
    /// Remove a setting's override, reverting it to its default.
    Reset { key: String },
}

pub fn handle(command: Command, env: Env) -> Result<(), Error> {
    match command.action {
        Action::Get { key } => {
            let setting = Setting::parse(&key).ok_or_else(|| Error::UnknownKey(key.clone()))?;
            println!("{setting} = {}", display_value(&env.config, setting));
            Ok(())
        }
        Action::Set { key, value } => {
            let setting = Setting::parse(&key).ok_or_else(|| Error::UnknownKey(key.clone()))?;
            let path = eam_config::config_path();
            let snapshot = eam_config::set_key(&path, setting, &value)?;
            println!("{setting} = {}", display_value(&snapshot, setting));
            Ok(())
        }
        Action::Reset { key } => {
            let setting = Setting::parse(&key).ok_or_else(|| Error::UnknownKey(key.clone()))?;
            let path = eam_config::config_path();
            let snapshot = eam_config::reset_key(&path, setting)?;
            println!("{setting} = {}", display_value(&snapshot, setting));
            Ok(())
        }
    }
}

fn display_value(snapshot: &ConfigSnapshot, setting: Setting) -> String {
    match setting {
        Setting::ApplicationsDir => snapshot.applications_dir.display().to_string(),
        Setting::CacheDir => snapshot.cache_dir.display().to_string(),
        Setting::PrimaryStorage => snapshot.primary_storage.display().to_string(),
        Setting::SecondaryStorage => snapshot.secondary_storage.display().to_string(),
        Setting::GpgKeyring => snapshot.gpg_keyring.display().to_string(),
        Setting::InactivityTimeout => snapshot.inactivity_timeout.as_secs().to_string(),
        Setting::ServerUrl => snapshot.server_url.to_string(),
        Setting::ApiVersion => snapshot.api_version.clone(),
        Setting::EnableDeltaUpdates => snapshot.enable_delta_updates.to_string(),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown config key {0:?}")]
    UnknownKey(String),
    #[error("could not update config file")]
    Config(#[from] eam_config::Error),
}
