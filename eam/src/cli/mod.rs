// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Parser;
use eam_config::ConfigSnapshot;
use nix::unistd::Uid;
use thiserror::Error;

mod app_info;
mod config;
mod create_symlinks;
mod ensure_symlink_farm;
mod init_fs;
mod install;
mod list_apps;
mod migrate;
mod uninstall;
mod update;
mod version;

#[derive(Debug, Parser)]
#[command(name = "eam", about = "Install, update, and remove application bundles")]
pub struct Command {
    #[command(subcommand)]
    pub subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    Install(install::Command),
    Update(update::Command),
    Uninstall(uninstall::Command),
    ListApps(list_apps::Command),
    AppInfo(app_info::Command),
    Config(config::Command),
    CreateSymlinks(create_symlinks::Command),
    Migrate(migrate::Command),
    InitFs(init_fs::Command),
    EnsureSymlinkFarm(ensure_symlink_farm::Command),
    Version(version::Command),
    /// Print this message.
    Help,
    /// Run as the long-lived bus service instead of a one-shot command.
    #[command(hide = true)]
    Daemon,
}

/// Everything a subcommand needs: the resolved configuration, and whether
/// this process may act directly instead of proxying through the bus.
pub struct Env {
    pub config: ConfigSnapshot,
    pub privileged: bool,
}

impl Env {
    pub fn load() -> Self {
        let config = eam_config::load(&eam_config::config_path());
        let privileged = crate::auth::is_privileged(Uid::effective());
        Env { config, privileged }
    }
}

pub async fn process() -> Result<(), Error> {
    let Command { subcommand } = Command::parse();

    if matches!(subcommand, Subcommand::Daemon) {
        let env = Env::load();
        return crate::daemon::run(env.config).await.map_err(Error::Daemon);
    }

    let env = Env::load();

    match subcommand {
        Subcommand::Install(command) => install::handle(command, env).await?,
        Subcommand::Update(command) => update::handle(command, env).await?,
        Subcommand::Uninstall(command) => uninstall::handle(command, env).await?,
        Subcommand::ListApps(command) => list_apps::handle(command, env)?,
        Subcommand::AppInfo(command) => app_info::handle(command, env)?,
        Subcommand::Config(command) => config::handle(command, env)?,
        Subcommand::CreateSymlinks(command) => create_symlinks::handle(command, env)?,
        Subcommand::Migrate(command) => migrate::handle(command, env)?,
        Subcommand::InitFs(command) => init_fs::handle(command, env)?,
        Subcommand::EnsureSymlinkFarm(command) => ensure_symlink_farm::handle(command, env)?,
        Subcommand::Version(command) => version::handle(command),
        Subcommand::Help => {
            use clap::CommandFactory;
            Command::command().print_long_help().ok();
        }
        Subcommand::Daemon => unreachable!("handled above"),
    }

    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("install")]
    Install(#[from] install::Error),
    #[error("update")]
    Update(#[from] update::Error),
    #[error("uninstall")]
    Uninstall(#[from] uninstall::Error),
    #[error("list-apps")]
    ListApps(#[from] list_apps::Error),
    #[error("app-info")]
    AppInfo(#[from] app_info::Error),
    #[error("config")]
    Config(#[from] config::Error),
    #[error("create-symlinks")]
    CreateSymlinks(#[from] create_symlinks::Error),
    #[error("migrate")]
    Migrate(#[from] migrate::Error),
    #[error("init-fs")]
    InitFs(#[from] init_fs::Error),
    #[error("ensure-symlink-farm")]
    EnsureSymlinkFarm(#[from] ensure_symlink_farm::Error),
    #[error("daemon")]
    Daemon(#[source] crate::daemon::Error),
}
