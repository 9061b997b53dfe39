// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use clap::Parser;
use eam_bundle::manifest::Manifest;
use thiserror::Error;

use crate::cli::Env;

#[derive(Debug, Parser)]
#[command(about = "List installed applications")]
pub struct Command {
    #[arg(short, long)]
    verbose: bool,
}

pub fn handle(command: Command, env: Env) -> Result<(), Error> {
    let mut apps = installed_apps(&env.config.applications_dir)?;
    apps.sort();

    for app_id in apps {
        if !command.verbose {
            println!("{app_id}");
            continue;
        }

        let info_path = env.config.applications_dir.join(&app_id).join(".info");
        match Manifest::parse_file(&info_path) {
            Ok(manifest) => print_manifest(&app_id, &manifest),
            Err(error) => eprintln!("{app_id}: could not read manifest: {error}"),
        }
    }

    Ok(())
}

fn installed_apps(applications_dir: &std::path::Path) -> Result<Vec<String>, Error> {
    let mut apps = Vec::new();

    let entries = match fs_err::read_dir(applications_dir) {
        Ok(entries) => entries,
        Err(source) => return Err(Error::ReadDir(applications_dir.to_owned(), source)),
    };

    for entry in entries {
        let entry = entry.map_err(|source| Error::ReadDir(applications_dir.to_owned(), source))?;
        let path = entry.path();
        if eam_fslayout::is_app_dir(&path) {
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                apps.push(name.to_owned());
            }
        }
    }

    Ok(apps)
}

fn print_manifest(app_id: &str, manifest: &Manifest) {
    println!("{app_id}─┬─path───{app_id}");
    match &manifest.external {
        None => println!("         └─version───{}", manifest.version),
        Some(external) => {
            println!("         ├─version───{}", manifest.version);
            println!("         └─external─┬─url───{}", external.url);
            println!("                    └─sha256───{}", external.sha256sum);
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not list {0:?}")]
    ReadDir(PathBuf, #[source] std::io::Error),
}
