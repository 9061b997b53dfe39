// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The on-disk layout: bundle prefixes, the symlink farm, sanity checks, and
//! the recursive copy/move/remove primitives the transaction algorithms are
//! built from.
//!
//! This crate is stateless - every function takes the paths it needs as
//! arguments rather than reading a [`ConfigSnapshot`] itself, so the
//! transaction layer stays in full control of what gets touched.
//!
//! [`ConfigSnapshot`]: https://docs.rs/eam-config

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use ini::Ini;
use log::warn;
use thiserror::Error;

/// Root under which `applications_dir` is actually stored; `applications_dir`
/// itself is a symlink into this tree (matches the legacy `/endless -> /var/endless` layout).
const STORAGE_ROOT: &str = "/var";

/// Directories the daemon requires to exist before it will serve requests.
/// A subset of [`FARM_DIRS`] - this is deliberately the original, smaller
/// set so a missing optional farm directory (added by later desktop
/// environments) doesn't block startup.
const SANITY_CHECK_DIRS: &[&str] = &[
    "bin",
    "share/applications",
    "share/icons",
    "share/dbus-1/services",
    "share/glib-2.0/schemas",
    "share/ekn/data",
    "share/ekn/manifest",
];

/// Symlink-farm directories populated one symlink per entry.
const FARM_DIRS: &[&str] = &[
    "bin",
    "share/applications",
    "share/applications/games",
    "share/icons",
    "share/dbus-1/services",
    "share/glib-2.0/schemas",
    "share/ekn/data",
    "share/ekn/manifest",
    "share/gnome-shell/search-providers",
    "share/kde4",
    "etc/xdg/autostart",
];

/// Symlink-farm directories that fan out per-locale before the per-entry
/// symlinks (e.g. `share/help/es/myapp.xml`).
const FARM_WILDCARD_DIRS: &[&str] = &["share/help"];

const APP_ID_ALLOWED_EXTRA: &[char] = &['-', '_', '.'];

/// True iff `name` is a legal application id: dot-separated, alphanumeric
/// plus `-`/`_`, matching the reverse-DNS convention bundles are named with.
pub fn is_legal_app_id(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || APP_ID_ALLOWED_EXTRA.contains(&c))
}

/// True iff `path/.info` exists and declares `app_id` equal to `path`'s basename.
pub fn is_app_dir(path: &Path) -> bool {
    let Some(basename) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let Ok(ini) = Ini::load_from_file(path.join(".info")) else {
        return false;
    };
    ini.get_from(Some("Bundle"), "app_id") == Some(basename)
}

fn storage_root_for(applications_dir: &Path) -> PathBuf {
    let relative = applications_dir.strip_prefix("/").unwrap_or(applications_dir);
    Path::new(STORAGE_ROOT).join(relative)
}

/// Ensure `applications_dir` exists (as a symlink into [`STORAGE_ROOT`]) and
/// that every farm subdirectory is present underneath it; fix up
/// owner-only-readable per-app directories along the way.
pub fn sanity_check(applications_dir: &Path) -> Result<(), Error> {
    let real_root = storage_root_for(applications_dir);

    for dir in FARM_DIRS.iter().chain(FARM_WILDCARD_DIRS) {
        let path = real_root.join(dir);
        fs_err::create_dir_all(&path).map_err(|source| Error::CreateDir(path.clone(), source))?;
    }

    if !applications_dir.exists() {
        create_farm_symlink(applications_dir, &real_root)?;
    }

    let mut missing = Vec::new();
    for dir in SANITY_CHECK_DIRS {
        let path = applications_dir.join(dir);
        if !path.is_dir() {
            missing.push(path);
        }
    }
    if !missing.is_empty() {
        return Err(Error::MissingDirectories(missing));
    }

    let entries = fs_err::read_dir(applications_dir).map_err(|source| Error::Io(applications_dir.to_owned(), source))?;
    for entry in entries {
        let entry = entry.map_err(|source| Error::Io(applications_dir.to_owned(), source))?;
        let path = entry.path();
        if is_legal_app_id_dir(&path) {
            fix_application_permissions_if_needed(&path)?;
        }
    }

    Ok(())
}

fn create_farm_symlink(applications_dir: &Path, real_root: &Path) -> Result<(), Error> {
    if let Err(source) = std::os::unix::fs::symlink(real_root, applications_dir) {
        // Best-effort cleanup of a half-made link so the next attempt starts clean.
        if applications_dir.exists() {
            let _ = fs_err::remove_file(applications_dir);
        }
        return Err(Error::Symlink(applications_dir.to_owned(), source));
    }
    Ok(())
}

fn is_legal_app_id_dir(path: &Path) -> bool {
    path.is_dir() && path.file_name().and_then(|n| n.to_str()).is_some_and(is_legal_app_id)
}

fn fix_application_permissions_if_needed(path: &Path) -> Result<(), Error> {
    let metadata = fs_err::symlink_metadata(path).map_err(|source| Error::Io(path.to_owned(), source))?;
    let mode = metadata.permissions().mode();
    let other_rx = 0o004 | 0o001;
    if mode & other_rx != other_rx {
        fix_permissions_recursive(path)?;
    }
    Ok(())
}

/// Propagate `u+rx` down to `o+rx`, children first so a root fixed last
/// marks the whole tree as done even if an earlier run was interrupted.
fn fix_permissions_recursive(path: &Path) -> Result<(), Error> {
    let metadata = fs_err::symlink_metadata(path).map_err(|source| Error::Io(path.to_owned(), source))?;

    if metadata.is_dir() {
        for entry in fs_err::read_dir(path).map_err(|source| Error::Io(path.to_owned(), source))? {
            let entry = entry.map_err(|source| Error::Io(path.to_owned(), source))?;
            fix_permissions_recursive(&entry.path())?;
        }
    }

    if metadata.file_type().is_symlink() {
        return Ok(());
    }

    let mode = metadata.permissions().mode();
    let owner_rx = (mode & 0o400) | (mode & 0o100);
    let new_mode = mode | (owner_rx >> 6);
    if new_mode != mode {
        fs_err::set_permissions(path, std::fs::Permissions::from_mode(new_mode))
            .map_err(|source| Error::Io(path.to_owned(), source))?;
    }

    Ok(())
}

/// Move `src_prefix/<app_id>` to `dst_prefix/<app_id>`. Renames in place when
/// both prefixes share a filesystem; otherwise falls back to a recursive
/// copy followed by a recursive delete of the source.
pub fn deploy_app(src_prefix: &Path, dst_prefix: &Path, app_id: &str) -> Result<(), Error> {
    let src = src_prefix.join(app_id);
    let dst = dst_prefix.join(app_id);

    match fs_err::rename(&src, &dst) {
        Ok(()) => {}
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            copy_recursive(&src, &dst)?;
            remove_recursive(&src)?;
        }
        Err(e) => return Err(Error::Io(src, e)),
    }

    fsync_dir(dst_prefix)?;
    Ok(())
}

// `libc` isn't a direct dependency; EXDEV's value is part of the stable
// Linux syscall ABI so we hardcode it rather than pull in the whole crate
// for one constant.
fn libc_exdev() -> i32 {
    18
}

fn fsync_dir(path: &Path) -> Result<(), Error> {
    let dir = fs_err::File::open(path).map_err(|source| Error::Io(path.to_owned(), source))?;
    nix::unistd::fsync(dir.as_raw_fd()).map_err(|errno| Error::Fsync(path.to_owned(), errno))?;
    Ok(())
}

fn copy_recursive(src: &Path, dst: &Path) -> Result<(), Error> {
    let metadata = fs_err::symlink_metadata(src).map_err(|source| Error::Io(src.to_owned(), source))?;

    if metadata.file_type().is_symlink() {
        let target = fs_err::read_link(src).map_err(|source| Error::Io(src.to_owned(), source))?;
        std::os::unix::fs::symlink(&target, dst).map_err(|source| Error::Symlink(dst.to_owned(), source))?;
        return Ok(());
    }

    if metadata.is_dir() {
        fs_err::create_dir_all(dst).map_err(|source| Error::CreateDir(dst.to_owned(), source))?;
        for entry in fs_err::read_dir(src).map_err(|source| Error::Io(src.to_owned(), source))? {
            let entry = entry.map_err(|source| Error::Io(src.to_owned(), source))?;
            let name = entry.file_name();
            copy_recursive(&src.join(&name), &dst.join(&name))?;
        }
    } else {
        fs_err::copy(src, dst).map_err(|source| Error::Io(src.to_owned(), source))?;
    }

    fs_err::set_permissions(dst, metadata.permissions()).map_err(|source| Error::Io(dst.to_owned(), source))?;

    Ok(())
}

/// Recursive delete of a file or directory, without following symlinks.
fn remove_recursive(path: &Path) -> Result<(), Error> {
    let metadata = fs_err::symlink_metadata(path).map_err(|source| Error::Io(path.to_owned(), source))?;

    if metadata.is_dir() && !metadata.file_type().is_symlink() {
        for entry in fs_err::read_dir(path).map_err(|source| Error::Io(path.to_owned(), source))? {
            let entry = entry.map_err(|source| Error::Io(path.to_owned(), source))?;
            remove_recursive(&entry.path())?;
        }
        fs_err::remove_dir(path).map_err(|source| Error::Io(path.to_owned(), source))?;
    } else {
        fs_err::remove_file(path).map_err(|source| Error::Io(path.to_owned(), source))?;
    }

    Ok(())
}

/// Recursive delete of `prefix/<app_id>`.
pub fn prune_dir(prefix: &Path, app_id: &str) -> Result<(), Error> {
    remove_recursive(&prefix.join(app_id))
}

/// Recursive delete of an arbitrary path, such as a spent backup directory
/// whose name isn't a plain `<app_id>` (see [`backup_app`]).
pub fn remove_tree(path: &Path) -> Result<(), Error> {
    remove_recursive(path)
}

/// Rename `prefix/<app_id>` to a sibling backup directory and return its path.
pub fn backup_app(prefix: &Path, app_id: &str) -> Result<PathBuf, Error> {
    let src = prefix.join(app_id);
    let nonce: u32 = rand::random();
    let backup = prefix.join(format!(".{app_id}.bak.{nonce:08x}"));
    fs_err::rename(&src, &backup).map_err(|source| Error::Io(src, source))?;
    Ok(backup)
}

/// Reverse of [`backup_app`]: rename the backup back to `prefix/<app_id>`.
pub fn restore_app(prefix: &Path, app_id: &str, backup: &Path) -> Result<(), Error> {
    let dst = prefix.join(app_id);
    fs_err::rename(backup, &dst).map_err(|source| Error::Io(backup.to_owned(), source))?;
    Ok(())
}

/// Create relative symlinks in `applications_dir`'s farm directories pointing
/// at every entry under `prefix/<app_id>`'s matching subdirectories. A
/// farm slot already linked to a path under a *different* app is left alone.
pub fn create_symlinks(applications_dir: &Path, prefix: &Path, app_id: &str) -> Result<(), Error> {
    let app_dir = prefix.join(app_id);

    for subdir in FARM_DIRS {
        link_entries(&app_dir.join(subdir), &applications_dir.join(subdir), &app_dir)?;
    }

    for subdir in FARM_WILDCARD_DIRS {
        let app_subdir = app_dir.join(subdir);
        if !app_subdir.is_dir() {
            continue;
        }
        for locale in fs_err::read_dir(&app_subdir).map_err(|source| Error::Io(app_subdir.clone(), source))? {
            let locale = locale.map_err(|source| Error::Io(app_subdir.clone(), source))?;
            if !locale.path().is_dir() {
                continue;
            }
            let locale_name = locale.file_name();
            let farm_locale_dir = applications_dir.join(subdir).join(&locale_name);
            fs_err::create_dir_all(&farm_locale_dir).map_err(|source| Error::CreateDir(farm_locale_dir.clone(), source))?;
            link_entries(&locale.path(), &farm_locale_dir, &app_dir)?;
        }
    }

    Ok(())
}

fn link_entries(source_dir: &Path, farm_dir: &Path, owning_app_dir: &Path) -> Result<(), Error> {
    if !source_dir.is_dir() {
        return Ok(());
    }
    fs_err::create_dir_all(farm_dir).map_err(|source| Error::CreateDir(farm_dir.to_owned(), source))?;

    for entry in fs_err::read_dir(source_dir).map_err(|source| Error::Io(source_dir.to_owned(), source))? {
        let entry = entry.map_err(|source| Error::Io(source_dir.to_owned(), source))?;
        let name = entry.file_name();
        let link = farm_dir.join(&name);
        let target = entry.path();
        let relative_target = relative_from(farm_dir, &target);

        if let Ok(existing) = fs_err::read_link(&link) {
            let resolved = resolve_relative(&link, &existing);
            if resolved == target {
                continue;
            }
            if !resolved.starts_with(owning_app_dir) {
                warn!("leaving existing symlink {} alone, owned by another app", link.display());
                continue;
            }
            fs_err::remove_file(&link).map_err(|source| Error::Io(link.clone(), source))?;
        } else if link.exists() {
            warn!("leaving non-symlink farm entry {} alone", link.display());
            continue;
        }

        std::os::unix::fs::symlink(&relative_target, &link).map_err(|source| Error::Symlink(link, source))?;
    }

    Ok(())
}

fn resolve_relative(link: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        target.to_owned()
    } else {
        link.parent().unwrap_or(Path::new("/")).join(target)
    }
}

/// Express `target` relative to `from` (a directory the resulting symlink
/// will live in), so the farm survives `applications_dir`/prefix being
/// bind-mounted or relocated under a different absolute root.
fn relative_from(from: &Path, target: &Path) -> PathBuf {
    let from_components: Vec<_> = from.components().collect();
    let target_components: Vec<_> = target.components().collect();

    let common = from_components.iter().zip(target_components.iter()).take_while(|(a, b)| a == b).count();

    let mut relative = PathBuf::new();
    for _ in common..from_components.len() {
        relative.push("..");
    }
    for component in &target_components[common..] {
        relative.push(component);
    }
    relative
}

/// Walk the symlink farm and remove every link resolving into `prefix/<app_id>`.
pub fn prune_symlinks(applications_dir: &Path, prefix: &Path, app_id: &str) -> Result<(), Error> {
    let owning_app_dir = prefix.join(app_id);

    for subdir in FARM_DIRS {
        unlink_farm_dir(&applications_dir.join(subdir), &owning_app_dir)?;
    }
    for subdir in FARM_WILDCARD_DIRS {
        let farm_subdir = applications_dir.join(subdir);
        if !farm_subdir.is_dir() {
            continue;
        }
        for locale in fs_err::read_dir(&farm_subdir).map_err(|source| Error::Io(farm_subdir.clone(), source))? {
            let locale = locale.map_err(|source| Error::Io(farm_subdir.clone(), source))?;
            unlink_farm_dir(&locale.path(), &owning_app_dir)?;
        }
    }

    Ok(())
}

fn unlink_farm_dir(farm_dir: &Path, owning_app_dir: &Path) -> Result<(), Error> {
    if !farm_dir.is_dir() {
        return Ok(());
    }
    for entry in fs_err::read_dir(farm_dir).map_err(|source| Error::Io(farm_dir.to_owned(), source))? {
        let entry = entry.map_err(|source| Error::Io(farm_dir.to_owned(), source))?;
        let path = entry.path();
        if let Ok(target) = fs_err::read_link(&path) {
            if resolve_relative(&path, &target).starts_with(owning_app_dir) {
                fs_err::remove_file(&path).map_err(|source| Error::Io(path, source))?;
            }
        }
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("required directories are missing: {0:?}")]
    MissingDirectories(Vec<PathBuf>),
    #[error("could not create directory {0:?}")]
    CreateDir(PathBuf, #[source] io::Error),
    #[error("could not create symlink {0:?}")]
    Symlink(PathBuf, #[source] io::Error),
    #[error("could not fsync directory {0:?}")]
    Fsync(PathBuf, #[source] nix::errno::Errno),
    #[error("I/O error on {0:?}")]
    Io(PathBuf, #[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_info(dir: &Path, app_id: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(".info"), format!("[Bundle]\napp_id = {app_id}\nversion = 1:1.0-1\n")).unwrap();
    }

    #[test]
    fn legal_app_id_accepts_reverse_dns() {
        assert!(is_legal_app_id("com.example.MyApp"));
        assert!(is_legal_app_id("com.example.my-app_2"));
        assert!(!is_legal_app_id(""));
        assert!(!is_legal_app_id(".hidden"));
        assert!(!is_legal_app_id("has spaces"));
        assert!(!is_legal_app_id("has/slash"));
    }

    #[test]
    fn is_app_dir_requires_matching_info_file() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("com.example.App");
        write_info(&app_dir, "com.example.App");
        assert!(is_app_dir(&app_dir));

        let mismatched = dir.path().join("com.example.Other");
        write_info(&mismatched, "com.example.App");
        assert!(!is_app_dir(&mismatched));
    }

    #[test]
    fn deploy_app_moves_directory_tree() {
        let src_root = tempfile::tempdir().unwrap();
        let dst_root = tempfile::tempdir().unwrap();
        let app_dir = src_root.path().join("com.example.App");
        write_info(&app_dir, "com.example.App");
        fs::write(app_dir.join("payload"), b"data").unwrap();

        deploy_app(src_root.path(), dst_root.path(), "com.example.App").unwrap();

        assert!(!app_dir.exists());
        let moved = dst_root.path().join("com.example.App");
        assert!(moved.join("payload").exists());
    }

    #[test]
    fn backup_then_restore_round_trips() {
        let prefix = tempfile::tempdir().unwrap();
        let app_dir = prefix.path().join("com.example.App");
        write_info(&app_dir, "com.example.App");

        let backup = backup_app(prefix.path(), "com.example.App").unwrap();
        assert!(!app_dir.exists());
        assert!(backup.exists());

        restore_app(prefix.path(), "com.example.App", &backup).unwrap();
        assert!(app_dir.exists());
    }

    #[test]
    fn remove_tree_deletes_an_arbitrary_path() {
        let root = tempfile::tempdir().unwrap();
        let backup = root.path().join(".com.example.App.bak.deadbeef");
        fs::create_dir_all(backup.join("payload")).unwrap();

        remove_tree(&backup).unwrap();
        assert!(!backup.exists());
    }

    #[test]
    fn prune_dir_removes_tree() {
        let prefix = tempfile::tempdir().unwrap();
        let app_dir = prefix.path().join("com.example.App");
        write_info(&app_dir, "com.example.App");
        fs::create_dir_all(app_dir.join("nested")).unwrap();
        fs::write(app_dir.join("nested/file"), b"x").unwrap();

        prune_dir(prefix.path(), "com.example.App").unwrap();
        assert!(!app_dir.exists());
    }

    #[test]
    fn create_and_prune_symlinks_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let applications_dir = root.path().join("endless");
        let prefix = root.path().join("store");
        let app_dir = prefix.join("com.example.App");
        fs::create_dir_all(app_dir.join("bin")).unwrap();
        fs::write(app_dir.join("bin/launcher"), b"#!/bin/sh\n").unwrap();

        create_symlinks(&applications_dir, &prefix, "com.example.App").unwrap();
        let link = applications_dir.join("bin/launcher");
        assert!(link.is_symlink());

        prune_symlinks(&applications_dir, &prefix, "com.example.App").unwrap();
        assert!(!link.exists());
    }

    #[test]
    fn create_symlinks_does_not_clobber_other_app() {
        let root = tempfile::tempdir().unwrap();
        let applications_dir = root.path().join("endless");
        let prefix = root.path().join("store");

        let app_a = prefix.join("com.example.A");
        fs::create_dir_all(app_a.join("bin")).unwrap();
        fs::write(app_a.join("bin/tool"), b"a").unwrap();
        create_symlinks(&applications_dir, &prefix, "com.example.A").unwrap();

        let app_b = prefix.join("com.example.B");
        fs::create_dir_all(app_b.join("bin")).unwrap();
        fs::write(app_b.join("bin/tool"), b"b").unwrap();
        create_symlinks(&applications_dir, &prefix, "com.example.B").unwrap();

        let link = applications_dir.join("bin/tool");
        let target = fs::read_link(&link).unwrap();
        assert!(resolve_relative(&link, &target).starts_with(&app_a));
    }
}
