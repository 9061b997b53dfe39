// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Typed settings resolved from a single INI file plus an environment override.
//!
//! Unlike the layered, multi-file YAML lookup the rest of this workspace's
//! sibling crates use for per-domain configuration, the application manager
//! has exactly one keyfile: `/etc/eos-app-manager/config.ini`, or whatever
//! path `EAM_CONFIG_FILE` names. Unknown keys are logged and ignored;
//! malformed values fall back to their default and are logged too - a
//! daemon that refuses to start over a typo in a config file is worse than
//! one that starts with sane defaults.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use log::warn;
use thiserror::Error;
use url::Url;

/// Environment variable overriding the config file path.
pub const ENV_CONFIG_FILE: &str = "EAM_CONFIG_FILE";

const DEFAULT_CONFIG_PATH: &str = "/etc/eos-app-manager/config.ini";

const LOCALSTATE: &str = "/var/lib";

/// Immutable bundle of resolved paths and tunables.
///
/// Created once at daemon startup (or re-created by [`set_key`]/[`reset_key`])
/// and handed around by clone - this is a handful of `PathBuf`s, a `Url`, and
/// a couple of scalars, so cloning it is far cheaper than locking across an
/// `.await` point would be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub applications_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub primary_storage: PathBuf,
    pub secondary_storage: PathBuf,
    pub gpg_keyring: PathBuf,
    pub inactivity_timeout: Duration,
    pub server_url: Url,
    pub api_version: String,
    pub enable_delta_updates: bool,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            applications_dir: PathBuf::from("/endless"),
            cache_dir: PathBuf::from(LOCALSTATE).join("cache/eos-app-manager"),
            primary_storage: PathBuf::from(LOCALSTATE).join("endless"),
            secondary_storage: PathBuf::from(LOCALSTATE).join("endless-extra"),
            gpg_keyring: PathBuf::from("/usr/share/eos-app-manager/eos-keyring.gpg"),
            inactivity_timeout: Duration::from_secs(300),
            server_url: Url::parse("https://appupdates.endlessm.com").expect("static url"),
            api_version: "v1".to_owned(),
            enable_delta_updates: true,
        }
    }
}

/// One setting, addressed by its INI group and key name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    ApplicationsDir,
    CacheDir,
    PrimaryStorage,
    SecondaryStorage,
    GpgKeyring,
    InactivityTimeout,
    ServerUrl,
    ApiVersion,
    EnableDeltaUpdates,
}

impl Setting {
    const ALL: [Setting; 9] = [
        Setting::ApplicationsDir,
        Setting::CacheDir,
        Setting::PrimaryStorage,
        Setting::SecondaryStorage,
        Setting::GpgKeyring,
        Setting::InactivityTimeout,
        Setting::ServerUrl,
        Setting::ApiVersion,
        Setting::EnableDeltaUpdates,
    ];

    pub fn group(self) -> &'static str {
        match self {
            Setting::ApplicationsDir
            | Setting::CacheDir
            | Setting::PrimaryStorage
            | Setting::SecondaryStorage
            | Setting::GpgKeyring => "Directories",
            Setting::InactivityTimeout => "Daemon",
            Setting::ServerUrl | Setting::ApiVersion | Setting::EnableDeltaUpdates => "Repository",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Setting::ApplicationsDir => "ApplicationsDir",
            Setting::CacheDir => "CacheDir",
            Setting::PrimaryStorage => "PrimaryStorage",
            Setting::SecondaryStorage => "SecondaryStorage",
            Setting::GpgKeyring => "GpgKeyring",
            Setting::InactivityTimeout => "InactivityTimeout",
            Setting::ServerUrl => "ServerUrl",
            Setting::ApiVersion => "ApiVersion",
            Setting::EnableDeltaUpdates => "EnableDeltaUpdates",
        }
    }

    /// Parse a `Group.Key` or bare `Key` string as used by the `config` CLI
    /// subcommand. Bare keys are matched case-insensitively against all groups.
    pub fn parse(input: &str) -> Option<Setting> {
        let (group, key) = match input.split_once('.') {
            Some((g, k)) => (Some(g), k),
            None => (None, input),
        };

        Self::ALL.into_iter().find(|setting| {
            setting.key().eq_ignore_ascii_case(key)
                && group.is_none_or(|g| setting.group().eq_ignore_ascii_case(g))
        })
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group(), self.key())
    }
}

/// Resolve the config file path: `EAM_CONFIG_FILE` if set, else the compiled-in default.
pub fn config_path() -> PathBuf {
    env::var_os(ENV_CONFIG_FILE)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load the snapshot from `path`, falling back to defaults for any key that
/// is missing, malformed, or not present because the file itself doesn't exist.
pub fn load(path: &Path) -> ConfigSnapshot {
    let mut snapshot = ConfigSnapshot::default();

    let ini = match Ini::load_from_file(path) {
        Ok(ini) => ini,
        Err(_) => return snapshot,
    };

    warn_on_unknown_keys(&ini);

    if let Some(v) = get_path(&ini, Setting::ApplicationsDir) {
        snapshot.applications_dir = v;
    }
    if let Some(v) = get_path(&ini, Setting::CacheDir) {
        snapshot.cache_dir = v;
    }
    if let Some(v) = get_path(&ini, Setting::PrimaryStorage) {
        snapshot.primary_storage = v;
    }
    if let Some(v) = get_path(&ini, Setting::SecondaryStorage) {
        snapshot.secondary_storage = v;
    }
    if let Some(v) = get_path(&ini, Setting::GpgKeyring) {
        snapshot.gpg_keyring = v;
    }
    if let Some(v) = get_raw(&ini, Setting::InactivityTimeout).and_then(|raw| parse_or_warn(Setting::InactivityTimeout, &raw, str::parse::<u64>)) {
        snapshot.inactivity_timeout = Duration::from_secs(v);
    }
    if let Some(v) = get_raw(&ini, Setting::ServerUrl).and_then(|raw| parse_or_warn(Setting::ServerUrl, &raw, |s| Url::parse(s))) {
        snapshot.server_url = v;
    }
    if let Some(v) = get_raw(&ini, Setting::ApiVersion) {
        snapshot.api_version = v;
    }
    if let Some(v) = get_raw(&ini, Setting::EnableDeltaUpdates).and_then(|raw| parse_or_warn(Setting::EnableDeltaUpdates, &raw, parse_bool)) {
        snapshot.enable_delta_updates = v;
    }

    snapshot
}

/// Rewrite `key = value` for `setting` in the file at `path`, preserving the
/// rest of the file's sections, keys, and comments, then return the reloaded
/// snapshot.
pub fn set_key(path: &Path, setting: Setting, value: &str) -> Result<ConfigSnapshot, Error> {
    let mut ini = Ini::load_from_file(path).unwrap_or_default();
    ini.set_to(Some(setting.group()), setting.key().to_owned(), value.to_owned());
    save(&ini, path)?;
    Ok(load(path))
}

/// Remove `setting`'s entry from the file at `path`, so it reverts to its
/// compiled-in default on the next load.
pub fn reset_key(path: &Path, setting: Setting) -> Result<ConfigSnapshot, Error> {
    let mut ini = Ini::load_from_file(path).unwrap_or_default();
    if let Some(section) = ini.section_mut(Some(setting.group())) {
        section.remove(setting.key());
    }
    save(&ini, path)?;
    Ok(load(path))
}

fn save(ini: &Ini, path: &Path) -> Result<(), Error> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| Error::CreateDir(dir.to_owned(), source))?;
    }
    ini.write_to_file(path).map_err(|source| Error::Write(path.to_owned(), source))
}

fn get_raw(ini: &Ini, setting: Setting) -> Option<String> {
    ini.get_from(Some(setting.group()), setting.key()).map(str::to_owned)
}

fn get_path(ini: &Ini, setting: Setting) -> Option<PathBuf> {
    get_raw(ini, setting).map(PathBuf::from)
}

fn parse_or_warn<T, E: fmt::Display>(setting: Setting, raw: &str, parse: impl FnOnce(&str) -> Result<T, E>) -> Option<T> {
    match parse(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("ignoring malformed value {raw:?} for {setting}: {e}; using default");
            None
        }
    }
}

fn parse_bool(raw: &str) -> Result<bool, std::str::ParseBoolError> {
    raw.trim().parse()
}

fn warn_on_unknown_keys(ini: &Ini) {
    for (section, props) in ini.iter() {
        let Some(section) = section else { continue };
        for (key, _) in props.iter() {
            let known = Setting::ALL.iter().any(|s| s.group() == section && s.key() == key);
            if !known {
                warn!("ignoring unknown config key {section}.{key}");
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not create config directory {0:?}")]
    CreateDir(PathBuf, #[source] std::io::Error),
    #[error("could not write config file {0:?}")]
    Write(PathBuf, #[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_file_absent() {
        let snapshot = load(Path::new("/nonexistent/eam-config-test.ini"));
        assert_eq!(snapshot, ConfigSnapshot::default());
    }

    #[test]
    fn reads_recognized_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[Directories]\nApplicationsDir = /opt/apps\n\n[Daemon]\nInactivityTimeout = 42\n").unwrap();
        drop(file);

        let snapshot = load(&path);
        assert_eq!(snapshot.applications_dir, PathBuf::from("/opt/apps"));
        assert_eq!(snapshot.inactivity_timeout, Duration::from_secs(42));
        // Untouched keys keep their defaults.
        assert_eq!(snapshot.api_version, "v1");
    }

    #[test]
    fn malformed_value_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[Daemon]\nInactivityTimeout = not-a-number\n").unwrap();

        let snapshot = load(&path);
        assert_eq!(snapshot.inactivity_timeout, ConfigSnapshot::default().inactivity_timeout);
    }

    #[test]
    fn set_key_then_reset_key_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");

        let snapshot = set_key(&path, Setting::InactivityTimeout, "17").unwrap();
        assert_eq!(snapshot.inactivity_timeout, Duration::from_secs(17));

        let snapshot = reset_key(&path, Setting::InactivityTimeout).unwrap();
        assert_eq!(snapshot.inactivity_timeout, ConfigSnapshot::default().inactivity_timeout);
    }

    #[test]
    fn set_key_preserves_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[Repository]\nApiVersion = v2\n").unwrap();

        set_key(&path, Setting::EnableDeltaUpdates, "false").unwrap();

        let snapshot = load(&path);
        assert_eq!(snapshot.api_version, "v2");
        assert!(!snapshot.enable_delta_updates);
    }

    #[test]
    fn parse_accepts_bare_and_qualified_keys() {
        assert_eq!(Setting::parse("InactivityTimeout"), Some(Setting::InactivityTimeout));
        assert_eq!(Setting::parse("Daemon.InactivityTimeout"), Some(Setting::InactivityTimeout));
        assert_eq!(Setting::parse("Directories.InactivityTimeout"), None);
        assert_eq!(Setting::parse("NoSuchKey"), None);
    }
}
