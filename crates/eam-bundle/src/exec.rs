// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Child-process hygiene shared by every external tool this crate shells
//! out to: a minimal inherited environment and captured, logged
//! stdout/stderr. Exit status is the sole success signal; output is never
//! parsed, only logged.

use std::process::Output;

use log::warn;

/// Environment variables propagated to external tools - enough for binary
/// resolution (`PATH`) and locale-aware output (`LANG`/`LC_ALL`), nothing else.
const INHERITED_ENV: &[&str] = &["PATH", "LANG", "LC_ALL"];

/// Build a blocking [`std::process::Command`] for `program` with a cleared
/// environment re-populated with only [`INHERITED_ENV`].
pub fn command(program: &str) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.env_clear();
    for key in INHERITED_ENV {
        if let Ok(value) = std::env::var(key) {
            cmd.env(key, value);
        }
    }
    cmd
}

/// Build an async [`tokio::process::Command`] for `program` with the same
/// minimal environment as [`command`].
pub fn tokio_command(program: impl AsRef<std::ffi::OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.env_clear();
    for key in INHERITED_ENV {
        if let Ok(value) = std::env::var(key) {
            cmd.env(key, value);
        }
    }
    cmd
}

/// Log `program`'s captured stdout/stderr at `warn!` after a failed run.
pub fn log_failure(program: &str, output: &Output) {
    warn!(
        "{program} exited with {}: stdout={:?} stderr={:?}",
        output.status,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_only_carries_allowlisted_variables() {
        let cmd = command("true");
        let env: Vec<_> = cmd.get_envs().collect();
        assert!(env.iter().all(|(k, _)| INHERITED_ENV.contains(&k.to_str().unwrap())));
    }
}
