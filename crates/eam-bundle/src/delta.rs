// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Delta-update application via the `xdelta3-dir-patcher` helper tool.

use std::path::Path;

use thiserror::Error;

use crate::exec;

/// Apply `delta_bundle` against `backup_dir` (the pre-update install, as
/// produced by `eam_fslayout::backup_app`) into `staging_dir`, replacing
/// whatever `staging_dir` already holds. Blocking: shells out to
/// `xdelta3-dir-patcher`, which does no network I/O.
pub fn apply(app_id: &str, backup_dir: &Path, delta_bundle: &Path, staging_dir: &Path) -> Result<(), Error> {
    // Best-effort: staging_dir may not exist yet, and any real permission
    // problem surfaces a moment later from create_dir_all below.
    let _ = eam_fslayout::remove_tree(staging_dir);
    fs_err::create_dir_all(staging_dir).map_err(|source| Error::Io(staging_dir.to_owned(), source))?;

    let output = exec::command("xdelta3-dir-patcher")
        .arg("apply")
        .arg("--ignore-euid")
        .arg("-d")
        .arg(app_id)
        .arg(backup_dir)
        .arg(delta_bundle)
        .arg(staging_dir)
        .output()
        .map_err(Error::Spawn)?;

    if output.status.success() {
        Ok(())
    } else {
        exec::log_failure("xdelta3-dir-patcher", &output);
        Err(Error::Failed)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not prepare staging directory {0:?}")]
    Io(std::path::PathBuf, #[source] std::io::Error),
    #[error("could not run xdelta3-dir-patcher")]
    Spawn(#[source] std::io::Error),
    #[error("xdelta3-dir-patcher failed")]
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_rejects_a_missing_patcher_binary_as_a_spawn_or_failure_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = apply("com.example.App", &dir.path().join("backup"), &dir.path().join("delta.bundle"), &dir.path().join("staging")).unwrap_err();
        assert!(matches!(err, Error::Spawn(_) | Error::Failed));
    }
}
