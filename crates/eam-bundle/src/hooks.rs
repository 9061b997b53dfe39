// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Best-effort deploy hooks: Python byte-compilation, stale bytecode
//! cleanup ahead of a delta update, and desktop cache refresh. None of
//! these is allowed to fail a transaction on its own.

use std::path::Path;

use log::warn;

use crate::exec;

/// Byte-compile every `lib/pythonX[.Y]/{dist,site}-packages` directory
/// present under `prefix/<app_id>`. Success if at least one interpreter
/// invocation succeeds; vacuously succeeds if no Python trees are present.
pub fn compile_python(prefix: &Path, app_id: &str) -> bool {
    let lib_dir = prefix.join(app_id).join("lib");
    let Ok(entries) = std::fs::read_dir(&lib_dir) else {
        return true;
    };

    let mut found_python = false;
    let mut any_succeeded = false;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with("python") || !entry.path().is_dir() {
            continue;
        }
        found_python = true;

        let interpreter = if name.starts_with("python3") { "python3" } else { "python2" };

        for site in ["dist-packages", "site-packages"] {
            let site_dir = entry.path().join(site);
            if !site_dir.is_dir() {
                continue;
            }
            let ok = match exec::command(interpreter).args(["-m", "compileall", "-f", "-q"]).arg(&site_dir).output() {
                Ok(output) if output.status.success() => true,
                Ok(output) => {
                    exec::log_failure(interpreter, &output);
                    false
                }
                Err(e) => {
                    warn!("could not run {interpreter}: {e}");
                    false
                }
            };
            any_succeeded |= ok;
        }
    }

    !found_python || any_succeeded
}

/// Recursively remove `.pyc`/`.pyo` files and `__pycache__` directories
/// under `app_dir/lib`.
pub fn cleanup_python_artifacts(app_dir: &Path) {
    let lib_dir = app_dir.join("lib");
    if lib_dir.is_dir() {
        remove_python_artifacts(&lib_dir);
    }
}

fn remove_python_artifacts(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else { continue };

        if file_type.is_dir() {
            if path.file_name().and_then(|n| n.to_str()) == Some("__pycache__") {
                let _ = std::fs::remove_dir_all(&path);
            } else {
                remove_python_artifacts(&path);
            }
        } else if file_type.is_file() {
            let is_object_file = path.extension().is_some_and(|ext| ext == "pyc" || ext == "pyo");
            if is_object_file {
                let _ = std::fs::remove_file(&path);
            }
        }
    }
}

/// Run the schema compiler, icon-cache updater, and desktop-file database
/// updater against `applications_dir`'s farm directories. Success if at
/// least one of the three commands succeeds; failures are logged, not fatal.
pub fn refresh_desktop_caches(applications_dir: &Path) -> bool {
    let commands: [(&str, &[&str]); 3] = [
        ("glib-compile-schemas", &["share/glib-2.0/schemas"]),
        ("gtk-update-icon-cache-3.0", &["--ignore-theme-index", "share/icons"]),
        ("update-desktop-database", &["share/applications"]),
    ];

    let mut any_succeeded = false;
    for (program, args) in commands {
        let resolved_args: Vec<std::ffi::OsString> = args
            .iter()
            .map(|a| if a.starts_with("share/") { applications_dir.join(a).into_os_string() } else { std::ffi::OsString::from(*a) })
            .collect();

        match exec::command(program).args(&resolved_args).output() {
            Ok(output) if output.status.success() => any_succeeded = true,
            Ok(output) => exec::log_failure(program, &output),
            Err(e) => warn!("could not run {program}: {e}"),
        }
    }

    any_succeeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn compile_python_vacuously_succeeds_without_python_trees() {
        let dir = tempfile::tempdir().unwrap();
        assert!(compile_python(dir.path(), "com.example.App"));
    }

    #[test]
    fn cleanup_python_artifacts_removes_pyc_and_pycache() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("com.example.App");
        let lib = app_dir.join("lib/python3.11/site-packages");
        fs::create_dir_all(&lib).unwrap();
        fs::write(lib.join("mod.pyc"), b"").unwrap();
        fs::create_dir_all(lib.join("__pycache__")).unwrap();
        fs::write(lib.join("__pycache__/mod.cpython-311.pyc"), b"").unwrap();
        fs::write(lib.join("mod.py"), b"").unwrap();

        cleanup_python_artifacts(&app_dir);

        assert!(!lib.join("mod.pyc").exists());
        assert!(!lib.join("__pycache__").exists());
        assert!(lib.join("mod.py").exists());
    }
}
