// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Integration coverage for the Install/Update/Uninstall transaction engine,
//! exercising the §8 testable properties end to end against real temporary
//! filesystem trees: atomicity, symlink-farm consistency, and signature
//! gating. Scenarios that would otherwise need a real `gpgv` binary and a
//! valid detached signature use `skip_sig` (Install) or a deliberately
//! missing signature file (Update), since no transaction here can assume an
//! external signing toolchain is present on the test host.

use std::io::Write;

use eam::appid::AppId;
use eam::transaction::{Install, Transaction, Uninstall, Update};
use eam_cancel::Token;
use eam_config::ConfigSnapshot;

/// Build a gzip-compressed tar bundle with a `.info` manifest and, optionally,
/// a `bin/<name>` payload file - enough for `create_symlinks` to have
/// something to link. Mirrors `eam_bundle::archive`'s own test fixture.
fn build_bundle(app_id: &str, version: &str, bin_name: Option<&str>) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());

    let info = format!("[Bundle]\napp_id = {app_id}\nversion = {version}\n");
    append(&mut builder, ".info", info.as_bytes());

    if let Some(name) = bin_name {
        append(&mut builder, &format!("bin/{name}"), b"#!/bin/sh\necho hi\n");
    }

    let tar_bytes = builder.into_inner().unwrap();
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

fn append(builder: &mut tar::Builder<Vec<u8>>, path: &str, contents: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder.append_data(&mut header, path, contents).unwrap();
}

/// A config snapshot rooted entirely under a fresh tempdir, so each test gets
/// its own `applications_dir`/`cache_dir`/storage prefixes. `sanity_check`
/// still mirrors `applications_dir` under `/var` per the legacy
/// `/endless -> /var/endless` layout `eam-fslayout` reproduces; that's an
/// existing property of the daemon's filesystem model, not something these
/// tests introduce.
fn test_config(root: &std::path::Path) -> ConfigSnapshot {
    let mut config = ConfigSnapshot::default();
    config.applications_dir = root.join("endless");
    config.cache_dir = root.join("cache");
    config.primary_storage = root.join("primary");
    config.secondary_storage = root.join("secondary");
    config.gpg_keyring = root.join("keyring.gpg");
    config
}

fn app(id: &str) -> AppId {
    id.parse().unwrap()
}

#[tokio::test]
async fn install_happy_path_deploys_and_farms_symlinks() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let bundle_path = root.path().join("app.tar.gz");
    std::fs::write(&bundle_path, build_bundle("com.example.App", "1.0", Some("launcher"))).unwrap();

    let txn = Transaction::Install(Install {
        app: app("com.example.App"),
        prefix: config.primary_storage.clone(),
        bundle: bundle_path,
        signature: root.path().join("unused.asc"),
        skip_sig: true,
    });

    txn.run(&config, &Token::new()).await.unwrap();

    let app_dir = config.primary_storage.join("com.example.App");
    assert!(app_dir.join(".info").is_file());
    let link = config.applications_dir.join("bin/launcher");
    assert!(link.is_symlink(), "expected a farm symlink at {}", link.display());
    let target = std::fs::read_link(&link).unwrap();
    assert!(target.is_relative(), "farm symlinks must be relative, got {}", target.display());
    assert_eq!(link.parent().unwrap().join(&target).canonicalize().unwrap(), app_dir.join("bin/launcher").canonicalize().unwrap());
}

#[tokio::test]
async fn install_signature_gating_blocks_mutation_on_missing_signature() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let bundle_path = root.path().join("app.tar.gz");
    std::fs::write(&bundle_path, build_bundle("com.example.App", "1.0", None)).unwrap();

    let txn = Transaction::Install(Install {
        app: app("com.example.App"),
        prefix: config.primary_storage.clone(),
        bundle: bundle_path,
        signature: root.path().join("missing.asc"),
        skip_sig: false,
    });

    let err = txn.run(&config, &Token::new()).await.unwrap_err();
    assert!(matches!(err, eam::transaction::Error::SignatureMissing(_)));
    assert!(!config.primary_storage.join("com.example.App").exists());
}

#[tokio::test]
async fn install_is_atomic_when_the_bundle_is_corrupt() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let bundle_path = root.path().join("app.tar.gz");
    std::fs::write(&bundle_path, b"not a real archive").unwrap();

    let txn = Transaction::Install(Install {
        app: app("com.example.App"),
        prefix: config.primary_storage.clone(),
        bundle: bundle_path,
        signature: root.path().join("unused.asc"),
        skip_sig: true,
    });

    let err = txn.run(&config, &Token::new()).await.unwrap_err();
    assert!(matches!(err, eam::transaction::Error::Archive(_)));
    assert!(!config.primary_storage.join("com.example.App").exists());
}

#[tokio::test]
async fn install_rejects_a_cancelled_token_before_touching_the_prefix() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let bundle_path = root.path().join("app.tar.gz");
    std::fs::write(&bundle_path, build_bundle("com.example.App", "1.0", None)).unwrap();

    let txn = Transaction::Install(Install {
        app: app("com.example.App"),
        prefix: config.primary_storage.clone(),
        bundle: bundle_path,
        signature: root.path().join("unused.asc"),
        skip_sig: true,
    });

    let cancel = Token::new();
    cancel.cancel();
    let err = txn.run(&config, &cancel).await.unwrap_err();
    assert!(matches!(err, eam::transaction::Error::Cancelled));
    assert!(!config.primary_storage.join("com.example.App").exists());
}

#[tokio::test]
async fn install_rejects_an_already_installed_app() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let app_dir = config.primary_storage.join("com.example.App");
    std::fs::create_dir_all(&app_dir).unwrap();
    std::fs::write(app_dir.join(".info"), "[Bundle]\napp_id = com.example.App\nversion = 1.0\n").unwrap();

    let bundle_path = root.path().join("app.tar.gz");
    std::fs::write(&bundle_path, build_bundle("com.example.App", "2.0", None)).unwrap();

    let txn = Transaction::Install(Install {
        app: app("com.example.App"),
        prefix: config.primary_storage.clone(),
        bundle: bundle_path,
        signature: root.path().join("unused.asc"),
        skip_sig: true,
    });

    let err = txn.run(&config, &Token::new()).await.unwrap_err();
    assert!(matches!(err, eam::transaction::Error::AlreadyInstalled(..)));
}

#[tokio::test]
async fn update_is_atomic_when_the_signature_is_missing() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let app_dir = config.primary_storage.join("com.example.App");
    std::fs::create_dir_all(&app_dir).unwrap();
    std::fs::write(app_dir.join(".info"), "[Bundle]\napp_id = com.example.App\nversion = 1.0\n").unwrap();
    std::fs::write(app_dir.join("marker"), b"original payload").unwrap();

    let bundle_path = root.path().join("app.tar.gz");
    std::fs::write(&bundle_path, build_bundle("com.example.App", "2.0", None)).unwrap();

    let txn = Transaction::Update(Update {
        app: app("com.example.App"),
        src_prefix: config.primary_storage.clone(),
        tgt_prefix: config.primary_storage.clone(),
        bundle: bundle_path,
        signature: Some(root.path().join("missing.asc")),
    });

    let err = txn.run(&config, &Token::new()).await.unwrap_err();
    assert!(matches!(err, eam::transaction::Error::SignatureMissing(_)));

    // Verification happens before any backup/deploy step, so the original
    // install must be byte-for-byte untouched.
    assert_eq!(std::fs::read(app_dir.join("marker")).unwrap(), b"original payload");
}

#[tokio::test]
async fn update_rejects_an_app_that_is_not_installed() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let bundle_path = root.path().join("app.tar.gz");
    std::fs::write(&bundle_path, build_bundle("com.example.App", "2.0", None)).unwrap();

    let txn = Transaction::Update(Update {
        app: app("com.example.App"),
        src_prefix: config.primary_storage.clone(),
        tgt_prefix: config.primary_storage.clone(),
        bundle: bundle_path,
        signature: Some(root.path().join("missing.asc")),
    });

    let err = txn.run(&config, &Token::new()).await.unwrap_err();
    assert!(matches!(err, eam::transaction::Error::NotInstalled(..)));
}

#[tokio::test]
async fn uninstall_removes_the_app_directory_and_its_farm_symlinks() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());
    let app_dir = config.primary_storage.join("com.example.App");
    std::fs::create_dir_all(app_dir.join("bin")).unwrap();
    std::fs::write(app_dir.join(".info"), "[Bundle]\napp_id = com.example.App\nversion = 1.0\n").unwrap();
    std::fs::write(app_dir.join("bin/launcher"), b"#!/bin/sh\n").unwrap();
    eam_fslayout::create_symlinks(&config.applications_dir, &config.primary_storage, "com.example.App").unwrap();
    let link = config.applications_dir.join("bin/launcher");
    assert!(link.is_symlink());

    let txn = Transaction::Uninstall(Uninstall { app: app("com.example.App"), prefix: config.primary_storage.clone(), force: false });
    txn.run(&config, &Token::new()).await.unwrap();

    assert!(!app_dir.exists());
    assert!(!link.exists(), "farm symlink must not survive an uninstall");
}

#[tokio::test]
async fn uninstall_with_force_is_a_no_op_for_a_missing_app() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());

    let txn = Transaction::Uninstall(Uninstall { app: app("com.example.App"), prefix: config.primary_storage.clone(), force: true });
    txn.run(&config, &Token::new()).await.unwrap();
}

#[tokio::test]
async fn uninstall_without_force_rejects_a_missing_app() {
    let root = tempfile::tempdir().unwrap();
    let config = test_config(root.path());

    let txn = Transaction::Uninstall(Uninstall { app: app("com.example.App"), prefix: config.primary_storage.clone(), force: false });
    let err = txn.run(&config, &Token::new()).await.unwrap_err();
    assert!(matches!(err, eam::transaction::Error::NotInstalled(..)));
}
