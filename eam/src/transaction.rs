// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The three transaction algorithms: Install, Update, Uninstall.
//!
//! Each is a straight-line async function running on the event loop, with
//! every blocking step (filesystem, signature verification, archive
//! extraction, post-deploy hooks) delegated to [`crate::runtime::unblock`]'s
//! dedicated worker thread. Cancellation is checked between state
//! transitions; every fatal error is preceded by a rollback to the
//! pre-transaction on-disk state.

use std::io;
use std::path::{Path, PathBuf};

use eam_cancel::Token;
use eam_config::ConfigSnapshot;
use log::{error, warn};
use thiserror::Error;

use crate::appid::AppId;
use crate::runtime::unblock;
use crate::tag::Tag;

/// A single install/update/uninstall request, carrying everything the
/// algorithm needs to run without consulting anything but [`ConfigSnapshot`].
#[derive(Debug, Clone)]
pub enum Transaction {
    Install(Install),
    Update(Update),
    Uninstall(Uninstall),
}

#[derive(Debug, Clone)]
pub struct Install {
    pub app: AppId,
    pub prefix: PathBuf,
    pub bundle: PathBuf,
    pub signature: PathBuf,
    pub skip_sig: bool,
}

#[derive(Debug, Clone)]
pub struct Update {
    pub app: AppId,
    pub src_prefix: PathBuf,
    pub tgt_prefix: PathBuf,
    pub bundle: PathBuf,
    pub signature: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Uninstall {
    pub app: AppId,
    pub prefix: PathBuf,
    pub force: bool,
}

impl Transaction {
    pub fn app(&self) -> &AppId {
        match self {
            Transaction::Install(t) => &t.app,
            Transaction::Update(t) => &t.app,
            Transaction::Uninstall(t) => &t.app,
        }
    }

    /// Run this transaction to completion, rolling back to the
    /// pre-transaction state on any fatal error.
    pub async fn run(&self, config: &ConfigSnapshot, cancel: &Token) -> Result<(), Error> {
        match self {
            Transaction::Install(t) => t.run(config, cancel).await,
            Transaction::Update(t) => t.run(config, cancel).await,
            Transaction::Uninstall(t) => t.run(config, cancel).await,
        }
    }
}

fn check(cancel: &Token) -> Result<(), Error> {
    cancel.check().map_err(|_| Error::Cancelled)
}

impl Install {
    async fn run(&self, config: &ConfigSnapshot, cancel: &Token) -> Result<(), Error> {
        // Preflight.
        if !self.bundle.is_file() {
            return Err(Error::BundleMissing(self.bundle.clone()));
        }
        sanity_check(config).await?;
        if eam_is_app_dir(&self.prefix, &self.app).await {
            return Err(Error::AlreadyInstalled(self.app.clone(), self.prefix.clone()));
        }
        check(cancel)?;

        if !self.skip_sig {
            verify_signature(&config.gpg_keyring, &self.signature, &self.bundle).await?;
        }
        check(cancel)?;

        let manifest = match extract(&self.bundle, &config.cache_dir, &self.app, cancel.clone()).await {
            Ok(manifest) => manifest,
            Err(e) => {
                cleanup_cache(config, &self.app).await;
                return Err(e);
            }
        };

        if let Err(e) = run_external_asset(&manifest, config, &self.app, cancel).await {
            cleanup_cache(config, &self.app).await;
            return Err(e);
        }
        check(cancel)?;

        if let Err(e) = deploy(&config.cache_dir, &self.prefix, &self.app).await {
            cleanup_cache(config, &self.app).await;
            return Err(e);
        }

        if let Err(e) = link(&config.applications_dir, &self.prefix, &self.app).await {
            unlink(&config.applications_dir, &self.prefix, &self.app).await;
            let _ = prune(&self.prefix, &self.app).await;
            return Err(e);
        }

        run_post_deploy_hooks(config, &self.prefix, &self.app).await;
        Ok(())
    }
}

impl Update {
    async fn run(&self, config: &ConfigSnapshot, cancel: &Token) -> Result<(), Error> {
        if !self.bundle.is_file() {
            return Err(Error::BundleMissing(self.bundle.clone()));
        }
        let signature = self.signature.clone().unwrap_or_else(|| default_signature_path(&self.bundle, &self.app));
        sanity_check(config).await?;
        if !eam_is_app_dir(&self.src_prefix, &self.app).await {
            return Err(Error::NotInstalled(self.app.clone(), self.src_prefix.clone()));
        }
        check(cancel)?;

        verify_signature(&config.gpg_keyring, &signature, &self.bundle).await?;
        check(cancel)?;

        let backup = backup(&self.src_prefix, &self.app).await?;

        let deploy_result = self.stage_and_deploy(config, cancel, &backup).await;
        if let Err(e) = deploy_result {
            restore(&self.src_prefix, &self.app, &backup).await;
            return Err(e);
        }

        if let Err(e) = link(&config.applications_dir, &self.tgt_prefix, &self.app).await {
            restore(&self.src_prefix, &self.app, &backup).await;
            return Err(e);
        }

        run_post_deploy_hooks(config, &self.tgt_prefix, &self.app).await;

        if let Err(e) = eam_fslayout::remove_tree(&backup) {
            warn!("could not remove spent backup {}: {e}", backup.display());
        }

        Ok(())
    }

    async fn stage_and_deploy(&self, config: &ConfigSnapshot, cancel: &Token, backup_dir: &Path) -> Result<(), Error> {
        match bundle_form(&self.bundle)? {
            BundleForm::FullArchive => {
                let manifest = extract(&self.bundle, &config.cache_dir, &self.app, cancel.clone()).await?;
                run_external_asset(&manifest, config, &self.app, cancel).await?;
                check(cancel)?;
                deploy(&config.cache_dir, &self.tgt_prefix, &self.app).await
            }
            BundleForm::Delta => {
                let app_id = self.app.as_str().to_owned();
                let backup_dir = backup_dir.to_owned();
                let staging = config.cache_dir.join(self.app.as_str());
                let bundle = self.bundle.clone();
                unblock(move || {
                    eam_bundle::hooks::cleanup_python_artifacts(&backup_dir);
                    eam_bundle::delta::apply(&app_id, &backup_dir, &bundle, &staging)
                })
                .await
                .map_err(Error::Delta)?;
                deploy(&config.cache_dir, &self.tgt_prefix, &self.app).await
            }
        }
    }
}

impl Uninstall {
    async fn run(&self, config: &ConfigSnapshot, cancel: &Token) -> Result<(), Error> {
        sanity_check(config).await?;

        if !eam_is_app_dir(&self.prefix, &self.app).await {
            if self.force {
                return Ok(());
            }
            return Err(Error::NotInstalled(self.app.clone(), self.prefix.clone()));
        }
        check(cancel)?;

        unlink(&config.applications_dir, &self.prefix, &self.app).await;

        if let Err(e) = prune(&self.prefix, &self.app).await {
            if !self.force {
                return Err(e);
            }
            warn!("ignoring prune failure for {} because force was requested: {e}", self.app);
        }

        let applications_dir = config.applications_dir.clone();
        unblock(move || eam_bundle::hooks::refresh_desktop_caches(&applications_dir)).await;

        Ok(())
    }
}

fn default_signature_path(bundle: &Path, app: &AppId) -> PathBuf {
    bundle.parent().unwrap_or_else(|| Path::new(".")).join(format!("{app}.asc"))
}

enum BundleForm {
    FullArchive,
    Delta,
}

fn bundle_form(bundle: &Path) -> Result<BundleForm, Error> {
    let name = bundle.to_string_lossy();
    if name.ends_with(".delta") {
        Ok(BundleForm::Delta)
    } else if name.ends_with(".bundle") || name.ends_with(".tar.zst") || name.ends_with(".tar.gz") {
        Ok(BundleForm::FullArchive)
    } else {
        Err(Error::UnrecognizedExtension(bundle.to_owned()))
    }
}

async fn sanity_check(config: &ConfigSnapshot) -> Result<(), Error> {
    let applications_dir = config.applications_dir.clone();
    unblock(move || eam_fslayout::sanity_check(&applications_dir)).await.map_err(Error::FsLayout)
}

async fn eam_is_app_dir(prefix: &Path, app: &AppId) -> bool {
    let path = prefix.join(app.as_str());
    unblock(move || eam_fslayout::is_app_dir(&path)).await
}

async fn verify_signature(keyring: &Path, signature: &Path, bundle: &Path) -> Result<(), Error> {
    if !signature.is_file() {
        return Err(Error::SignatureMissing(signature.to_owned()));
    }
    let keyring = keyring.to_owned();
    let signature = signature.to_owned();
    let bundle = bundle.to_owned();
    unblock(move || eam_bundle::signature::verify(&keyring, &signature, &bundle)).await.map_err(Error::Signature)
}

async fn extract(bundle: &Path, cache_dir: &Path, app: &AppId, cancel: Token) -> Result<eam_bundle::Manifest, Error> {
    let bundle = bundle.to_owned();
    let cache_dir = cache_dir.to_owned();
    let app_id = app.as_str().to_owned();
    unblock(move || eam_bundle::archive::extract(&bundle, &cache_dir, &app_id, &cancel)).await.map_err(Error::Archive)
}

async fn run_external_asset(manifest: &eam_bundle::Manifest, config: &ConfigSnapshot, app: &AppId, cancel: &Token) -> Result<(), Error> {
    let Some(external) = &manifest.external else { return Ok(()) };
    let staging = config.cache_dir.join(app.as_str());
    eam_bundle::fetch::fetch_and_run_installer(external, &staging, app.as_str(), cancel).await.map_err(Error::Fetch)
}

async fn deploy(src_prefix: &Path, dst_prefix: &Path, app: &AppId) -> Result<(), Error> {
    let src_prefix = src_prefix.to_owned();
    let dst_prefix = dst_prefix.to_owned();
    let app_id = app.as_str().to_owned();
    unblock(move || eam_fslayout::deploy_app(&src_prefix, &dst_prefix, &app_id)).await.map_err(Error::FsLayout)
}

async fn link(applications_dir: &Path, prefix: &Path, app: &AppId) -> Result<(), Error> {
    let applications_dir = applications_dir.to_owned();
    let prefix = prefix.to_owned();
    let app_id = app.as_str().to_owned();
    unblock(move || eam_fslayout::create_symlinks(&applications_dir, &prefix, &app_id)).await.map_err(Error::FsLayout)
}

async fn unlink(applications_dir: &Path, prefix: &Path, app: &AppId) {
    let applications_dir = applications_dir.to_owned();
    let prefix = prefix.to_owned();
    let app_id = app.as_str().to_owned();
    if let Err(e) = unblock(move || eam_fslayout::prune_symlinks(&applications_dir, &prefix, &app_id)).await {
        warn!("could not fully prune symlinks for {app}: {e}");
    }
}

async fn prune(prefix: &Path, app: &AppId) -> Result<(), Error> {
    let prefix = prefix.to_owned();
    let app_id = app.as_str().to_owned();
    unblock(move || eam_fslayout::prune_dir(&prefix, &app_id)).await.map_err(Error::FsLayout)
}

async fn backup(prefix: &Path, app: &AppId) -> Result<PathBuf, Error> {
    let prefix = prefix.to_owned();
    let app_id = app.as_str().to_owned();
    unblock(move || eam_fslayout::backup_app(&prefix, &app_id)).await.map_err(Error::FsLayout)
}

async fn restore(prefix: &Path, app: &AppId, backup: &Path) {
    let prefix = prefix.to_owned();
    let app_id = app.as_str().to_owned();
    let backup = backup.to_owned();
    if let Err(e) = unblock(move || eam_fslayout::restore_app(&prefix, &app_id, &backup)).await {
        error!("could not restore backup for {app}: {e} - installation may be left in a backed-up state");
    }
}

async fn cleanup_cache(config: &ConfigSnapshot, app: &AppId) {
    let cache_dir = config.cache_dir.clone();
    let app_id = app.as_str().to_owned();
    if let Err(e) = unblock(move || eam_fslayout::prune_dir(&cache_dir, &app_id)).await {
        warn!("could not clean up cache staging area for {app}: {e}");
    }
}

async fn run_post_deploy_hooks(config: &ConfigSnapshot, prefix: &Path, app: &AppId) {
    let prefix_owned = prefix.to_owned();
    let app_id = app.as_str().to_owned();
    let compiled = unblock(move || eam_bundle::hooks::compile_python(&prefix_owned, &app_id)).await;
    if !compiled {
        warn!("python byte-compile failed for {app}, continuing anyway");
    }

    let applications_dir = config.applications_dir.clone();
    let refreshed = unblock(move || eam_bundle::hooks::refresh_desktop_caches(&applications_dir)).await;
    if !refreshed {
        warn!("desktop cache refresh failed for {app}, continuing anyway");
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("bundle file {0:?} does not exist")]
    BundleMissing(PathBuf),
    #[error("signature file {0:?} does not exist")]
    SignatureMissing(PathBuf),
    #[error("{0} is already installed under {1:?}")]
    AlreadyInstalled(AppId, PathBuf),
    #[error("{0} is not installed under {1:?}")]
    NotInstalled(AppId, PathBuf),
    #[error("unrecognized bundle extension on {0:?}")]
    UnrecognizedExtension(PathBuf),
    #[error("transaction cancelled")]
    Cancelled,
    #[error("filesystem layout")]
    FsLayout(#[source] eam_fslayout::Error),
    #[error("signature verification")]
    Signature(#[source] eam_bundle::signature::Error),
    #[error("archive extraction")]
    Archive(#[source] eam_bundle::archive::Error),
    #[error("external asset fetch")]
    Fetch(#[source] eam_bundle::fetch::Error),
    #[error("delta update")]
    Delta(#[source] eam_bundle::delta::Error),
}

impl Error {
    /// The bus-facing category for this error, per the taxonomy in spec §7.
    pub fn tag(&self) -> Tag {
        match self {
            Error::BundleMissing(_) | Error::SignatureMissing(_) => Tag::InvalidFile,
            Error::AlreadyInstalled(..) => Tag::Failed,
            Error::NotInstalled(..) => Tag::Failed,
            Error::UnrecognizedExtension(_) => Tag::Failed,
            Error::Cancelled => Tag::Cancelled,
            Error::FsLayout(e) => fslayout_tag(e),
            Error::Signature(e) => signature_tag(e),
            Error::Archive(e) => archive_tag(e),
            Error::Fetch(e) => fetch_tag(e),
            Error::Delta(e) => delta_tag(e),
        }
    }
}

fn fslayout_tag(e: &eam_fslayout::Error) -> Tag {
    match e {
        eam_fslayout::Error::Io(_, io) | eam_fslayout::Error::CreateDir(_, io) => io_tag(io),
        eam_fslayout::Error::MissingDirectories(_) | eam_fslayout::Error::Symlink(..) | eam_fslayout::Error::Fsync(..) => Tag::Failed,
    }
}

fn signature_tag(e: &eam_bundle::signature::Error) -> Tag {
    match e {
        eam_bundle::signature::Error::Invalid => Tag::InvalidFile,
        eam_bundle::signature::Error::Spawn(_) => Tag::Failed,
    }
}

fn archive_tag(e: &eam_bundle::archive::Error) -> Tag {
    match e {
        eam_bundle::archive::Error::Cancelled => Tag::Cancelled,
        eam_bundle::archive::Error::MissingManifest | eam_bundle::archive::Error::AppIdMismatch { .. } | eam_bundle::archive::Error::Manifest(_) => Tag::InvalidFile,
        eam_bundle::archive::Error::Io(_, io) => io_tag(io),
    }
}

fn delta_tag(e: &eam_bundle::delta::Error) -> Tag {
    match e {
        eam_bundle::delta::Error::Io(_, io) => io_tag(io),
        eam_bundle::delta::Error::Spawn(_) | eam_bundle::delta::Error::Failed => Tag::Failed,
    }
}

fn fetch_tag(e: &eam_bundle::fetch::Error) -> Tag {
    match e {
        eam_bundle::fetch::Error::Cancelled => Tag::Cancelled,
        eam_bundle::fetch::Error::Request(_) => Tag::NoNetwork,
        eam_bundle::fetch::Error::ChecksumMismatch { .. } => Tag::InvalidFile,
        eam_bundle::fetch::Error::ScriptNotExecutable(_) | eam_bundle::fetch::Error::ScriptFailed(_) => Tag::Failed,
        eam_bundle::fetch::Error::Io(_, io) => io_tag(io),
    }
}

/// `ENOSPC` on Linux; `fs-err`/`std::io::Error` doesn't expose a portable
/// kind for it yet, so we match the raw errno the kernel actually returns.
const ENOSPC: i32 = 28;

fn io_tag(e: &io::Error) -> Tag {
    if e.raw_os_error() == Some(ENOSPC) {
        Tag::NotEnoughDiskSpace
    } else {
        Tag::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_form_recognizes_full_archive_extensions() {
        assert!(matches!(bundle_form(Path::new("foo.bundle")).unwrap(), BundleForm::FullArchive));
        assert!(matches!(bundle_form(Path::new("foo.tar.zst")).unwrap(), BundleForm::FullArchive));
        assert!(matches!(bundle_form(Path::new("foo.tar.gz")).unwrap(), BundleForm::FullArchive));
    }

    #[test]
    fn bundle_form_recognizes_delta_extension() {
        assert!(matches!(bundle_form(Path::new("foo.delta")).unwrap(), BundleForm::Delta));
    }

    #[test]
    fn bundle_form_rejects_unknown_extension() {
        assert!(matches!(bundle_form(Path::new("foo.zip")), Err(Error::UnrecognizedExtension(_))));
    }

    #[test]
    fn default_signature_path_sits_next_to_the_bundle() {
        let app: AppId = "com.example.App".parse().unwrap();
        let path = default_signature_path(Path::new("/tmp/staging/foo.bundle"), &app);
        assert_eq!(path, PathBuf::from("/tmp/staging/com.example.App.asc"));
    }

    #[test]
    fn io_tag_maps_enospc_to_not_enough_disk_space() {
        let enospc = io::Error::from_raw_os_error(ENOSPC);
        assert_eq!(io_tag(&enospc), Tag::NotEnoughDiskSpace);
        let other = io::Error::from_raw_os_error(2);
        assert_eq!(io_tag(&other), Tag::Failed);
    }
}
