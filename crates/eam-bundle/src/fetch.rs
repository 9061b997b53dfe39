// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! External-asset fetch: download, verify, and run the bundle's install script.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use eam_cancel::Token;
use futures_util::StreamExt;
use log::error;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::exec;
use crate::manifest::ExternalAsset;

const MAX_REDIRECTS: usize = 5;

fn client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::ClientBuilder::new()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .expect("build reqwest client")
    })
}

/// Download `asset.url` into `external_dir/<filename>`, verify its SHA-256,
/// then run `<cache_dir>/.script.install <app_id> <cache_dir>`. `external_dir`
/// is removed afterward regardless of outcome.
pub async fn fetch_and_run_installer(asset: &ExternalAsset, cache_dir: &Path, app_id: &str, cancel: &Token) -> Result<(), Error> {
    let external_dir = cache_dir.join("external");
    let result = fetch_and_run_inner(asset, &external_dir, cache_dir, app_id, cancel).await;

    if let Err(e) = tokio::fs::remove_dir_all(&external_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            error!("failed to clean up {}: {e}", external_dir.display());
        }
    }

    result
}

async fn fetch_and_run_inner(asset: &ExternalAsset, external_dir: &Path, cache_dir: &Path, app_id: &str, cancel: &Token) -> Result<(), Error> {
    tokio::fs::create_dir_all(external_dir).await.map_err(|source| Error::Io(external_dir.to_owned(), source))?;

    let dest = external_dir.join(&asset.filename);
    download(asset.url.clone(), &dest, cancel).await?;

    verify_sha256(&dest, &asset.sha256sum).await?;

    run_install_script(cache_dir, app_id).await
}

async fn download(url: url::Url, dest: &Path, cancel: &Token) -> Result<(), Error> {
    let response = client().get(url).send().await?.error_for_status()?;
    let mut stream = response.bytes_stream();

    let mut out = tokio::fs::File::create(dest).await.map_err(|source| Error::Io(dest.to_owned(), source))?;
    while let Some(chunk) = stream.next().await {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let chunk = chunk?;
        out.write_all(&chunk).await.map_err(|source| Error::Io(dest.to_owned(), source))?;
    }
    out.flush().await.map_err(|source| Error::Io(dest.to_owned(), source))?;
    Ok(())
}

async fn verify_sha256(path: &Path, expected: &str) -> Result<(), Error> {
    let bytes = tokio::fs::read(path).await.map_err(|source| Error::Io(path.to_owned(), source))?;
    let digest = Sha256::digest(&bytes);
    let actual = hex_encode(&digest);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch { expected: expected.to_owned(), actual })
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(out, "{byte:02x}").expect("write to String never fails");
    }
    out
}

async fn run_install_script(cache_dir: &Path, app_id: &str) -> Result<(), Error> {
    let script = cache_dir.join(".script.install");
    if !script.is_file() {
        return Ok(());
    }

    let metadata = tokio::fs::metadata(&script).await.map_err(|source| Error::Io(script.clone(), source))?;
    use std::os::unix::fs::PermissionsExt;
    if metadata.permissions().mode() & 0o100 == 0 {
        return Err(Error::ScriptNotExecutable(script));
    }

    let output = exec::tokio_command(&script)
        .arg(app_id)
        .arg(cache_dir)
        .output()
        .await
        .map_err(|source| Error::Io(script.clone(), source))?;

    if output.status.success() {
        Ok(())
    } else {
        exec::log_failure(&script.display().to_string(), &output);
        Err(Error::ScriptFailed(output.status.code()))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {0:?}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("download cancelled")]
    Cancelled,
    #[error("request failed")]
    Request(#[from] reqwest::Error),
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("install script {0:?} is not executable by its owner")]
    ScriptNotExecutable(PathBuf),
    #[error("install script exited with code {0:?}")]
    ScriptFailed(Option<i32>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_encode_matches_known_digest() {
        let digest = Sha256::digest(b"abc");
        assert_eq!(hex_encode(&digest), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }
}
