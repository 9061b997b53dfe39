// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Streaming extraction of a bundle archive (tar, zstd- or gzip-compressed)
//! into the cache tree.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use eam_cancel::Token;
use thiserror::Error;

use crate::manifest::{self, Manifest};

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// Extract `bundle` into `cache_dir/<app_id>/`, checking `cancel` between
/// entries, and return the parsed, validated `.info` manifest.
pub fn extract(bundle: &Path, cache_dir: &Path, app_id: &str, cancel: &Token) -> Result<Manifest, Error> {
    let dest = cache_dir.join(app_id);
    fs_err::create_dir_all(&dest).map_err(|source| Error::Io(dest.clone(), source))?;

    let file = File::open(bundle).map_err(|source| Error::Io(bundle.to_owned(), source))?;
    let reader: Box<dyn Read> = decoder_for(BufReader::new(file))?;
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_unpack_xattrs(true);

    for entry in archive.entries().map_err(|source| Error::Io(bundle.to_owned(), source))? {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let mut entry = entry.map_err(|source| Error::Io(bundle.to_owned(), source))?;
        entry.unpack_in(&dest).map_err(|source| Error::Io(bundle.to_owned(), source))?;
    }

    let manifest_path = dest.join(".info");
    if !manifest_path.is_file() {
        return Err(Error::MissingManifest);
    }
    let manifest = Manifest::parse_file(&manifest_path)?;
    if manifest.app_id != app_id {
        return Err(Error::AppIdMismatch { expected: app_id.to_owned(), found: manifest.app_id });
    }

    Ok(manifest)
}

fn decoder_for<R: Read + 'static>(mut reader: BufReader<R>) -> Result<Box<dyn Read>, Error> {
    let mut magic = [0u8; 4];
    let peeked = peek_exact(&mut reader, &mut magic)?;

    if peeked >= 4 && magic == ZSTD_MAGIC {
        Ok(Box::new(zstd::stream::read::Decoder::new(reader).map_err(|source| Error::Io(PathBuf::new(), source))?))
    } else if peeked >= 2 && magic[..2] == GZIP_MAGIC {
        Ok(Box::new(flate2::read::GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Fill `buf` from `reader` without consuming bytes the caller still needs -
/// `BufReader` lets us peek its internal buffer and refill it from the
/// underlying stream without losing anything once the tar reader takes over.
fn peek_exact<R: Read>(reader: &mut BufReader<R>, buf: &mut [u8]) -> Result<usize, Error> {
    use std::io::BufRead;
    let available = reader.fill_buf().map_err(|source| Error::Io(PathBuf::new(), source))?;
    let take = available.len().min(buf.len());
    buf[..take].copy_from_slice(&available[..take]);
    Ok(take)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {0:?}")]
    Io(PathBuf, #[source] io::Error),
    #[error("extraction cancelled")]
    Cancelled,
    #[error("bundle is missing a .info manifest at its root")]
    MissingManifest,
    #[error("manifest declares app_id {found:?}, expected {expected:?}")]
    AppIdMismatch { expected: String, found: String },
    #[error("manifest error")]
    Manifest(#[from] manifest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_tar_gz(app_id: &str) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let info = format!("[Bundle]\napp_id = {app_id}\nversion = 1.0\n");
        let mut header = tar::Header::new_gnu();
        header.set_size(info.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, ".info", info.as_bytes()).unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn extracts_gzip_bundle_and_parses_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let bundle_path = dir.path().join("bundle.tar.gz");
        std::fs::write(&bundle_path, build_tar_gz("com.example.App")).unwrap();

        let cache_dir = dir.path().join("cache");
        let cancel = Token::new();
        let manifest = extract(&bundle_path, &cache_dir, "com.example.App", &cancel).unwrap();
        assert_eq!(manifest.app_id, "com.example.App");
        assert!(cache_dir.join("com.example.App/.info").exists());
    }

    #[test]
    fn rejects_app_id_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let bundle_path = dir.path().join("bundle.tar.gz");
        std::fs::write(&bundle_path, build_tar_gz("com.example.Other")).unwrap();

        let cache_dir = dir.path().join("cache");
        let cancel = Token::new();
        let err = extract(&bundle_path, &cache_dir, "com.example.App", &cancel).unwrap_err();
        assert!(matches!(err, Error::AppIdMismatch { .. }));
    }

    #[test]
    fn cancelled_token_aborts_before_first_entry() {
        let dir = tempfile::tempdir().unwrap();
        let bundle_path = dir.path().join("bundle.tar.gz");
        std::fs::write(&bundle_path, build_tar_gz("com.example.App")).unwrap();

        let cache_dir = dir.path().join("cache");
        let cancel = Token::new();
        cancel.cancel();
        let err = extract(&bundle_path, &cache_dir, "com.example.App", &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
