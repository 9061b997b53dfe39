// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The `.info` manifest embedded at a bundle's root.

use std::path::Path;

use ini::Ini;
use thiserror::Error;
use url::Url;

use crate::version::{self, Version};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub app_id: String,
    pub version: Version,
    pub external: Option<ExternalAsset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAsset {
    pub url: Url,
    pub filename: String,
    pub sha256sum: String,
}

impl Manifest {
    pub fn parse_file(path: &Path) -> Result<Manifest, Error> {
        let ini = Ini::load_from_file(path).map_err(|source| Error::Read(path.to_owned(), source))?;
        Self::from_ini(&ini)
    }

    pub fn parse_str(contents: &str) -> Result<Manifest, Error> {
        let ini = Ini::load_from_str(contents).map_err(Error::Parse)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Manifest, Error> {
        let bundle = ini.section(Some("Bundle")).ok_or(Error::MissingSection("Bundle"))?;

        let app_id = bundle.get("app_id").ok_or(Error::MissingKey("Bundle.app_id"))?.to_owned();
        if !eam_fslayout::is_legal_app_id(&app_id) {
            return Err(Error::IllegalAppId(app_id));
        }

        let version_str = bundle.get("version").ok_or(Error::MissingKey("Bundle.version"))?;
        let version = Version::parse(version_str)?;

        let external = match ini.section(Some("External")) {
            None => None,
            Some(section) => {
                let url = section.get("url").ok_or(Error::MissingKey("External.url"))?;
                let url = Url::parse(url).map_err(Error::InvalidUrl)?;
                let filename = section.get("filename").ok_or(Error::MissingKey("External.filename"))?.to_owned();
                let sha256sum = section.get("sha256sum").ok_or(Error::MissingKey("External.sha256sum"))?.to_owned();
                Some(ExternalAsset { url, filename, sha256sum })
            }
        };

        Ok(Manifest { app_id, version, external })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read manifest {0:?}")]
    Read(std::path::PathBuf, #[source] ini::Error),
    #[error("could not parse manifest")]
    Parse(#[source] ini::ParseError),
    #[error("manifest is missing the [{0}] section")]
    MissingSection(&'static str),
    #[error("manifest is missing {0}")]
    MissingKey(&'static str),
    #[error("manifest app_id {0:?} is not a legal application id")]
    IllegalAppId(String),
    #[error("manifest version is malformed")]
    Version(#[from] version::ParseError),
    #[error("external asset url is invalid")]
    InvalidUrl(#[source] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let manifest = Manifest::parse_str("[Bundle]\napp_id = com.example.App\nversion = 1:2.0-1\n").unwrap();
        assert_eq!(manifest.app_id, "com.example.App");
        assert_eq!(manifest.version.epoch, 1);
        assert!(manifest.external.is_none());
    }

    #[test]
    fn parses_external_asset_section() {
        let manifest = Manifest::parse_str(
            "[Bundle]\napp_id = com.example.App\nversion = 1.0\n\n\
             [External]\nurl = https://example.com/asset.bin\nfilename = asset.bin\nsha256sum = deadbeef\n",
        )
        .unwrap();
        let external = manifest.external.unwrap();
        assert_eq!(external.filename, "asset.bin");
        assert_eq!(external.sha256sum, "deadbeef");
    }

    #[test]
    fn rejects_illegal_app_id() {
        let err = Manifest::parse_str("[Bundle]\napp_id = not a legal id\nversion = 1.0\n").unwrap_err();
        assert!(matches!(err, Error::IllegalAppId(_)));
    }

    #[test]
    fn rejects_missing_version() {
        let err = Manifest::parse_str("[Bundle]\napp_id = com.example.App\n").unwrap_err();
        assert!(matches!(err, Error::MissingKey("Bundle.version")));
    }
}
