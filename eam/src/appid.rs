// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! A validated application id: the one string that flows, unescaped, from
//! bus method arguments down to a directory basename. Validating it once at
//! the edge means every downstream component can treat it as an opaque,
//! filesystem-safe token.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(String);

impl AppId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AppId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if eam_fslayout::is_legal_app_id(s) {
            Ok(AppId(s.to_owned()))
        } else {
            Err(Error::Illegal(s.to_owned()))
        }
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AppId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{0:?} is not a legal application id")]
    Illegal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reverse_dns_ids() {
        assert!("com.example.MyApp".parse::<AppId>().is_ok());
    }

    #[test]
    fn rejects_path_traversal_attempts() {
        assert!("../../etc/passwd".parse::<AppId>().is_err());
        assert!("com/example".parse::<AppId>().is_err());
    }

    #[test]
    fn display_round_trips_the_input() {
        let id: AppId = "com.example.App".parse().unwrap();
        assert_eq!(id.to_string(), "com.example.App");
    }
}
