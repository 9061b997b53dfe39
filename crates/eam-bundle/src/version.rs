// SPDX-FileCopyrightText: Copyright © 2020-2026 Endless Application Manager Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Debian-style package version parsing and ordering.
//!
//! A version is `[epoch:]upstream[-revision]`. Ordering compares epochs
//! numerically, then `upstream`, then `revision`, each of the latter two
//! using the same digit/non-digit segment rule.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub epoch: u32,
    pub upstream: String,
    pub revision: Option<String>,
}

impl Version {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        if input.is_empty() {
            return Err(ParseError::Empty);
        }
        if !input.is_ascii() {
            return Err(ParseError::NotAscii);
        }

        let trimmed = input.trim_matches(|c: char| c.is_ascii_whitespace());
        if trimmed.is_empty() {
            return Err(ParseError::Empty);
        }
        if trimmed.contains(|c: char| c.is_ascii_whitespace()) {
            return Err(ParseError::EmbeddedSpace);
        }

        let (epoch, rest) = match trimmed.split_once(':') {
            Some((epoch_str, rest)) => {
                let epoch = epoch_str.parse::<u32>().map_err(|_| ParseError::MalformedEpoch)?;
                if rest.is_empty() {
                    return Err(ParseError::EmptyAfterColon);
                }
                (epoch, rest)
            }
            None => (0, trimmed),
        };

        let (upstream, revision) = match rest.rsplit_once('-') {
            Some((upstream, revision)) => (upstream.to_owned(), Some(revision.to_owned())),
            None => (rest.to_owned(), None),
        };

        let mut chars = upstream.chars();
        match chars.next() {
            Some(c) if c.is_ascii_digit() => {}
            _ => return Err(ParseError::UpstreamMustStartWithDigit),
        }
        if !upstream.chars().all(|c| c.is_ascii_alphanumeric() || ".-+~:".contains(c)) {
            return Err(ParseError::InvalidUpstreamChar);
        }
        if let Some(revision) = &revision {
            if !revision.chars().all(|c| c.is_ascii_alphanumeric() || ".+~".contains(c)) {
                return Err(ParseError::InvalidRevisionChar);
            }
        }

        Ok(Version { epoch, upstream, revision })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.upstream)?;
        if let Some(revision) = &self.revision {
            write!(f, "-{revision}")?;
        }
        Ok(())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| verrevcmp(&self.upstream, &other.upstream))
            .then_with(|| verrevcmp(self.revision.as_deref().unwrap_or(""), other.revision.as_deref().unwrap_or("")))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn order(c: u8) -> i32 {
    if c == 0 || c.is_ascii_digit() {
        0
    } else if c.is_ascii_alphabetic() {
        i32::from(c)
    } else if c == b'~' {
        -1
    } else {
        i32::from(c) + 256
    }
}

fn byte_at(s: &[u8], i: usize) -> u8 {
    s.get(i).copied().unwrap_or(0)
}

fn is_digit_at(s: &[u8], i: usize) -> bool {
    s.get(i).is_some_and(u8::is_ascii_digit)
}

/// The dpkg `verrevcmp` segment rule: interleaved non-digit and digit runs,
/// non-digit runs ordered by [`order`], digit runs compared as integers.
fn verrevcmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut ai, mut bi) = (0usize, 0usize);

    while ai < a.len() || bi < b.len() {
        let mut first_diff: i32 = 0;

        while (ai < a.len() && !a[ai].is_ascii_digit()) || (bi < b.len() && !b[bi].is_ascii_digit()) {
            let ac = order(byte_at(a, ai));
            let bc = order(byte_at(b, bi));
            if ac != bc {
                return ac.cmp(&bc);
            }
            ai += 1;
            bi += 1;
        }

        while byte_at(a, ai) == b'0' {
            ai += 1;
        }
        while byte_at(b, bi) == b'0' {
            bi += 1;
        }

        while is_digit_at(a, ai) && is_digit_at(b, bi) {
            if first_diff == 0 {
                first_diff = i32::from(a[ai]) - i32::from(b[bi]);
            }
            ai += 1;
            bi += 1;
        }

        if is_digit_at(a, ai) {
            return Ordering::Greater;
        }
        if is_digit_at(b, bi) {
            return Ordering::Less;
        }
        if first_diff != 0 {
            return first_diff.cmp(&0);
        }
    }

    Ordering::Equal
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("version string is empty")]
    Empty,
    #[error("version string is not ASCII")]
    NotAscii,
    #[error("version string has embedded whitespace")]
    EmbeddedSpace,
    #[error("epoch is not a valid non-negative integer")]
    MalformedEpoch,
    #[error("nothing after the epoch colon")]
    EmptyAfterColon,
    #[error("upstream version must start with a digit")]
    UpstreamMustStartWithDigit,
    #[error("upstream version contains an invalid character")]
    InvalidUpstreamChar,
    #[error("revision contains an invalid character")]
    InvalidRevisionChar,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_epoch_upstream_revision() {
        let v = Version::parse("1:2.5.0-3").unwrap();
        assert_eq!(v.epoch, 1);
        assert_eq!(v.upstream, "2.5.0");
        assert_eq!(v.revision.as_deref(), Some("3"));
    }

    #[test]
    fn defaults_epoch_to_zero_and_revision_to_none() {
        let v = Version::parse("2.5.0").unwrap();
        assert_eq!(v.epoch, 0);
        assert_eq!(v.revision, None);
    }

    #[test]
    fn rejects_embedded_spaces() {
        assert_eq!(Version::parse("1.0 beta").unwrap_err(), ParseError::EmbeddedSpace);
    }

    #[test]
    fn rejects_non_digit_leading_upstream() {
        assert_eq!(Version::parse("v1.0").unwrap_err(), ParseError::UpstreamMustStartWithDigit);
    }

    #[test]
    fn epoch_dominates_ordering() {
        let lo = Version::parse("5:1.0").unwrap();
        let hi = Version::parse("1:99.0").unwrap();
        assert!(lo > hi);
    }

    #[test]
    fn numeric_segments_compare_as_integers_not_strings() {
        let a = Version::parse("1.9").unwrap();
        let b = Version::parse("1.10").unwrap();
        assert!(a < b);
    }

    #[test]
    fn tilde_sorts_before_everything() {
        let pre = Version::parse("1.0~beta").unwrap();
        let release = Version::parse("1.0").unwrap();
        assert!(pre < release);
    }

    #[test]
    fn revision_breaks_upstream_ties() {
        let a = Version::parse("1.0-1").unwrap();
        let b = Version::parse("1.0-2").unwrap();
        assert!(a < b);
    }

    #[test]
    fn equal_versions_compare_equal() {
        assert_eq!(Version::parse("1:2.0-1").unwrap(), Version::parse("1:2.0-1").unwrap());
    }

    #[test]
    fn cmp_is_antisymmetric_and_reflexive() {
        let specimens = ["1.0", "1.0-1", "1.0-2", "1.0~rc1", "1.0a", "1.0b", "0:1.0", "1:0", "2.0", "10.0"];
        let parsed: Vec<_> = specimens.iter().map(|s| Version::parse(s).unwrap()).collect();
        for a in &parsed {
            assert_eq!(a.cmp(a), Ordering::Equal);
            for b in &parsed {
                assert_eq!(a.cmp(b), b.cmp(a).reverse());
            }
        }
    }

    #[test]
    fn debian_style_ordering_specimens() {
        let lt = |a: &str, b: &str| assert!(Version::parse(a).unwrap() < Version::parse(b).unwrap(), "{a} should be < {b}");
        lt("1.0", "1.0-1");
        lt("1.0-1", "1.0-2");
        lt("1.0~rc1", "1.0");
        lt("1.0a", "1.0b");
        lt("0:1.0", "1:0");
    }

    #[test]
    fn version_compare_oracle_scenarios() {
        assert_eq!(Version::parse("1:1.0-1").unwrap().cmp(&Version::parse("1:1.0-2").unwrap()), Ordering::Less);
        assert_eq!(Version::parse("2.0").unwrap().cmp(&Version::parse("10.0").unwrap()), Ordering::Less);
        assert_eq!(Version::parse("1.0~beta").unwrap().cmp(&Version::parse("1.0").unwrap()), Ordering::Less);
        assert_eq!(Version::parse("1.0a").unwrap().cmp(&Version::parse("1.0").unwrap()), Ordering::Greater);
    }
}
