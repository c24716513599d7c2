// src/version/mod.rs

//! Package version parsing and ordering
//!
//! Versions use the ports-style `version[_revision][,epoch]` format and a
//! domain-specific ordering: epoch dominates, the version body is compared
//! segment-wise (numeric runs numerically, so "1.10" sorts after "1.9"),
//! and the packaging revision breaks remaining ties.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A parsed package version with version body, revision, and epoch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PkgVersion {
    pub version: String,
    pub revision: u32,
    pub epoch: u64,
}

/// One comparable run of a version body: digits or everything else.
#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Number(u64),
    Text(&'a str),
}

fn segments(s: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            // Digit runs too long for u64 are compared as text; versions
            // that long are malformed anyway.
            match s[start..i].parse::<u64>() {
                Ok(n) => out.push(Segment::Number(n)),
                Err(_) => out.push(Segment::Text(&s[start..i])),
            }
        } else if bytes[i] == b'.' || bytes[i] == b'+' || bytes[i] == b'-' {
            i += 1;
        } else {
            let start = i;
            while i < bytes.len()
                && !bytes[i].is_ascii_digit()
                && bytes[i] != b'.'
                && bytes[i] != b'+'
                && bytes[i] != b'-'
            {
                i += 1;
            }
            out.push(Segment::Text(&s[start..i]));
        }
    }
    out
}

fn compare_bodies(a: &str, b: &str) -> Ordering {
    let left = segments(a);
    let right = segments(b);
    let mut l = left.iter();
    let mut r = right.iter();
    loop {
        match (l.next(), r.next()) {
            (None, None) => return Ordering::Equal,
            // The exhausted side is older: "1.0" < "1.0.1" and "1.0" < "1.0a".
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Segment::Number(x)), Some(Segment::Number(y))) => match x.cmp(y) {
                Ordering::Equal => {}
                ord => return ord,
            },
            (Some(Segment::Text(x)), Some(Segment::Text(y))) => match x.cmp(y) {
                Ordering::Equal => {}
                ord => return ord,
            },
            // A numeric segment outranks an alphabetic one at the same
            // position: "1.0.1" > "1.0a".
            (Some(Segment::Number(_)), Some(Segment::Text(_))) => return Ordering::Greater,
            (Some(Segment::Text(_)), Some(Segment::Number(_))) => return Ordering::Less,
        }
    }
}

impl PkgVersion {
    /// Parse a `version[_revision][,epoch]` string.
    ///
    /// Examples:
    /// - "1.2.3" → version="1.2.3", revision=0, epoch=0
    /// - "1.2.3_4" → version="1.2.3", revision=4, epoch=0
    /// - "1.2.3_4,2" → version="1.2.3", revision=4, epoch=2
    pub fn parse(s: &str) -> Result<Self> {
        let (rest, epoch) = match s.rsplit_once(',') {
            Some((rest, epoch_str)) => {
                let epoch = epoch_str
                    .parse::<u64>()
                    .map_err(|_| Error::InvalidVersion(s.to_string()))?;
                (rest, epoch)
            }
            None => (s, 0),
        };

        let (version, revision) = match rest.rsplit_once('_') {
            Some((v, rev)) if !rev.is_empty() && rev.chars().all(|c| c.is_ascii_digit()) => {
                let revision = rev
                    .parse::<u32>()
                    .map_err(|_| Error::InvalidVersion(s.to_string()))?;
                (v, revision)
            }
            // An underscore not followed by digits belongs to the version body.
            _ => (rest, 0),
        };

        if version.is_empty() {
            return Err(Error::InvalidVersion(s.to_string()));
        }

        Ok(Self {
            version: version.to_string(),
            revision,
            epoch,
        })
    }

    /// Compare two versions: epoch, then version body, then revision.
    pub fn compare(&self, other: &PkgVersion) -> Ordering {
        match self.epoch.cmp(&other.epoch) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match compare_bodies(&self.version, &other.version) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.revision.cmp(&other.revision)
    }
}

impl fmt::Display for PkgVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.version)?;
        if self.revision > 0 {
            write!(f, "_{}", self.revision)?;
        }
        if self.epoch > 0 {
            write!(f, ",{}", self.epoch)?;
        }
        Ok(())
    }
}

impl Ord for PkgVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for PkgVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Compare two version strings without keeping the parsed forms around.
pub fn version_cmp(a: &str, b: &str) -> Result<Ordering> {
    let left = PkgVersion::parse(a)?;
    let right = PkgVersion::parse(b)?;
    Ok(left.compare(&right))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let v = PkgVersion::parse("1.2.3").unwrap();
        assert_eq!(v.version, "1.2.3");
        assert_eq!(v.revision, 0);
        assert_eq!(v.epoch, 0);
    }

    #[test]
    fn test_parse_with_revision() {
        let v = PkgVersion::parse("1.2.3_4").unwrap();
        assert_eq!(v.version, "1.2.3");
        assert_eq!(v.revision, 4);
        assert_eq!(v.epoch, 0);
    }

    #[test]
    fn test_parse_full() {
        let v = PkgVersion::parse("1.2.3_4,2").unwrap();
        assert_eq!(v.version, "1.2.3");
        assert_eq!(v.revision, 4);
        assert_eq!(v.epoch, 2);
    }

    #[test]
    fn test_parse_underscore_in_body() {
        // "_beta" is not a revision suffix
        let v = PkgVersion::parse("2.0_beta").unwrap();
        assert_eq!(v.version, "2.0_beta");
        assert_eq!(v.revision, 0);
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(PkgVersion::parse("").is_err());
        assert!(PkgVersion::parse(",1").is_err());
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        assert_eq!(version_cmp("1.10", "1.9").unwrap(), Ordering::Greater);
        assert_eq!(version_cmp("0.99", "1.0").unwrap(), Ordering::Less);
    }

    #[test]
    fn test_epoch_dominates() {
        assert_eq!(version_cmp("1.0,2", "9.9,1").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_revision_breaks_ties() {
        assert_eq!(version_cmp("1.2.3_2", "1.2.3_1").unwrap(), Ordering::Greater);
        assert_eq!(version_cmp("1.2.3", "1.2.3_1").unwrap(), Ordering::Less);
    }

    #[test]
    fn test_longer_is_newer() {
        assert_eq!(version_cmp("1.0.1", "1.0").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_number_beats_letter() {
        assert_eq!(version_cmp("1.0.1", "1.0a").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_equal() {
        assert_eq!(
            version_cmp("1.2.3_1,1", "1.2.3_1,1").unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["1.2.3", "1.2.3_4", "1.2.3_4,2", "1.0,3"] {
            let v = PkgVersion::parse(s).unwrap();
            assert_eq!(v.to_string(), s);
        }
    }
}
