// src/compression/mod.rs

//! Archive compression formats and preference-ordered selection.
//!
//! When a repository offers a package under several compressions, the
//! preferred format is tried first and the rest follow a fixed
//! preference order, plain tar last. Selection walks the ordered list
//! once instead of chaining per-format fallbacks.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompressionFormat {
    Txz,
    Tbz,
    Tgz,
    Tar,
}

impl CompressionFormat {
    pub fn extension(self) -> &'static str {
        match self {
            CompressionFormat::Txz => "txz",
            CompressionFormat::Tbz => "tbz",
            CompressionFormat::Tgz => "tgz",
            CompressionFormat::Tar => "tar",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "txz" => Some(CompressionFormat::Txz),
            "tbz" => Some(CompressionFormat::Tbz),
            "tgz" => Some(CompressionFormat::Tgz),
            "tar" => Some(CompressionFormat::Tar),
            _ => None,
        }
    }

    /// Formats to try, starting from `preferred`, ending at plain tar.
    pub fn preference_from(preferred: CompressionFormat) -> Vec<CompressionFormat> {
        let mut order = vec![preferred];
        for f in [
            CompressionFormat::Txz,
            CompressionFormat::Tbz,
            CompressionFormat::Tgz,
            CompressionFormat::Tar,
        ] {
            if f != preferred {
                order.push(f);
            }
        }
        order
    }
}

impl fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Pick the first format, in preference order, that `available` accepts.
/// `available` is typically a repository existence probe.
pub fn select_format<F>(
    preferred: CompressionFormat,
    base_name: &str,
    mut available: F,
) -> Option<(CompressionFormat, String)>
where
    F: FnMut(&str) -> bool,
{
    for format in CompressionFormat::preference_from(preferred) {
        let candidate = format!("{base_name}.{}", format.extension());
        if available(&candidate) {
            return Some((format, candidate));
        }
    }
    None
}
