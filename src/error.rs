// src/error.rs

//! Error taxonomy shared across the crate
//!
//! Every user-visible failure carries the acting identity (URL, package,
//! or dependency name) so operators can act on the message without
//! re-running in verbose mode.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Unrecoverable within the current call.
    #[error("{0}")]
    Fatal(String),

    /// I/O failure with the operation context attached.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Transport failure carrying the last error seen for the URL.
    #[error("{url}: {reason}")]
    Download { url: String, reason: String },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    /// Removal blocked by a live dependent.
    #[error("{package} is required by {required_by}")]
    RequiredBy {
        package: String,
        required_by: String,
    },

    /// Resolution cannot complete; names both sides of the missing edge.
    #[error("{package}: missing dependency {dependency}")]
    UnresolvedDependency {
        package: String,
        dependency: String,
    },

    #[error("{0} is already installed")]
    AlreadyInstalled(String),

    #[error("circular dependency: {0}")]
    CircularDependency(String),

    /// Precondition failure, fatal before any job runs.
    #[error("no local package database")]
    NoLocalDatabase,

    /// Not an error: the local copy is at least as fresh as the remote.
    #[error("{0} is already up to date")]
    UpToDate(String),

    #[error("unknown package: {0}")]
    UnknownItem(String),

    /// Persisted state was written by an incompatible version.
    #[error("package database schema is from an incompatible version")]
    IncompatibleSchema,

    /// The scheduler refuses queue mutation while a run is in flight.
    #[error("an apply is already in progress")]
    ApplyInProgress,

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },
}

impl Error {
    /// Wrap an I/O error with the path or operation it concerns.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }
}

/// Process-level result codes surfaced by the binary.
///
/// Each code maps one error kind so scripts can branch on the exit
/// status without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Ok,
    EndOfIteration,
    Warn,
    Fatal,
    RequiredByDependents,
    AlreadyInstalled,
    UnresolvedDependency,
    NoLocalDatabase,
    UpToDate,
    UnknownItem,
    IncompatibleSchema,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Ok => 0,
            ExitStatus::EndOfIteration => 1,
            ExitStatus::Warn => 2,
            ExitStatus::Fatal => 3,
            ExitStatus::RequiredByDependents => 4,
            ExitStatus::AlreadyInstalled => 5,
            ExitStatus::UnresolvedDependency => 6,
            ExitStatus::NoLocalDatabase => 7,
            ExitStatus::UpToDate => 8,
            ExitStatus::UnknownItem => 9,
            ExitStatus::IncompatibleSchema => 10,
        }
    }
}

impl From<&Error> for ExitStatus {
    fn from(err: &Error) -> Self {
        match err {
            Error::RequiredBy { .. } => ExitStatus::RequiredByDependents,
            Error::AlreadyInstalled(_) => ExitStatus::AlreadyInstalled,
            Error::UnresolvedDependency { .. } | Error::CircularDependency(_) => {
                ExitStatus::UnresolvedDependency
            }
            Error::NoLocalDatabase => ExitStatus::NoLocalDatabase,
            Error::UpToDate(_) => ExitStatus::UpToDate,
            Error::UnknownItem(_) => ExitStatus::UnknownItem,
            Error::IncompatibleSchema => ExitStatus::IncompatibleSchema,
            _ => ExitStatus::Fatal,
        }
    }
}
