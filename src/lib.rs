// src/lib.rs

//! quay: package manager core.
//!
//! Dependency resolution, job scheduling, and reliable archive
//! fetching over a pluggable registry.

pub mod archive;
pub mod cli;
pub mod commands;
pub mod compression;
pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod hash;
pub mod jobs;
pub mod package;
pub mod registry;
pub mod resolver;
pub mod version;

pub use config::Config;
pub use error::{Error, ExitStatus, Result};
pub use events::{Event, EventSink};
pub use fetch::{FetchEngine, FetchOutcome, OpenMode};
pub use jobs::{ApplySummary, Job, JobKind, JobScheduler, JobState};
pub use package::{PackageIdentity, PackageRecord};
pub use registry::{Catalog, MemoryRegistry, Registry};
pub use resolver::Resolver;
pub use version::PkgVersion;
