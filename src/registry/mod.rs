// src/registry/mod.rs

//! Package registry: the local database of installed packages and the
//! remote candidate catalog, behind one query interface.

mod memory;

pub use memory::MemoryRegistry;

use crate::error::Result;
use crate::package::{LoadRequest, PackageRecord};
use serde::{Deserialize, Serialize};

/// Which of the two record sets a query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    Installed,
    Remote,
}

/// How a query pattern is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Every record; the pattern is ignored.
    All,
    /// Exact name or origin match.
    Exact,
    /// Shell glob over the name.
    Glob,
    /// POSIX basic regular expression over the name.
    Regex,
    /// POSIX extended regular expression over the name.
    ERegex,
    /// Reserved for attribute conditions; not implemented.
    Condition,
}

/// Aggregate counts over the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    pub installed_packages: u64,
    pub installed_bytes: u64,
    pub remote_packages: u64,
    pub remote_bytes: u64,
}

/// Lazily produced query results. Rows materialize as the iterator is
/// driven; dropping it early abandons the rest.
pub struct RegistryIter<'a> {
    inner: Box<dyn Iterator<Item = Result<PackageRecord>> + 'a>,
}

impl<'a> RegistryIter<'a> {
    pub fn new(inner: impl Iterator<Item = Result<PackageRecord>> + 'a) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }
}

impl Iterator for RegistryIter<'_> {
    type Item = Result<PackageRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

pub trait Registry {
    /// Fetch one record by origin, populating the requested facets.
    fn lookup(
        &self,
        catalog: Catalog,
        origin: &str,
        load: &LoadRequest,
    ) -> Result<Option<PackageRecord>>;

    /// Pattern query over a catalog. Results come back in stable
    /// (origin-sorted) order.
    fn query<'a>(
        &'a self,
        catalog: Catalog,
        pattern: &str,
        kind: MatchKind,
        load: &'a LoadRequest,
    ) -> Result<RegistryIter<'a>>;

    /// Record a package as installed.
    fn register(&mut self, record: PackageRecord) -> Result<()>;

    /// Drop an installed package by origin.
    fn unregister(&mut self, origin: &str) -> Result<()>;

    fn stats(&self) -> Result<RegistryStats>;
}
