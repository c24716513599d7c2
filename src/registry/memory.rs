// src/registry/memory.rs

//! BTreeMap-backed registry persisted as a JSON snapshot.

use super::{Catalog, MatchKind, Registry, RegistryIter, RegistryStats};
use crate::error::{Error, Result};
use crate::package::{LoadRequest, Location, PackageRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Snapshot {
    schema: u32,
    installed: BTreeMap<String, PackageRecord>,
    remote: BTreeMap<String, PackageRecord>,
}

/// Registry held fully in memory, keyed by origin. BTreeMaps keep
/// query results in a stable order without an explicit sort.
#[derive(Default)]
pub struct MemoryRegistry {
    installed: BTreeMap<String, PackageRecord>,
    remote: BTreeMap<String, PackageRecord>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot from disk. A missing file means no database has
    /// been initialized yet; a file we cannot decode means it was
    /// written by an incompatible version.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NoLocalDatabase);
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
        let snapshot: Snapshot =
            serde_json::from_str(&raw).map_err(|_| Error::IncompatibleSchema)?;
        if snapshot.schema != SCHEMA_VERSION {
            return Err(Error::IncompatibleSchema);
        }
        debug!(
            installed = snapshot.installed.len(),
            remote = snapshot.remote.len(),
            "loaded registry snapshot"
        );
        Ok(Self {
            installed: snapshot.installed,
            remote: snapshot.remote,
        })
    }

    /// Load a snapshot, or start empty if none exists yet.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(registry) => Ok(registry),
            Err(Error::NoLocalDatabase) => Ok(Self::new()),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
        }
        let snapshot = Snapshot {
            schema: SCHEMA_VERSION,
            installed: self.installed.clone(),
            remote: self.remote.clone(),
        };
        let raw = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| Error::Fatal(format!("serializing registry: {e}")))?;
        std::fs::write(path, raw)
            .map_err(|e| Error::io(format!("writing {}", path.display()), e))
    }

    /// Replace the remote catalog wholesale, as after a catalog update.
    pub fn replace_remote(&mut self, records: Vec<PackageRecord>) {
        self.remote.clear();
        for mut record in records {
            record.location = Location::Remote;
            self.remote.insert(record.origin.clone(), record);
        }
    }

    fn catalog(&self, which: Catalog) -> &BTreeMap<String, PackageRecord> {
        match which {
            Catalog::Installed => &self.installed,
            Catalog::Remote => &self.remote,
        }
    }
}

fn matcher(pattern: &str, kind: MatchKind) -> Result<Box<dyn Fn(&PackageRecord) -> bool>> {
    match kind {
        MatchKind::All => Ok(Box::new(|_| true)),
        MatchKind::Exact => {
            let pattern = pattern.to_owned();
            Ok(Box::new(move |r| r.name == pattern || r.origin == pattern))
        }
        MatchKind::Glob => {
            let glob = glob::Pattern::new(pattern)
                .map_err(|e| Error::Fatal(format!("bad glob pattern {pattern:?}: {e}")))?;
            Ok(Box::new(move |r| glob.matches(&r.name)))
        }
        MatchKind::Regex | MatchKind::ERegex => {
            let re = regex::Regex::new(pattern)
                .map_err(|e| Error::Fatal(format!("bad pattern {pattern:?}: {e}")))?;
            Ok(Box::new(move |r| re.is_match(&r.name)))
        }
        MatchKind::Condition => Err(Error::Fatal(
            "condition matching is not implemented".to_owned(),
        )),
    }
}

impl Registry for MemoryRegistry {
    fn lookup(
        &self,
        catalog: Catalog,
        origin: &str,
        load: &LoadRequest,
    ) -> Result<Option<PackageRecord>> {
        Ok(self.catalog(catalog).get(origin).map(|r| r.masked(load)))
    }

    fn query<'a>(
        &'a self,
        catalog: Catalog,
        pattern: &str,
        kind: MatchKind,
        load: &'a LoadRequest,
    ) -> Result<RegistryIter<'a>> {
        let accept = matcher(pattern, kind)?;
        let rows = self
            .catalog(catalog)
            .values()
            .filter(move |r| accept(r))
            .map(move |r| Ok(r.masked(load)));
        Ok(RegistryIter::new(rows))
    }

    fn register(&mut self, mut record: PackageRecord) -> Result<()> {
        record.is_valid()?;
        record.location = Location::Installed;
        debug!(origin = %record.origin, version = %record.version, "registering");
        self.installed.insert(record.origin.clone(), record);
        Ok(())
    }

    fn unregister(&mut self, origin: &str) -> Result<()> {
        match self.installed.remove(origin) {
            Some(_) => Ok(()),
            None => Err(Error::UnknownItem(origin.to_owned())),
        }
    }

    fn stats(&self) -> Result<RegistryStats> {
        Ok(RegistryStats {
            installed_packages: self.installed.len() as u64,
            installed_bytes: self
                .installed
                .values()
                .map(|r| r.flat_size.max(0) as u64)
                .sum(),
            remote_packages: self.remote.len() as u64,
            remote_bytes: self
                .remote
                .values()
                .map(|r| r.flat_size.max(0) as u64)
                .sum(),
        })
    }
}
