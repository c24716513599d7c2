// tests/common/mod.rs

//! Shared fixtures: an on-disk repository served over file:// and
//! registries prepopulated with catalog entries.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use quay::archive::{ArchiveHandler, TarArchiveHandler};
use quay::compression::CompressionFormat;
use quay::hash::sha256_file;
use quay::package::{Dependency, Facet, Location, PackageFile, PackageRecord};
use quay::registry::{MemoryRegistry, Registry};
use quay::version::PkgVersion;
use std::path::{Path, PathBuf};

pub fn record(name: &str, origin: &str, version: &str) -> PackageRecord {
    PackageRecord::new(name, origin, PkgVersion::parse(version).unwrap())
}

pub fn dep(name: &str, origin: &str) -> Dependency {
    Dependency {
        name: name.to_owned(),
        origin: origin.to_owned(),
        version: "1.0".to_owned(),
    }
}

/// Remote catalog entry with dependencies and a placeholder archive
/// location; resolver tests never touch the archive itself.
pub fn remote(name: &str, origin: &str, version: &str, deps: &[(&str, &str)]) -> PackageRecord {
    let mut r = record(name, origin, version);
    r.repo_path = Some(format!("All/{name}-{version}.tgz"));
    r.archive_checksum = Some(format!("{name:0<64}"));
    r.deps = Facet::Loaded(deps.iter().map(|(n, o)| dep(n, o)).collect());
    r
}

pub fn installed(name: &str, origin: &str, version: &str, deps: &[(&str, &str)]) -> PackageRecord {
    let mut r = record(name, origin, version);
    r.location = Location::Installed;
    r.deps = Facet::Loaded(deps.iter().map(|(n, o)| dep(n, o)).collect());
    r
}

pub fn registry_with(
    remote_records: Vec<PackageRecord>,
    installed_records: Vec<PackageRecord>,
) -> MemoryRegistry {
    let mut reg = MemoryRegistry::new();
    reg.replace_remote(remote_records);
    for r in installed_records {
        reg.register(r).unwrap();
    }
    reg
}

/// A real package repository on disk: each package gets a payload
/// file, a tgz archive under `All/`, and a catalog record carrying the
/// archive's true checksum.
pub struct DiskRepo {
    pub root: PathBuf,
}

impl DiskRepo {
    pub fn new(root: &Path) -> Self {
        std::fs::create_dir_all(root.join("All")).unwrap();
        Self {
            root: root.to_owned(),
        }
    }

    pub fn url(&self) -> String {
        url::Url::from_directory_path(&self.root)
            .unwrap()
            .to_string()
            .trim_end_matches('/')
            .to_owned()
    }

    /// Publish a package and return its catalog record.
    pub fn publish(&self, name: &str, origin: &str, deps: &[(&str, &str)]) -> PackageRecord {
        let stage = self.root.join("stage").join(name);
        let payload = format!("usr/local/share/{name}/payload");
        std::fs::create_dir_all(stage.join(format!("usr/local/share/{name}"))).unwrap();
        std::fs::write(stage.join(&payload), format!("contents of {name}")).unwrap();

        let mut r = record(name, origin, "1.0");
        r.files = Facet::Loaded(vec![PackageFile {
            path: format!("/{payload}"),
            checksum: None,
            owner: None,
            group: None,
            mode: 0o644,
        }]);

        let archive = TarArchiveHandler
            .create(&r, &stage, &self.root.join("All"), CompressionFormat::Tgz)
            .unwrap();

        r.repo_path = Some(format!("All/{}", archive.file_name().unwrap().to_str().unwrap()));
        r.archive_checksum = Some(sha256_file(&archive).unwrap());
        r.deps = Facet::Loaded(deps.iter().map(|(n, o)| dep(n, o)).collect());
        r
    }
}
