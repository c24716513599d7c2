// src/package/mod.rs

//! Package data model: identities, records, and loadable facets
//!
//! A `PackageRecord` is immutable once loaded. Collection-valued parts of
//! a record (dependencies, files, scripts, ...) are facets: a registry
//! lookup only populates the facets named in the `LoadRequest`, and a
//! facet that was never requested is `Facet::Absent`, which is distinct
//! from a loaded-but-empty collection. The distinction survives
//! serialization so a partially loaded record round-trips faithfully.

use crate::error::{Error, Result};
use crate::version::PkgVersion;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The (name, origin, version) key identifying a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub name: String,
    pub origin: String,
    pub version: PkgVersion,
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// License combination logic carried on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LicenseLogic {
    #[default]
    Single,
    And,
    Or,
}

/// Where a record was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    /// Registered in the local database.
    Installed,
    /// Candidate from a remote repository catalog.
    Remote,
    /// A local archive file.
    File,
}

/// Install-lifecycle script phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptKind {
    PreInstall,
    PostInstall,
    PreDeinstall,
    PostDeinstall,
    PreUpgrade,
    PostUpgrade,
    Install,
    Deinstall,
    Upgrade,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub kind: ScriptKind,
    pub body: String,
}

/// A weak reference to another package; resolved against the registry,
/// never owning the referenced record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub origin: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFile {
    pub path: String,
    pub checksum: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDir {
    pub path: String,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub mode: u32,
    /// Remove only if empty at deinstall time.
    pub try_remove: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageOption {
    pub key: String,
    pub value: String,
}

/// One optionally loaded component of a record.
///
/// `Absent` means the facet was never requested from the registry;
/// `Loaded` means it was, even when the loaded collection is empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Facet<T> {
    #[default]
    Absent,
    Loaded(T),
}

impl<T> Facet<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Facet::Loaded(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Facet::Loaded(v) => Some(v),
            Facet::Absent => None,
        }
    }
}

impl<T> Facet<Vec<T>> {
    /// View the facet as a slice; an absent facet yields an empty one.
    pub fn as_slice(&self) -> &[T] {
        match self {
            Facet::Loaded(v) => v.as_slice(),
            Facet::Absent => &[],
        }
    }
}

/// Request-time option set naming which facets a lookup populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadRequest {
    pub deps: bool,
    pub rdeps: bool,
    pub files: bool,
    pub scripts: bool,
    pub options: bool,
    pub mtree: bool,
    pub dirs: bool,
    pub categories: bool,
    pub licenses: bool,
    pub users: bool,
    pub groups: bool,
    pub shlibs: bool,
}

impl LoadRequest {
    /// Identity and scalar attributes only; no facets.
    pub fn basic() -> Self {
        Self::default()
    }

    /// Every facet.
    pub fn all() -> Self {
        Self {
            deps: true,
            rdeps: true,
            files: true,
            scripts: true,
            options: true,
            mtree: true,
            dirs: true,
            categories: true,
            licenses: true,
            users: true,
            groups: true,
            shlibs: true,
        }
    }

    pub fn with_deps(mut self) -> Self {
        self.deps = true;
        self
    }

    pub fn with_rdeps(mut self) -> Self {
        self.rdeps = true;
        self
    }

    pub fn with_files(mut self) -> Self {
        self.files = true;
        self
    }

    pub fn with_scripts(mut self) -> Self {
        self.scripts = true;
        self
    }
}

/// Immutable-once-loaded description of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub origin: String,
    pub version: PkgVersion,
    pub comment: String,
    /// Installed size in bytes, as recorded by the packager.
    pub flat_size: i64,
    /// One-time message shown after install.
    pub message: Option<String>,
    pub license_logic: LicenseLogic,
    pub location: Location,
    /// Pulled in only as a dependency, eligible for autoremoval.
    pub automatic: bool,
    /// Archive path relative to the repository root (remote candidates).
    pub repo_path: Option<String>,
    /// SHA-256 of the package archive (remote candidates).
    pub archive_checksum: Option<String>,

    pub deps: Facet<Vec<Dependency>>,
    pub rdeps: Facet<Vec<Dependency>>,
    pub files: Facet<Vec<PackageFile>>,
    pub dirs: Facet<Vec<PackageDir>>,
    pub scripts: Facet<Vec<Script>>,
    pub options: Facet<Vec<PackageOption>>,
    pub categories: Facet<Vec<String>>,
    pub licenses: Facet<Vec<String>>,
    pub users: Facet<Vec<String>>,
    pub groups: Facet<Vec<String>>,
    /// Shared libraries this package requires.
    pub shlibs_required: Facet<Vec<String>>,
    /// Shared libraries this package provides.
    pub shlibs_provided: Facet<Vec<String>>,
    pub mtree: Facet<String>,
}

impl PackageRecord {
    pub fn new(name: impl Into<String>, origin: impl Into<String>, version: PkgVersion) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            version,
            comment: String::new(),
            flat_size: 0,
            message: None,
            license_logic: LicenseLogic::default(),
            location: Location::Remote,
            automatic: false,
            repo_path: None,
            archive_checksum: None,
            deps: Facet::Absent,
            rdeps: Facet::Absent,
            files: Facet::Absent,
            dirs: Facet::Absent,
            scripts: Facet::Absent,
            options: Facet::Absent,
            categories: Facet::Absent,
            licenses: Facet::Absent,
            users: Facet::Absent,
            groups: Facet::Absent,
            shlibs_required: Facet::Absent,
            shlibs_provided: Facet::Absent,
            mtree: Facet::Absent,
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity {
            name: self.name.clone(),
            origin: self.origin.clone(),
            version: self.version.clone(),
        }
    }

    pub fn is_installed(&self) -> bool {
        self.location == Location::Installed
    }

    /// Sanity-check a record against its location.
    pub fn is_valid(&self) -> Result<()> {
        if self.name.is_empty() || self.origin.is_empty() {
            return Err(Error::Fatal(format!(
                "package record missing name or origin ({}/{})",
                self.name, self.origin
            )));
        }
        if self.location == Location::Remote && self.repo_path.is_none() {
            return Err(Error::Fatal(format!(
                "remote candidate {} has no repository path",
                self.origin
            )));
        }
        Ok(())
    }

    /// Clone this record keeping only the facets named in `load`.
    ///
    /// This is how a registry implements the facet capability mask: the
    /// backing store keeps full records and hands out masked views.
    pub fn masked(&self, load: &LoadRequest) -> PackageRecord {
        fn keep<T: Clone>(wanted: bool, facet: &Facet<T>) -> Facet<T> {
            if wanted {
                facet.clone()
            } else {
                Facet::Absent
            }
        }

        let mut out = self.clone();
        out.deps = keep(load.deps, &self.deps);
        out.rdeps = keep(load.rdeps, &self.rdeps);
        out.files = keep(load.files, &self.files);
        out.dirs = keep(load.dirs, &self.dirs);
        out.scripts = keep(load.scripts, &self.scripts);
        out.options = keep(load.options, &self.options);
        out.categories = keep(load.categories, &self.categories);
        out.licenses = keep(load.licenses, &self.licenses);
        out.users = keep(load.users, &self.users);
        out.groups = keep(load.groups, &self.groups);
        out.shlibs_required = keep(load.shlibs, &self.shlibs_required);
        out.shlibs_provided = keep(load.shlibs, &self.shlibs_provided);
        out.mtree = keep(load.mtree, &self.mtree);
        out
    }
}
