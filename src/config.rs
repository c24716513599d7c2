// src/config.rs

//! Configuration for quay.
//!
//! A `Config` is an explicit value threaded to the engines that need it.
//! It is loaded once from a TOML file (or defaults) and not mutated
//! afterwards; callers that want different settings build a different
//! `Config`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_repo_url() -> String {
    "https://pkg.quay.example/latest".to_owned()
}

fn default_db_dir() -> PathBuf {
    PathBuf::from("/var/db/quay")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/quay")
}

fn default_install_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_fetch_retry() -> u32 {
    3
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// A named repository beyond the primary one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoEntry {
    pub name: String,
    pub url: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the primary package repository.
    pub repo_url: String,
    /// Directory holding the local package database.
    pub db_dir: PathBuf,
    /// Directory where fetched archives are kept.
    pub cache_dir: PathBuf,
    /// Filesystem root packages are installed under.
    pub install_root: PathBuf,
    /// Total download attempt budget per file.
    pub fetch_retry: u32,
    /// Per-request timeout for remote transfers.
    pub fetch_timeout_secs: u64,
    /// Discover mirrors via DNS SRV before fetching.
    pub srv_mirrors: bool,
    /// Pull in missing dependencies automatically.
    pub autodeps: bool,
    /// Abort the remaining jobs after the first failure.
    pub fail_fast: bool,
    pub repositories: Vec<RepoEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_url: default_repo_url(),
            db_dir: default_db_dir(),
            cache_dir: default_cache_dir(),
            install_root: default_install_root(),
            fetch_retry: default_fetch_retry(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            srv_mirrors: false,
            autodeps: true,
            fail_fast: false,
            repositories: Vec::new(),
        }
    }
}

impl Config {
    /// Load from a TOML file. A missing file yields the defaults;
    /// a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::io(format!("reading {}", path.display()), e))?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| Error::Fatal(format!("parsing {}: {e}", path.display())))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = toml::to_string_pretty(self)
            .map_err(|e| Error::Fatal(format!("serializing config: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::io(format!("creating {}", parent.display()), e))?;
        }
        std::fs::write(path, raw)
            .map_err(|e| Error::io(format!("writing {}", path.display()), e))
    }

    /// Typed lookup by key name, for the `config` CLI verb.
    pub fn string(&self, key: &str) -> Result<String> {
        match key {
            "repo_url" => Ok(self.repo_url.clone()),
            "db_dir" => Ok(self.db_dir.display().to_string()),
            "cache_dir" => Ok(self.cache_dir.display().to_string()),
            "install_root" => Ok(self.install_root.display().to_string()),
            _ => Err(Error::UnknownItem(key.to_owned())),
        }
    }

    pub fn bool(&self, key: &str) -> Result<bool> {
        match key {
            "srv_mirrors" => Ok(self.srv_mirrors),
            "autodeps" => Ok(self.autodeps),
            "fail_fast" => Ok(self.fail_fast),
            _ => Err(Error::UnknownItem(key.to_owned())),
        }
    }

    pub fn int64(&self, key: &str) -> Result<i64> {
        match key {
            "fetch_retry" => Ok(i64::from(self.fetch_retry)),
            "fetch_timeout_secs" => Ok(self.fetch_timeout_secs as i64),
            _ => Err(Error::UnknownItem(key.to_owned())),
        }
    }

    pub fn list(&self, key: &str) -> Result<Vec<String>> {
        match key {
            "repositories" => Ok(self
                .repositories
                .iter()
                .filter(|r| r.enabled)
                .map(|r| r.url.clone())
                .collect()),
            _ => Err(Error::UnknownItem(key.to_owned())),
        }
    }

    /// Path of the registry snapshot inside `db_dir`.
    pub fn registry_path(&self) -> PathBuf {
        self.db_dir.join("registry.json")
    }
}
