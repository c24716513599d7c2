// src/jobs/mod.rs

//! Job queue and scheduler: executes planned install, removal, and
//! fetch work against the registry, the archive handler, and the fetch
//! engine.

use crate::archive::ArchiveHandler;
use crate::compression::{select_format, CompressionFormat};
use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use crate::fetch::{FetchEngine, FetchOutcome};
use crate::hash::{is_sha256_hex, verify_file_sha256};
use crate::package::{Location, PackageIdentity, PackageRecord};
use crate::registry::Registry;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Install,
    Deinstall,
    Fetch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Fetching,
    Installing,
    Succeeded,
    /// Nothing to do, typically because the package is already
    /// installed at the same or a newer version.
    Skipped,
    Failed(String),
}

/// One unit of planned work.
#[derive(Debug, Clone)]
pub struct Job {
    pub kind: JobKind,
    pub package: PackageRecord,
    /// 1-based position in the plan.
    pub position: usize,
    pub state: JobState,
}

impl Job {
    pub fn new(kind: JobKind, package: PackageRecord) -> Self {
        Self {
            kind,
            package,
            position: 0,
            state: JobState::Pending,
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        self.package.identity()
    }
}

/// What happened across one `apply` run.
#[derive(Debug, Default, PartialEq)]
pub struct ApplySummary {
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: Vec<(PackageIdentity, String)>,
    /// Jobs never attempted because an earlier failure aborted the run.
    pub aborted: u64,
}

impl ApplySummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && self.aborted == 0
    }
}

/// Runs queued jobs in plan order, one at a time.
///
/// A failure poisons the packages that depend on the failed one: their
/// jobs fail without being attempted. With `fail_fast` every remaining
/// job is abandoned instead.
pub struct JobScheduler<'a> {
    registry: &'a mut dyn Registry,
    archive: &'a dyn ArchiveHandler,
    fetch: &'a FetchEngine,
    events: &'a dyn EventSink,
    cache_dir: PathBuf,
    repo_url: String,
    install_root: PathBuf,
    fail_fast: bool,
    queue: Vec<Job>,
    applying: bool,
}

impl<'a> JobScheduler<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: &'a mut dyn Registry,
        archive: &'a dyn ArchiveHandler,
        fetch: &'a FetchEngine,
        events: &'a dyn EventSink,
        cache_dir: PathBuf,
        repo_url: String,
        install_root: PathBuf,
        fail_fast: bool,
    ) -> Self {
        Self {
            registry,
            archive,
            fetch,
            events,
            cache_dir,
            repo_url,
            install_root,
            fail_fast,
            queue: Vec::new(),
            applying: false,
        }
    }

    pub fn queue(&self) -> &[Job] {
        &self.queue
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Append jobs to the queue and renumber positions. Refused while
    /// an apply is running.
    pub fn enqueue(&mut self, jobs: Vec<Job>) -> Result<()> {
        if self.applying {
            return Err(Error::ApplyInProgress);
        }
        self.queue.extend(jobs);
        for (i, job) in self.queue.iter_mut().enumerate() {
            job.position = i + 1;
        }
        Ok(())
    }

    /// Run every queued job. The queue is consumed whether or not the
    /// run succeeds. With `force`, jobs pre-skipped as already
    /// satisfied are executed anyway.
    pub fn apply(&mut self, force: bool) -> Result<ApplySummary> {
        // Install and removal both require an initialized database.
        self.registry.stats().map_err(|_| Error::NoLocalDatabase)?;

        if self.applying {
            return Err(Error::ApplyInProgress);
        }
        self.applying = true;
        let queue = std::mem::take(&mut self.queue);
        let result = self.run_queue(queue, force);
        self.applying = false;
        result
    }

    fn run_queue(&mut self, mut queue: Vec<Job>, force: bool) -> Result<ApplySummary> {
        let mut summary = ApplySummary::default();
        let mut failed_origins: HashSet<String> = HashSet::new();
        let mut abort = false;

        for job in &mut queue {
            if abort {
                job.state = JobState::Failed("aborted".to_owned());
                summary.aborted += 1;
                continue;
            }

            if job.state == JobState::Skipped {
                if force {
                    job.state = JobState::Pending;
                } else {
                    self.events.emit(Event::AlreadyInstalled(job.identity()));
                    summary.skipped += 1;
                    continue;
                }
            }

            // A job whose dependency failed cannot succeed.
            if let Some(dep) = job
                .package
                .deps
                .as_slice()
                .iter()
                .find(|d| failed_origins.contains(&d.origin))
            {
                let reason = format!("dependency {} failed", dep.origin);
                self.events.emit(Event::MissingDependency {
                    package: job.package.name.clone(),
                    dependency: dep.name.clone(),
                });
                job.state = JobState::Failed(reason.clone());
                failed_origins.insert(job.package.origin.clone());
                summary.failed.push((job.identity(), reason));
                if self.fail_fast {
                    abort = true;
                }
                continue;
            }

            match self.run_job(job) {
                Ok(()) => {
                    job.state = JobState::Succeeded;
                    summary.succeeded += 1;
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.events.emit(Event::Error(reason.clone()));
                    job.state = JobState::Failed(reason.clone());
                    failed_origins.insert(job.package.origin.clone());
                    summary.failed.push((job.identity(), reason));
                    if self.fail_fast {
                        abort = true;
                    }
                }
            }
        }

        info!(
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            aborted = summary.aborted,
            "apply finished"
        );
        Ok(summary)
    }

    fn run_job(&mut self, job: &mut Job) -> Result<()> {
        debug!(position = job.position, package = %job.package.origin, kind = ?job.kind, "running job");
        match job.kind {
            JobKind::Fetch => {
                job.state = JobState::Fetching;
                self.ensure_cached(&job.package).map(|_| ())
            }
            JobKind::Install => {
                job.state = JobState::Fetching;
                let archive = self.ensure_cached(&job.package)?;

                job.state = JobState::Installing;
                let id = job.identity();
                self.events.emit(Event::InstallBegin(id.clone()));
                self.archive.extract(&archive, &self.install_root)?;
                let mut record = job.package.clone();
                record.location = Location::Installed;
                self.registry.register(record)?;
                self.events.emit(Event::InstallFinished(id));
                Ok(())
            }
            JobKind::Deinstall => {
                let id = job.identity();
                self.events.emit(Event::DeinstallBegin(id.clone()));
                self.registry.unregister(&job.package.origin)?;
                self.events.emit(Event::DeinstallFinished(id));
                Ok(())
            }
        }
    }

    /// Make sure the package archive sits in the cache with a good
    /// checksum, fetching it if needed. Returns the cached path.
    fn ensure_cached(&self, package: &PackageRecord) -> Result<PathBuf> {
        let repo_path = package.repo_path.as_deref().ok_or_else(|| {
            Error::Fatal(format!("{} has no repository path", package.origin))
        })?;
        let checksum = package.archive_checksum.as_deref().ok_or_else(|| {
            Error::Fatal(format!("{} has no archive checksum", package.origin))
        })?;
        // Checksums come from the remote catalog and may be garbage.
        if !is_sha256_hex(checksum) {
            return Err(Error::Fatal(format!(
                "{} has a malformed archive checksum: {checksum:?}",
                package.origin
            )));
        }

        let repo_path = self.resolve_archive_path(repo_path)?;
        let repo_path = repo_path.as_str();

        let cached = self.cache_dir.join(cache_name(package, checksum, repo_path));
        if cached.exists() {
            let id = package.identity();
            self.events.emit(Event::IntegrityCheckBegin(id.clone()));
            match verify_file_sha256(&cached, checksum) {
                Ok(()) => {
                    self.events.emit(Event::IntegrityCheckFinished(id));
                    return Ok(cached);
                }
                Err(e) => {
                    // Stale or corrupt cache entry; refetch.
                    debug!(path = %cached.display(), error = %e, "discarding cached archive");
                    std::fs::remove_file(&cached)
                        .map_err(|e| Error::io(format!("removing {}", cached.display()), e))?;
                }
            }
        }

        std::fs::create_dir_all(&self.cache_dir)
            .map_err(|e| Error::io(format!("creating {}", self.cache_dir.display()), e))?;

        let url = format!("{}/{}", self.repo_url.trim_end_matches('/'), repo_path);
        match self.fetch.fetch(&url, &cached, None, self.events)? {
            FetchOutcome::Fetched => {}
            // No cutoff was given, so this cannot happen.
            FetchOutcome::UpToDate => {
                return Err(Error::UpToDate(package.origin.clone()));
            }
        }

        let id = package.identity();
        self.events.emit(Event::IntegrityCheckBegin(id.clone()));
        if let Err(e) = verify_file_sha256(&cached, checksum) {
            let _ = std::fs::remove_file(&cached);
            return Err(e);
        }
        self.events.emit(Event::IntegrityCheckFinished(id));
        Ok(cached)
    }

    /// Some catalogs publish the archive path without an extension.
    /// Walk the compression preference order and take the first
    /// variant the repository serves.
    fn resolve_archive_path(&self, repo_path: &str) -> Result<String> {
        let known = Path::new(repo_path)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(CompressionFormat::from_extension)
            .is_some();
        if known {
            return Ok(repo_path.to_owned());
        }
        let base = self.repo_url.trim_end_matches('/');
        select_format(CompressionFormat::Txz, repo_path, |candidate| {
            self.fetch.probe(&format!("{base}/{candidate}"))
        })
        .map(|(_, name)| name)
        .ok_or_else(|| Error::Download {
            url: format!("{base}/{repo_path}"),
            reason: "no archive found under any supported compression".to_owned(),
        })
    }
}

/// Cache entries carry a checksum prefix so a repository republishing
/// the same version under new contents never collides with the old
/// archive.
fn cache_name(package: &PackageRecord, checksum: &str, repo_path: &str) -> String {
    let ext = Path::new(repo_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("pkg");
    // `get` tolerates a short or non-ASCII checksum without panicking.
    let tag = checksum.get(..8).unwrap_or(checksum);
    format!("{}-{}~{}.{}", package.name, package.version, tag, ext)
}
