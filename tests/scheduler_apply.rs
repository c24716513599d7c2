// tests/scheduler_apply.rs

//! End-to-end job execution against an on-disk file:// repository.

mod common;

use common::{registry_with, DiskRepo};
use quay::archive::TarArchiveHandler;
use quay::error::{Error, Result};
use quay::events::{CollectingSink, Event, SilentSink};
use quay::fetch::{FetchEngine, FileTransport, ServiceLocator};
use quay::jobs::{Job, JobKind, JobScheduler, JobState};
use quay::package::{LoadRequest, PackageRecord};
use quay::registry::{Catalog, MemoryRegistry, Registry, RegistryIter, RegistryStats};
use quay::resolver::Resolver;

struct NullLocator;

impl ServiceLocator for NullLocator {
    fn srv_hosts(&self, _zone: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

fn file_engine() -> FetchEngine {
    FetchEngine::with_parts(Box::new(FileTransport), Box::new(NullLocator), 1, false)
}

struct Harness {
    repo: DiskRepo,
    cache: std::path::PathBuf,
    root: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = DiskRepo::new(&dir.path().join("repo"));
        let cache = dir.path().join("cache");
        let root = dir.path().join("rootfs");
        Self {
            repo,
            cache,
            root,
            _dir: dir,
        }
    }

    fn apply(
        &self,
        registry: &mut MemoryRegistry,
        jobs: Vec<Job>,
        fail_fast: bool,
        events: &dyn quay::events::EventSink,
    ) -> quay::jobs::ApplySummary {
        let engine = file_engine();
        let archive = TarArchiveHandler;
        let mut scheduler = JobScheduler::new(
            registry,
            &archive,
            &engine,
            events,
            self.cache.clone(),
            self.repo.url(),
            self.root.clone(),
            fail_fast,
        );
        scheduler.enqueue(jobs).unwrap();
        scheduler.apply(false).unwrap()
    }

    fn installed_payload(&self, name: &str) -> std::path::PathBuf {
        self.root.join(format!("usr/local/share/{name}/payload"))
    }
}

#[test]
fn test_install_extracts_and_registers() {
    let h = Harness::new();
    let lib = h.repo.publish("lib", "devel/lib", &[]);
    let app = h.repo.publish("app", "misc/app", &[("lib", "devel/lib")]);

    let mut reg = registry_with(vec![lib, app], vec![]);
    let jobs = Resolver::new(&reg)
        .resolve_install(&["misc/app".into()], false)
        .unwrap();

    let sink = CollectingSink::new();
    let summary = h.apply(&mut reg, jobs, false, &sink);
    assert_eq!(summary.succeeded, 2);
    assert!(summary.all_succeeded());

    assert!(h.installed_payload("lib").exists());
    assert!(h.installed_payload("app").exists());
    for origin in ["devel/lib", "misc/app"] {
        let found = reg
            .lookup(Catalog::Installed, origin, &LoadRequest::basic())
            .unwrap();
        assert!(found.is_some(), "{origin} not registered");
    }

    // The dependency's install completes before the dependent's begins.
    let events = sink.take();
    let finished_lib = events
        .iter()
        .position(|e| matches!(e, Event::InstallFinished(id) if id.name == "lib"))
        .unwrap();
    let begin_app = events
        .iter()
        .position(|e| matches!(e, Event::InstallBegin(id) if id.name == "app"))
        .unwrap();
    assert!(finished_lib < begin_app);
}

#[test]
fn test_checksum_mismatch_fails_job_but_not_others() {
    let h = Harness::new();
    let mut bad = h.repo.publish("bad", "misc/bad", &[]);
    bad.archive_checksum = Some("0".repeat(64));
    let good = h.repo.publish("good", "misc/good", &[]);

    let mut reg = registry_with(vec![bad, good], vec![]);
    let jobs = Resolver::new(&reg)
        .resolve_install(&["misc/bad".into(), "misc/good".into()], false)
        .unwrap();

    let summary = h.apply(&mut reg, jobs, false, &SilentSink);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0.name, "bad");
    assert_eq!(summary.aborted, 0);

    assert!(h.installed_payload("good").exists());
    assert!(!h.installed_payload("bad").exists());
    assert!(reg
        .lookup(Catalog::Installed, "misc/bad", &LoadRequest::basic())
        .unwrap()
        .is_none());
}

#[test]
fn test_malformed_catalog_checksum_fails_job() {
    let h = Harness::new();
    // A catalog is untrusted input; a non-hex checksum must fail the
    // job, not take down the run.
    let mut bad = h.repo.publish("bad", "misc/bad", &[]);
    bad.archive_checksum = Some("日本語チ".to_owned());
    let good = h.repo.publish("good", "misc/good", &[]);

    let mut reg = registry_with(vec![bad, good], vec![]);
    let jobs = Resolver::new(&reg)
        .resolve_install(&["misc/bad".into(), "misc/good".into()], false)
        .unwrap();

    let summary = h.apply(&mut reg, jobs, false, &SilentSink);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0.name, "bad");
    assert!(summary.failed[0].1.contains("checksum"));
    assert!(!h.installed_payload("bad").exists());
}

#[test]
fn test_failure_poisons_dependents() {
    let h = Harness::new();
    let mut lib = h.repo.publish("lib", "devel/lib", &[]);
    lib.archive_checksum = Some("0".repeat(64));
    let app = h.repo.publish("app", "misc/app", &[("lib", "devel/lib")]);

    let mut reg = registry_with(vec![lib, app], vec![]);
    let jobs = Resolver::new(&reg)
        .resolve_install(&["misc/app".into()], false)
        .unwrap();

    let sink = CollectingSink::new();
    let summary = h.apply(&mut reg, jobs, false, &sink);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed.len(), 2);
    assert_eq!(summary.failed[1].0.name, "app");
    assert!(summary.failed[1].1.contains("devel/lib"));

    // The dependent was never attempted.
    assert!(!h.installed_payload("app").exists());
    assert!(sink.take().iter().any(|e| matches!(
        e,
        Event::MissingDependency { package, .. } if package == "app"
    )));
}

#[test]
fn test_fail_fast_aborts_remaining_jobs() {
    let h = Harness::new();
    let mut first = h.repo.publish("first", "misc/first", &[]);
    first.archive_checksum = Some("0".repeat(64));
    let second = h.repo.publish("second", "misc/second", &[]);
    let third = h.repo.publish("third", "misc/third", &[]);

    let mut reg = registry_with(vec![first, second, third], vec![]);
    let jobs = Resolver::new(&reg)
        .resolve_install(
            &["misc/first".into(), "misc/second".into(), "misc/third".into()],
            false,
        )
        .unwrap();

    let summary = h.apply(&mut reg, jobs, true, &SilentSink);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.aborted, 2);
    assert_eq!(summary.succeeded, 0);
    assert!(!h.installed_payload("second").exists());
}

#[test]
fn test_fetch_job_fills_cache_without_installing() {
    let h = Harness::new();
    let pkg = h.repo.publish("tool", "misc/tool", &[]);
    let mut reg = registry_with(vec![pkg], vec![]);

    let jobs = Resolver::new(&reg).resolve_fetch(&["misc/tool".into()]).unwrap();
    let summary = h.apply(&mut reg, jobs, false, &SilentSink);
    assert_eq!(summary.succeeded, 1);

    let cached: Vec<_> = std::fs::read_dir(&h.cache).unwrap().collect();
    assert_eq!(cached.len(), 1);
    assert!(!h.installed_payload("tool").exists());
    assert!(reg
        .lookup(Catalog::Installed, "misc/tool", &LoadRequest::basic())
        .unwrap()
        .is_none());
}

#[test]
fn test_extensionless_repo_path_probes_compression_variants() {
    let h = Harness::new();
    let mut pkg = h.repo.publish("tool", "misc/tool", &[]);
    // The published archive is a tgz; the catalog only names the base
    // path. The scheduler walks txz, tbz, tgz until one is served.
    pkg.repo_path = Some("All/tool-1.0".to_owned());
    let mut reg = registry_with(vec![pkg], vec![]);

    let jobs = Resolver::new(&reg)
        .resolve_install(&["misc/tool".into()], false)
        .unwrap();
    let summary = h.apply(&mut reg, jobs, false, &SilentSink);
    assert!(summary.all_succeeded());
    assert!(h.installed_payload("tool").exists());
}

#[test]
fn test_cached_archive_survives_repository_loss() {
    let h = Harness::new();
    let pkg = h.repo.publish("tool", "misc/tool", &[]);
    let repo_path = pkg.repo_path.clone().unwrap();
    let mut reg = registry_with(vec![pkg], vec![]);

    let fetch_jobs = Resolver::new(&reg).resolve_fetch(&["misc/tool".into()]).unwrap();
    assert!(h.apply(&mut reg, fetch_jobs, false, &SilentSink).all_succeeded());

    // Remove the published archive; the install must come from cache.
    std::fs::remove_file(h.repo.root.join(&repo_path)).unwrap();

    let sink = CollectingSink::new();
    let install_jobs = Resolver::new(&reg)
        .resolve_install(&["misc/tool".into()], false)
        .unwrap();
    let summary = h.apply(&mut reg, install_jobs, false, &sink);
    assert!(summary.all_succeeded());
    assert!(h.installed_payload("tool").exists());
    assert!(sink.take().iter().any(|e| matches!(
        e,
        Event::IntegrityCheckFinished(id) if id.name == "tool"
    )));
}

#[test]
fn test_skipped_jobs_emit_already_installed() {
    let h = Harness::new();
    let pkg = h.repo.publish("tool", "misc/tool", &[]);
    let installed = common::installed("tool", "misc/tool", "1.0", &[]);
    let mut reg = registry_with(vec![pkg], vec![installed]);

    let jobs = Resolver::new(&reg)
        .resolve_install(&["misc/tool".into()], false)
        .unwrap();
    assert_eq!(jobs[0].state, JobState::Skipped);

    let sink = CollectingSink::new();
    let summary = h.apply(&mut reg, jobs, false, &sink);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.succeeded, 0);
    assert!(sink
        .take()
        .iter()
        .any(|e| matches!(e, Event::AlreadyInstalled(_))));
}

#[test]
fn test_force_apply_reinstalls_skipped_jobs() {
    let h = Harness::new();
    let pkg = h.repo.publish("tool", "misc/tool", &[]);
    let mut reg = registry_with(vec![pkg], vec![common::installed("tool", "misc/tool", "1.0", &[])]);

    let jobs = Resolver::new(&reg)
        .resolve_install(&["misc/tool".into()], false)
        .unwrap();
    assert_eq!(jobs[0].state, JobState::Skipped);

    let engine = file_engine();
    let archive = TarArchiveHandler;
    let mut scheduler = JobScheduler::new(
        &mut reg,
        &archive,
        &engine,
        &SilentSink,
        h.cache.clone(),
        h.repo.url(),
        h.root.clone(),
        false,
    );
    scheduler.enqueue(jobs).unwrap();
    let summary = scheduler.apply(true).unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 0);
    assert!(h.installed_payload("tool").exists());
}

#[test]
fn test_deinstall_removes_registration() {
    let h = Harness::new();
    let mut reg = registry_with(vec![], vec![common::installed("tool", "misc/tool", "1.0", &[])]);

    let jobs = Resolver::new(&reg)
        .resolve_removal(&["misc/tool".into()], false)
        .unwrap();
    assert_eq!(jobs[0].kind, JobKind::Deinstall);

    let summary = h.apply(&mut reg, jobs, false, &SilentSink);
    assert!(summary.all_succeeded());
    assert!(reg
        .lookup(Catalog::Installed, "misc/tool", &LoadRequest::basic())
        .unwrap()
        .is_none());
}

#[test]
fn test_enqueue_renumbers_across_batches() {
    let h = Harness::new();
    let a = h.repo.publish("a", "x/a", &[]);
    let b = h.repo.publish("b", "x/b", &[]);
    let mut reg = registry_with(vec![a, b], vec![]);

    let engine = file_engine();
    let archive = TarArchiveHandler;
    let first = Resolver::new(&reg).resolve_fetch(&["x/a".into()]).unwrap();
    let second = Resolver::new(&reg).resolve_fetch(&["x/b".into()]).unwrap();

    let mut scheduler = JobScheduler::new(
        &mut reg,
        &archive,
        &engine,
        &SilentSink,
        h.cache.clone(),
        h.repo.url(),
        h.root.clone(),
        false,
    );
    scheduler.enqueue(first).unwrap();
    scheduler.enqueue(second).unwrap();

    let positions: Vec<usize> = scheduler.queue().iter().map(|j| j.position).collect();
    assert_eq!(positions, vec![1, 2]);

    // Apply consumes the queue.
    scheduler.apply(false).unwrap();
    assert!(scheduler.queue().is_empty());
}

/// Registry whose stats always fail, standing in for an uninitialized
/// database.
struct BrokenRegistry;

impl Registry for BrokenRegistry {
    fn lookup(
        &self,
        _catalog: Catalog,
        _origin: &str,
        _load: &LoadRequest,
    ) -> Result<Option<PackageRecord>> {
        Err(Error::NoLocalDatabase)
    }

    fn query<'a>(
        &'a self,
        _catalog: Catalog,
        _pattern: &str,
        _kind: quay::registry::MatchKind,
        _load: &'a LoadRequest,
    ) -> Result<RegistryIter<'a>> {
        Err(Error::NoLocalDatabase)
    }

    fn register(&mut self, _record: PackageRecord) -> Result<()> {
        Err(Error::NoLocalDatabase)
    }

    fn unregister(&mut self, _origin: &str) -> Result<()> {
        Err(Error::NoLocalDatabase)
    }

    fn stats(&self) -> Result<RegistryStats> {
        Err(Error::NoLocalDatabase)
    }
}

#[test]
fn test_apply_requires_local_database() {
    let h = Harness::new();
    let engine = file_engine();
    let archive = TarArchiveHandler;
    let mut broken = BrokenRegistry;
    let mut scheduler = JobScheduler::new(
        &mut broken,
        &archive,
        &engine,
        &SilentSink,
        h.cache.clone(),
        h.repo.url(),
        h.root.clone(),
        false,
    );
    let err = scheduler.apply(false).unwrap_err();
    assert!(matches!(err, Error::NoLocalDatabase));
}

#[test]
fn test_apply_with_unreachable_repository_leaves_clean_cache() {
    let h = Harness::new();
    let mut pkg = h.repo.publish("tool", "misc/tool", &[]);
    // Point at an archive that does not exist.
    pkg.repo_path = Some("All/missing-1.0.tgz".to_owned());
    let mut reg = registry_with(vec![pkg], vec![]);

    let jobs = Resolver::new(&reg)
        .resolve_install(&["misc/tool".into()], false)
        .unwrap();
    let summary = h.apply(&mut reg, jobs, false, &SilentSink);
    assert_eq!(summary.failed.len(), 1);

    // The failed download left nothing behind in the cache.
    let leftovers: Vec<_> = std::fs::read_dir(&h.cache)
        .map(|d| d.collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty());
}
