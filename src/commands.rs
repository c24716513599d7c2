// src/commands.rs

//! CLI command implementations.

use crate::archive::TarArchiveHandler;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{ConsoleSink, Event, EventSink};
use crate::fetch::{FetchEngine, FetchOutcome};
use crate::jobs::{ApplySummary, Job, JobKind, JobScheduler, JobState};
use crate::package::{LoadRequest, PackageRecord};
use crate::registry::{Catalog, MatchKind, MemoryRegistry, Registry};
use crate::resolver::Resolver;
use crate::version::version_cmp;
use std::cmp::Ordering;
use tracing::info;

pub fn install(
    config: &Config,
    packages: &[String],
    force: bool,
    dry_run: bool,
) -> Result<()> {
    let events = ConsoleSink::new();
    let mut registry = MemoryRegistry::load(&config.registry_path())
        .inspect_err(|e| report_plan_error(e, &events))?;
    let jobs = Resolver::new(&registry)
        .resolve_install(packages, force)
        .inspect_err(|e| report_plan_error(e, &events))?;
    print_plan(&jobs);
    if dry_run {
        return Ok(());
    }

    let summary = run_jobs(config, &mut registry, jobs, &events)?;
    registry.save(&config.registry_path())?;
    finish(summary)
}

pub fn delete(
    config: &Config,
    packages: &[String],
    recursive: bool,
    dry_run: bool,
) -> Result<()> {
    let events = ConsoleSink::new();
    let mut registry = MemoryRegistry::load(&config.registry_path())
        .inspect_err(|e| report_plan_error(e, &events))?;
    let jobs = Resolver::new(&registry)
        .resolve_removal(packages, recursive)
        .inspect_err(|e| report_plan_error(e, &events))?;
    print_plan(&jobs);
    if dry_run {
        return Ok(());
    }

    let summary = run_jobs(config, &mut registry, jobs, &events)?;
    registry.save(&config.registry_path())?;
    finish(summary)
}

pub fn fetch(config: &Config, packages: &[String]) -> Result<()> {
    let events = ConsoleSink::new();
    let mut registry = MemoryRegistry::load(&config.registry_path())
        .inspect_err(|e| report_plan_error(e, &events))?;
    let jobs = Resolver::new(&registry)
        .resolve_fetch(packages)
        .inspect_err(|e| report_plan_error(e, &events))?;
    let summary = run_jobs(config, &mut registry, jobs, &events)?;
    finish(summary)
}

/// Refresh the remote catalog. The previous catalog's timestamp is the
/// freshness cutoff, so an unchanged remote copy is not downloaded
/// again unless forced.
pub fn update(config: &Config, force: bool) -> Result<()> {
    let catalog_path = config.db_dir.join("catalog.json");
    let cutoff = if force {
        None
    } else {
        catalog_path
            .metadata()
            .and_then(|m| m.modified())
            .ok()
    };

    let staged = config.db_dir.join("catalog.json.new");
    if staged.exists() {
        std::fs::remove_file(&staged)
            .map_err(|e| Error::io(format!("removing {}", staged.display()), e))?;
    }
    std::fs::create_dir_all(&config.db_dir)
        .map_err(|e| Error::io(format!("creating {}", config.db_dir.display()), e))?;

    let engine = FetchEngine::new(config)?;
    let url = format!("{}/catalog.json", config.repo_url.trim_end_matches('/'));
    let events = ConsoleSink::new();
    match engine.fetch(&url, &staged, cutoff, &events)? {
        FetchOutcome::UpToDate => {
            println!("Catalog is up to date.");
            return Ok(());
        }
        FetchOutcome::Fetched => {}
    }

    let raw = std::fs::read_to_string(&staged)
        .map_err(|e| Error::io(format!("reading {}", staged.display()), e))?;
    let records: Vec<PackageRecord> = serde_json::from_str(&raw)
        .map_err(|e| Error::Fatal(format!("parsing catalog: {e}")))?;
    info!(packages = records.len(), "catalog updated");

    let mut registry = MemoryRegistry::load_or_init(&config.registry_path())?;
    registry.replace_remote(records);
    registry.save(&config.registry_path())?;
    std::fs::rename(&staged, &catalog_path)
        .map_err(|e| Error::io(format!("renaming {}", staged.display()), e))?;

    let stats = registry.stats()?;
    println!("Catalog updated: {} packages available.", stats.remote_packages);
    Ok(())
}

pub fn info(config: &Config, pattern: Option<&str>, glob: bool, regex: bool) -> Result<()> {
    let registry = MemoryRegistry::load(&config.registry_path())?;
    let (pattern, kind) = match pattern {
        None => ("", MatchKind::All),
        Some(p) if glob => (p, MatchKind::Glob),
        Some(p) if regex => (p, MatchKind::ERegex),
        Some(p) => (p, MatchKind::Exact),
    };

    let load = LoadRequest::basic();
    let mut found = false;
    for row in registry.query(Catalog::Installed, pattern, kind, &load)? {
        let record = row?;
        found = true;
        println!("{}-{}: {}", record.name, record.version, record.comment);
    }
    if !found && !pattern.is_empty() {
        return Err(Error::UnknownItem(pattern.to_owned()));
    }
    Ok(())
}

pub fn stats(config: &Config) -> Result<()> {
    let registry = MemoryRegistry::load(&config.registry_path())?;
    let stats = registry.stats()?;
    println!("Installed packages: {}", stats.installed_packages);
    println!("Disk space occupied: {} bytes", stats.installed_bytes);
    println!("Remote packages:    {}", stats.remote_packages);
    println!("Remote size:        {} bytes", stats.remote_bytes);
    Ok(())
}

pub fn version(v1: &str, v2: &str) -> Result<()> {
    let symbol = match version_cmp(v1, v2)? {
        Ordering::Less => "<",
        Ordering::Equal => "=",
        Ordering::Greater => ">",
    };
    println!("{symbol}");
    Ok(())
}

pub fn config_value(config: &Config, key: &str) -> Result<()> {
    if let Ok(v) = config.string(key) {
        println!("{v}");
    } else if let Ok(v) = config.bool(key) {
        println!("{v}");
    } else if let Ok(v) = config.int64(key) {
        println!("{v}");
    } else {
        let list = config.list(key)?;
        for item in list {
            println!("{item}");
        }
    }
    Ok(())
}

fn run_jobs(
    config: &Config,
    registry: &mut MemoryRegistry,
    jobs: Vec<Job>,
    events: &dyn EventSink,
) -> Result<ApplySummary> {
    let engine = FetchEngine::new(config)?;
    let archive = TarArchiveHandler;
    let mut scheduler = JobScheduler::new(
        registry,
        &archive,
        &engine,
        events,
        config.cache_dir.clone(),
        config.repo_url.clone(),
        config.install_root.clone(),
        config.fail_fast,
    );
    scheduler.enqueue(jobs)?;
    scheduler.apply(false)
}

/// Planning failures with event vocabulary are surfaced through the
/// sink before the error propagates to the exit code.
fn report_plan_error(e: &Error, events: &dyn EventSink) {
    match e {
        Error::RequiredBy {
            package,
            required_by,
        } => events.emit(Event::RequiredBy {
            package: package.clone(),
            dependent: required_by.clone(),
        }),
        Error::NoLocalDatabase => events.emit(Event::NoLocalDatabase),
        _ => {}
    }
}

fn print_plan(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("Nothing to do.");
        return;
    }
    println!("The following actions are planned:");
    for (i, job) in jobs.iter().enumerate() {
        let verb = match job.kind {
            JobKind::Install => "install",
            JobKind::Deinstall => "remove",
            JobKind::Fetch => "fetch",
        };
        let note = if job.state == JobState::Skipped {
            " (already installed)"
        } else {
            ""
        };
        println!("  [{}] {} {}{}", i + 1, verb, job.identity(), note);
    }
}

fn finish(summary: ApplySummary) -> Result<()> {
    for (identity, reason) in &summary.failed {
        eprintln!("{identity}: {reason}");
    }
    if summary.aborted > 0 {
        eprintln!("{} job(s) aborted", summary.aborted);
    }
    if summary.all_succeeded() {
        Ok(())
    } else {
        Err(Error::Fatal(format!(
            "{} job(s) failed",
            summary.failed.len()
        )))
    }
}
