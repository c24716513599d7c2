// src/events.rs

//! Observable lifecycle events emitted during fetch, install, and removal.
//!
//! Long-running operations take an explicit `&dyn EventSink` rather than
//! consulting a process-global callback, so two concurrent engines can
//! report to different sinks. Sinks must not assume exclusive terminal
//! access.

use crate::package::PackageIdentity;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Something worth telling the caller about.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Download progress. Emitted at most once per second while a
    /// transfer runs, plus once for the final chunk.
    Fetching {
        url: String,
        total: u64,
        done: u64,
        elapsed_secs: u64,
    },
    InstallBegin(PackageIdentity),
    InstallFinished(PackageIdentity),
    DeinstallBegin(PackageIdentity),
    DeinstallFinished(PackageIdentity),
    IntegrityCheckBegin(PackageIdentity),
    IntegrityCheckFinished(PackageIdentity),
    AlreadyInstalled(PackageIdentity),
    /// `package` cannot be removed because `dependent` still needs it.
    RequiredBy {
        package: String,
        dependent: String,
    },
    MissingDependency {
        package: String,
        dependency: String,
    },
    NoLocalDatabase,
    /// A system call failed; `arg` is the path or name it was given.
    Errno { func: &'static str, arg: String },
    Error(String),
}

/// Receiver for [`Event`]s. Implementations decide presentation.
pub trait EventSink {
    fn emit(&self, event: Event);
}

/// Discards everything.
pub struct SilentSink;

impl EventSink for SilentSink {
    fn emit(&self, _event: Event) {}
}

/// Routes events into the tracing subscriber. Used by library consumers
/// that have no terminal.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        match &event {
            Event::Fetching {
                url, total, done, ..
            } => info!(url, done, total, "fetching"),
            Event::InstallBegin(id) => info!(package = %id, "installing"),
            Event::InstallFinished(id) => info!(package = %id, "installed"),
            Event::DeinstallBegin(id) => info!(package = %id, "removing"),
            Event::DeinstallFinished(id) => info!(package = %id, "removed"),
            Event::IntegrityCheckBegin(id) => info!(package = %id, "checking integrity"),
            Event::IntegrityCheckFinished(id) => info!(package = %id, "integrity ok"),
            Event::AlreadyInstalled(id) => warn!(package = %id, "already installed"),
            Event::RequiredBy { package, dependent } => {
                warn!(package = %package, dependent, "still required")
            }
            Event::MissingDependency {
                package,
                dependency,
            } => error!(package, dependency, "missing dependency"),
            Event::NoLocalDatabase => error!("no local package database"),
            Event::Errno { func, arg } => error!(func, arg, "system call failed"),
            Event::Error(msg) => error!("{msg}"),
        }
    }
}

/// Terminal presentation: progress bars for transfers, plain lines for
/// the rest.
pub struct ConsoleSink {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn progress(&self, url: &str, total: u64, done: u64) {
        let Ok(mut slot) = self.bar.lock() else {
            return;
        };
        let bar = slot.get_or_insert_with(|| {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{msg:.cyan} [{bar:30}] {bytes}/{total_bytes} ({bytes_per_sec})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
            bar.set_message(short_name(url).to_owned());
            bar
        });
        bar.set_position(done);
        if total > 0 && done >= total {
            bar.finish();
            *slot = None;
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for ConsoleSink {
    fn emit(&self, event: Event) {
        match event {
            Event::Fetching {
                url, total, done, ..
            } => self.progress(&url, total, done),
            Event::InstallBegin(id) => println!("Installing {id}..."),
            Event::InstallFinished(id) => println!("Installed {id}"),
            Event::DeinstallBegin(id) => println!("Removing {id}..."),
            Event::DeinstallFinished(id) => println!("Removed {id}"),
            Event::IntegrityCheckBegin(id) => println!("Checking integrity of {id}..."),
            Event::IntegrityCheckFinished(_) => {}
            Event::AlreadyInstalled(id) => println!("{id} is already installed"),
            Event::RequiredBy { package, dependent } => {
                eprintln!("{package} is required by {dependent}")
            }
            Event::MissingDependency {
                package,
                dependency,
            } => eprintln!("{package}: missing dependency {dependency}"),
            Event::NoLocalDatabase => eprintln!("no local package database"),
            Event::Errno { func, arg } => eprintln!("{func}({arg}) failed"),
            Event::Error(msg) => eprintln!("error: {msg}"),
        }
    }
}

fn short_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Records every event for later inspection. Test helper.
pub struct CollectingSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn take(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for CollectingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: Event) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}
