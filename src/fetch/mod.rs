// src/fetch/mod.rs

//! Reliable file fetching over HTTP(S) and file:// with a bounded retry
//! budget, optional SRV mirror rotation, and freshness short-circuiting.
//!
//! The transfer itself goes through the `Transport` seam so tests can
//! script outcomes per host without a network.

mod mirror;

pub use mirror::{srv_zone, DnsServiceLocator, MirrorSet, ServiceLocator};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{Event, EventSink};
use chrono::DateTime;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, warn};
use url::Url;

const CHUNK_SIZE: usize = 8192;
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// How the destination file is opened before the transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Refuse an existing destination. Mode 0600.
    #[default]
    Exclusive,
    /// Truncate an existing destination in place.
    Truncate,
}

/// How a fetch concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The file was downloaded to the destination.
    Fetched,
    /// The remote copy is no newer than the caller's cutoff; nothing
    /// was kept on disk.
    UpToDate,
}

/// What a transport learned about the resource before streaming it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteMetadata {
    pub size: Option<u64>,
    pub mtime: Option<SystemTime>,
}

/// An open remote resource.
pub struct RemoteStream {
    pub metadata: RemoteMetadata,
    pub reader: Box<dyn Read + Send>,
}

/// Opens a URL for reading. One call per download attempt.
pub trait Transport {
    fn open(&self, url: &Url) -> Result<RemoteStream>;
}

/// HTTP(S) transport over a blocking reqwest client.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("quay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Fatal(format!("building http client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn open(&self, url: &Url) -> Result<RemoteStream> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .map_err(|e| Error::Download {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(Error::Download {
                url: url.to_string(),
                reason: format!("server returned {}", response.status()),
            });
        }

        let size = response.content_length();
        let mtime = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
            .map(SystemTime::from);

        Ok(RemoteStream {
            metadata: RemoteMetadata { size, mtime },
            reader: Box::new(response),
        })
    }
}

/// Local file transport for file:// repositories.
pub struct FileTransport;

impl Transport for FileTransport {
    fn open(&self, url: &Url) -> Result<RemoteStream> {
        let path = url.to_file_path().map_err(|()| Error::InvalidUrl {
            url: url.to_string(),
            reason: "not a local file path".to_owned(),
        })?;
        let file = std::fs::File::open(&path).map_err(|e| Error::Download {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let meta = file
            .metadata()
            .map_err(|e| Error::io(format!("stat {}", path.display()), e))?;
        Ok(RemoteStream {
            metadata: RemoteMetadata {
                size: Some(meta.len()),
                mtime: meta.modified().ok(),
            },
            reader: Box::new(file),
        })
    }
}

/// Dispatches on URL scheme.
pub struct DefaultTransport {
    http: HttpTransport,
    file: FileTransport,
}

impl DefaultTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpTransport::new(timeout)?,
            file: FileTransport,
        })
    }
}

impl Transport for DefaultTransport {
    fn open(&self, url: &Url) -> Result<RemoteStream> {
        match url.scheme() {
            "http" | "https" => self.http.open(url),
            "file" => self.file.open(url),
            other => Err(Error::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {other:?}"),
            }),
        }
    }
}

/// Downloads one file at a time with a fixed attempt budget.
pub struct FetchEngine {
    transport: Box<dyn Transport>,
    locator: Box<dyn ServiceLocator>,
    retry: u32,
    srv_mirrors: bool,
    backoff: Duration,
}

impl FetchEngine {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            transport: Box::new(DefaultTransport::new(Duration::from_secs(
                config.fetch_timeout_secs,
            ))?),
            locator: Box::new(DnsServiceLocator),
            retry: config.fetch_retry,
            srv_mirrors: config.srv_mirrors,
            backoff: Duration::from_secs(1),
        })
    }

    /// Assemble an engine from parts. Test seam.
    pub fn with_parts(
        transport: Box<dyn Transport>,
        locator: Box<dyn ServiceLocator>,
        retry: u32,
        srv_mirrors: bool,
    ) -> Self {
        Self {
            transport,
            locator,
            retry,
            srv_mirrors,
            backoff: Duration::from_secs(1),
        }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// True when the transport can open `url`. Used to probe which
    /// archive variants a repository serves; nothing is downloaded.
    pub fn probe(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(parsed) => self.transport.open(&parsed).is_ok(),
            Err(_) => false,
        }
    }

    /// Fetch `url` into `dest`.
    ///
    /// With a `cutoff`, a remote copy whose modification time is at or
    /// before it is reported `UpToDate` and not kept. Whatever the
    /// failure mode, no partial file survives at `dest`: the path holds
    /// the complete file on `Fetched` and nothing otherwise. `dest`
    /// must not already exist.
    pub fn fetch(
        &self,
        url: &str,
        dest: &Path,
        cutoff: Option<SystemTime>,
        events: &dyn EventSink,
    ) -> Result<FetchOutcome> {
        self.fetch_with_mode(url, dest, cutoff, OpenMode::Exclusive, events)
    }

    /// Like [`fetch`](Self::fetch) with an explicit destination open
    /// mode.
    pub fn fetch_with_mode(
        &self,
        url: &str,
        dest: &Path,
        cutoff: Option<SystemTime>,
        mode: OpenMode,
        events: &dyn EventSink,
    ) -> Result<FetchOutcome> {
        let base = Url::parse(url).map_err(|e| Error::InvalidUrl {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;

        let mut out = match open_dest(dest, mode) {
            Ok(file) => file,
            Err(e) => {
                events.emit(Event::Errno {
                    func: "open",
                    arg: dest.display().to_string(),
                });
                return Err(e);
            }
        };

        let result = self.run_attempts(&base, &mut out, cutoff, events);
        drop(out);
        if !matches!(result, Ok(FetchOutcome::Fetched)) {
            remove_dest(dest);
        }
        result
    }

    fn run_attempts(
        &self,
        base: &Url,
        out: &mut std::fs::File,
        cutoff: Option<SystemTime>,
        events: &dyn EventSink,
    ) -> Result<FetchOutcome> {
        let mut mirrors = self.discover_mirrors(base);

        let mut remaining = self.retry.max(1);
        let mut last_error = Error::Download {
            url: base.to_string(),
            reason: "no attempts made".to_owned(),
        };

        while remaining > 0 {
            remaining -= 1;
            let attempt_url = match &mirrors {
                Some(set) => with_host(base, set.current())?,
                None => base.clone(),
            };

            match self.attempt(&attempt_url, out, cutoff, events) {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    warn!(url = %attempt_url, error = %e, remaining, "fetch attempt failed");
                    last_error = e;
                    if remaining > 0 {
                        match mirrors.as_mut() {
                            // With mirrors we move on immediately.
                            Some(set) => set.advance(),
                            None => std::thread::sleep(self.backoff),
                        }
                    }
                }
            }
        }

        Err(last_error)
    }

    /// A failed lookup degrades to fetching from the origin host.
    fn discover_mirrors(&self, base: &Url) -> Option<MirrorSet> {
        // Local repositories have nothing to rotate through.
        if !self.srv_mirrors || base.scheme() == "file" {
            return None;
        }
        let host = base.host_str()?;
        let zone = srv_zone(base.scheme(), host);
        let hosts = match self.locator.srv_hosts(&zone) {
            Ok(hosts) => hosts,
            Err(e) => {
                warn!(zone, error = %e, "mirror discovery failed, using the origin host");
                return None;
            }
        };
        let set = MirrorSet::new(hosts)?;
        debug!(zone, mirrors = set.len(), "discovered mirrors");
        Some(set)
    }

    fn attempt(
        &self,
        url: &Url,
        out: &mut std::fs::File,
        cutoff: Option<SystemTime>,
        events: &dyn EventSink,
    ) -> Result<FetchOutcome> {
        let mut stream = self.transport.open(url)?;

        if let (Some(cutoff), Some(mtime)) = (cutoff, stream.metadata.mtime) {
            if mtime <= cutoff {
                return Ok(FetchOutcome::UpToDate);
            }
        }

        // A rerun after a failed attempt starts the file over.
        out.seek(SeekFrom::Start(0))
            .and_then(|_| out.set_len(0))
            .map_err(|e| Error::io(format!("truncating {}", url), e))?;

        let total = stream.metadata.size.unwrap_or(0);
        let started = Instant::now();
        let mut last_report = started;
        let mut done: u64 = 0;
        let mut buf = [0u8; CHUNK_SIZE];

        loop {
            let n = stream.reader.read(&mut buf).map_err(|e| Error::Download {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])
                .map_err(|e| Error::io("writing download".to_owned(), e))?;
            done += n as u64;

            if last_report.elapsed() >= PROGRESS_INTERVAL {
                last_report = Instant::now();
                events.emit(Event::Fetching {
                    url: url.to_string(),
                    total,
                    done,
                    elapsed_secs: started.elapsed().as_secs(),
                });
            }
        }

        if stream.metadata.size.is_some_and(|size| done != size) {
            return Err(Error::Download {
                url: url.to_string(),
                reason: format!("short transfer: {done} of {total} bytes"),
            });
        }

        out.flush()
            .map_err(|e| Error::io("flushing download".to_owned(), e))?;

        // Final report covers the last partial second.
        events.emit(Event::Fetching {
            url: url.to_string(),
            total: if total > 0 { total } else { done },
            done,
            elapsed_secs: started.elapsed().as_secs(),
        });

        Ok(FetchOutcome::Fetched)
    }
}

fn with_host(base: &Url, host: &str) -> Result<Url> {
    let mut url = base.clone();
    url.set_host(Some(host)).map_err(|e| Error::InvalidUrl {
        url: base.to_string(),
        reason: format!("mirror host {host:?}: {e}"),
    })?;
    Ok(url)
}

fn open_dest(dest: &Path, mode: OpenMode) -> Result<std::fs::File> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true);
    match mode {
        OpenMode::Exclusive => options.create_new(true),
        OpenMode::Truncate => options.create(true).truncate(true),
    };
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
        .open(dest)
        .map_err(|e| Error::io(format!("creating {}", dest.display()), e))
}

fn remove_dest(dest: &Path) {
    if let Err(e) = std::fs::remove_file(dest) {
        warn!(path = %dest.display(), error = %e, "could not remove partial download");
    }
}
