// src/fetch/mirror.rs

//! Mirror discovery and rotation for repository downloads.
//!
//! Mirrors come from a DNS SRV lookup against the repository host's
//! service zone. The set rotates cyclically: each failed attempt moves
//! to the next host and wraps around, so a long retry budget revisits
//! mirrors instead of running out of them.

use crate::error::Result;
use hickory_resolver::Resolver;
use tracing::{debug, warn};

/// Builds the SRV zone name for a repository URL's scheme and host.
pub fn srv_zone(scheme: &str, host: &str) -> String {
    format!("_{scheme}._tcp.{host}")
}

/// Source of mirror hostnames for a service zone.
pub trait ServiceLocator {
    /// Hosts serving `zone`, best first. An empty list means no mirrors
    /// are published; lookup failures are treated the same way.
    fn srv_hosts(&self, zone: &str) -> Result<Vec<String>>;
}

/// SRV lookup through the system resolver configuration.
pub struct DnsServiceLocator;

impl ServiceLocator for DnsServiceLocator {
    fn srv_hosts(&self, zone: &str) -> Result<Vec<String>> {
        // A broken resolver configuration degrades to single-host
        // fetching, same as a zone with no SRV records.
        let resolver = match Resolver::from_system_conf() {
            Ok(resolver) => resolver,
            Err(e) => {
                warn!(zone, error = %e, "system resolver unavailable, skipping mirror discovery");
                return Ok(Vec::new());
            }
        };
        let response = match resolver.srv_lookup(zone) {
            Ok(response) => response,
            Err(e) => {
                // No SRV records is the common case, not an error.
                debug!(zone, error = %e, "srv lookup yielded no mirrors");
                return Ok(Vec::new());
            }
        };
        let mut records: Vec<_> = response.iter().collect();
        records.sort_by_key(|srv| (srv.priority(), std::cmp::Reverse(srv.weight())));
        Ok(records
            .into_iter()
            .map(|srv| srv.target().to_utf8().trim_end_matches('.').to_owned())
            .collect())
    }
}

/// A non-empty host list with a cyclic cursor.
#[derive(Debug, Clone)]
pub struct MirrorSet {
    hosts: Vec<String>,
    cursor: usize,
}

impl MirrorSet {
    /// None when no hosts were discovered.
    pub fn new(hosts: Vec<String>) -> Option<Self> {
        if hosts.is_empty() {
            None
        } else {
            Some(Self { hosts, cursor: 0 })
        }
    }

    pub fn current(&self) -> &str {
        &self.hosts[self.cursor]
    }

    /// Move to the next host, wrapping at the end.
    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.hosts.len();
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}
