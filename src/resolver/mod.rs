// src/resolver/mod.rs

//! Dependency resolution: turns requested package names into ordered
//! job plans against the registry.

pub mod graph;

pub use graph::DependencyGraph;

use crate::error::{Error, Result};
use crate::jobs::{Job, JobKind, JobState};
use crate::package::{LoadRequest, PackageRecord};
use crate::registry::{Catalog, MatchKind, Registry};
use std::collections::HashSet;
use tracing::debug;

/// Plans jobs by walking dependency edges in the registry. Planning is
/// all-or-nothing: a single unresolvable dependency fails the whole
/// request and no partial plan is returned.
pub struct Resolver<'a> {
    registry: &'a dyn Registry,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a dyn Registry) -> Self {
        Self { registry }
    }

    /// Plan installs for `requested` names or origins.
    ///
    /// Dependencies are pulled into the plan recursively. A package
    /// already installed at the same or a newer version yields a
    /// pre-skipped job unless `force` is set.
    pub fn resolve_install(&self, requested: &[String], force: bool) -> Result<Vec<Job>> {
        self.plan(requested, force, JobKind::Install)
    }

    /// Plan fetches: the same closure as an install plan, without
    /// touching the installed set.
    pub fn resolve_fetch(&self, requested: &[String]) -> Result<Vec<Job>> {
        self.plan(requested, true, JobKind::Fetch)
    }

    fn plan(&self, requested: &[String], force: bool, kind: JobKind) -> Result<Vec<Job>> {
        let load = LoadRequest::basic().with_deps();
        let mut graph = DependencyGraph::new();
        let mut skipped: HashSet<String> = HashSet::new();

        for name in requested {
            let candidate = self
                .find_remote(name, &load)?
                .ok_or_else(|| Error::UnknownItem(name.clone()))?;
            self.expand(candidate, force, &mut graph, &mut skipped)?;
        }

        let mut jobs = Vec::with_capacity(graph.len());
        for record in graph.install_order()? {
            let mut job = Job::new(kind, record.clone());
            if skipped.contains(&record.origin) {
                job.state = JobState::Skipped;
            }
            jobs.push(job);
        }
        debug!(requested = requested.len(), planned = jobs.len(), "install plan ready");
        Ok(jobs)
    }

    /// Add `record` and its dependency closure to the graph.
    fn expand(
        &self,
        record: PackageRecord,
        force: bool,
        graph: &mut DependencyGraph,
        skipped: &mut HashSet<String>,
    ) -> Result<()> {
        if graph.contains(&record.origin) {
            return Ok(());
        }

        if !force && self.installed_is_current(&record)? {
            skipped.insert(record.origin.clone());
        }

        let origin = record.origin.clone();
        let deps: Vec<_> = record.deps.as_slice().to_vec();
        graph.add_node(record);

        for dep in deps {
            // An installed dependency satisfies the edge without
            // joining the plan, unless something else pulls it in.
            if !graph.contains(&dep.origin) {
                if let Some(installed) = self.registry.lookup(
                    Catalog::Installed,
                    &dep.origin,
                    &LoadRequest::basic(),
                )? {
                    debug!(dependency = %installed.origin, "satisfied by installed package");
                    continue;
                }
            }

            let load = LoadRequest::basic().with_deps();
            let candidate = self.find_remote(&dep.origin, &load)?.ok_or_else(|| {
                Error::UnresolvedDependency {
                    package: origin.clone(),
                    dependency: dep.origin.clone(),
                }
            })?;
            self.expand(candidate, force, graph, skipped)?;
            graph.add_edge(&origin, &dep.origin)?;
        }
        Ok(())
    }

    fn installed_is_current(&self, candidate: &PackageRecord) -> Result<bool> {
        let installed =
            self.registry
                .lookup(Catalog::Installed, &candidate.origin, &LoadRequest::basic())?;
        Ok(installed.is_some_and(|r| r.version >= candidate.version))
    }

    /// Find a remote candidate by origin, falling back to an exact
    /// name match.
    fn find_remote(
        &self,
        name: &str,
        load: &LoadRequest,
    ) -> Result<Option<PackageRecord>> {
        if let Some(record) = self.registry.lookup(Catalog::Remote, name, load)? {
            return Ok(Some(record));
        }
        let mut rows = self
            .registry
            .query(Catalog::Remote, name, MatchKind::Exact, load)?;
        rows.next().transpose()
    }

    /// Plan removals for `requested` origins.
    ///
    /// A package still required by something outside the removal set is
    /// an error, unless `recursive` folds the dependents into the set.
    /// Jobs come back dependents-first.
    pub fn resolve_removal(&self, requested: &[String], recursive: bool) -> Result<Vec<Job>> {
        let load = LoadRequest::basic().with_deps();
        let world = self.installed_world(&load)?;

        let mut selected: HashSet<String> = HashSet::new();
        let mut worklist: Vec<String> = Vec::new();
        for name in requested {
            let record = self
                .find_installed(name, &load)?
                .ok_or_else(|| Error::UnknownItem(name.clone()))?;
            if selected.insert(record.origin.clone()) {
                worklist.push(record.origin);
            }
        }

        while let Some(origin) = worklist.pop() {
            for dependent in world.transitive_dependents(&origin) {
                if selected.contains(&dependent) {
                    continue;
                }
                if !recursive {
                    return Err(Error::RequiredBy {
                        package: origin,
                        required_by: dependent,
                    });
                }
                if selected.insert(dependent.clone()) {
                    worklist.push(dependent);
                }
            }
        }

        let subgraph = world.restricted(&selected)?;
        let jobs = subgraph
            .removal_order()?
            .into_iter()
            .map(|record| Job::new(JobKind::Deinstall, record.clone()))
            .collect();
        Ok(jobs)
    }

    /// Graph of every installed package with its dependency edges.
    fn installed_world(&self, load: &LoadRequest) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::new();
        let records: Vec<PackageRecord> = self
            .registry
            .query(Catalog::Installed, "", MatchKind::All, load)?
            .collect::<Result<_>>()?;
        for record in &records {
            graph.add_node(record.clone());
        }
        for record in &records {
            for dep in record.deps.as_slice() {
                if graph.contains(&dep.origin) {
                    graph.add_edge(&record.origin, &dep.origin)?;
                }
            }
        }
        Ok(graph)
    }

    fn find_installed(
        &self,
        name: &str,
        load: &LoadRequest,
    ) -> Result<Option<PackageRecord>> {
        if let Some(record) = self.registry.lookup(Catalog::Installed, name, load)? {
            return Ok(Some(record));
        }
        let mut rows = self
            .registry
            .query(Catalog::Installed, name, MatchKind::Exact, load)?;
        rows.next().transpose()
    }
}
