// src/resolver/graph.rs

//! Dependency graph over package origins.
//!
//! Nodes are inserted in discovery order and every traversal walks them
//! in that order, so the same inputs always produce the same plan.

use crate::error::{Error, Result};
use crate::package::PackageRecord;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Origins in insertion order.
    order: Vec<String>,
    nodes: HashMap<String, PackageRecord>,
    /// origin -> origins it depends on
    edges: HashMap<String, Vec<String>>,
    /// origin -> origins that depend on it
    reverse: HashMap<String, Vec<String>>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, origin: &str) -> bool {
        self.nodes.contains_key(origin)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn node(&self, origin: &str) -> Option<&PackageRecord> {
        self.nodes.get(origin)
    }

    pub fn add_node(&mut self, record: PackageRecord) {
        let origin = record.origin.clone();
        if self.nodes.insert(origin.clone(), record).is_none() {
            self.order.push(origin.clone());
            self.edges.entry(origin.clone()).or_default();
            self.reverse.entry(origin).or_default();
        }
    }

    /// Record that `from` depends on `to`. Both ends must be nodes.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            return Err(Error::Fatal(format!(
                "dependency edge {from} -> {to} references an unknown package"
            )));
        }
        let deps = self.edges.entry(from.to_owned()).or_default();
        if !deps.contains(&to.to_owned()) {
            deps.push(to.to_owned());
            self.reverse
                .entry(to.to_owned())
                .or_default()
                .push(from.to_owned());
        }
        Ok(())
    }

    /// Order in which packages can be installed: every package comes
    /// after all of its dependencies. Depth-first postorder, visiting
    /// roots and children in insertion order. Cycles are an error
    /// naming the packages on the cycle path.
    pub fn install_order(&self) -> Result<Vec<&PackageRecord>> {
        let mut marks: HashMap<&str, Mark> = self
            .order
            .iter()
            .map(|o| (o.as_str(), Mark::Unvisited))
            .collect();
        let mut out = Vec::with_capacity(self.order.len());
        let mut path = Vec::new();

        for origin in &self.order {
            self.visit(origin, &mut marks, &mut path, &mut out)?;
        }
        Ok(out
            .into_iter()
            .filter_map(|origin: &str| self.nodes.get(origin))
            .collect())
    }

    fn visit<'a>(
        &'a self,
        origin: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        out: &mut Vec<&'a str>,
    ) -> Result<()> {
        match marks.get(origin).copied().unwrap_or(Mark::Unvisited) {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let mut cycle: Vec<&str> = path
                    .iter()
                    .copied()
                    .skip_while(|p| *p != origin)
                    .collect();
                cycle.push(origin);
                return Err(Error::CircularDependency(cycle.join(" -> ")));
            }
            Mark::Unvisited => {}
        }

        marks.insert(origin, Mark::InProgress);
        path.push(origin);
        if let Some(deps) = self.edges.get(origin) {
            for dep in deps {
                self.visit(dep, marks, path, out)?;
            }
        }
        path.pop();
        marks.insert(origin, Mark::Done);
        out.push(origin);
        Ok(())
    }

    /// Order in which packages can be removed: the reverse of the
    /// install order, dependents before their dependencies.
    pub fn removal_order(&self) -> Result<Vec<&PackageRecord>> {
        let mut order = self.install_order()?;
        order.reverse();
        Ok(order)
    }

    /// Subgraph containing only the origins in `keep`, with the edges
    /// between them. Insertion order is preserved.
    pub fn restricted(&self, keep: &HashSet<String>) -> Result<DependencyGraph> {
        let mut sub = DependencyGraph::new();
        for origin in &self.order {
            if keep.contains(origin) {
                if let Some(record) = self.nodes.get(origin) {
                    sub.add_node(record.clone());
                }
            }
        }
        for origin in &self.order {
            if !keep.contains(origin) {
                continue;
            }
            if let Some(deps) = self.edges.get(origin) {
                for dep in deps {
                    if keep.contains(dep) {
                        sub.add_edge(origin, dep)?;
                    }
                }
            }
        }
        Ok(sub)
    }

    /// Origins that directly depend on `origin`.
    pub fn direct_dependents(&self, origin: &str) -> &[String] {
        self.reverse.get(origin).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every origin that depends on `origin`, directly or through
    /// other packages.
    pub fn transitive_dependents(&self, origin: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = self.direct_dependents(origin).iter().map(String::as_str).collect();
        let mut out = Vec::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current.to_owned()) {
                continue;
            }
            out.push(current.to_owned());
            stack.extend(self.direct_dependents(current).iter().map(String::as_str));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::PkgVersion;

    fn record(origin: &str) -> PackageRecord {
        let name = origin.rsplit('/').next().unwrap_or(origin);
        PackageRecord::new(name, origin, PkgVersion::parse("1.0").unwrap())
    }

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> DependencyGraph {
        let mut g = DependencyGraph::new();
        for n in nodes {
            g.add_node(record(n));
        }
        for (from, to) in edges {
            g.add_edge(from, to).unwrap();
        }
        g
    }

    fn origins(records: Vec<&PackageRecord>) -> Vec<&str> {
        records.into_iter().map(|r| r.origin.as_str()).collect()
    }

    #[test]
    fn test_install_order_deps_first() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        assert_eq!(origins(g.install_order().unwrap()), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_diamond_each_once() {
        let g = graph(
            &["top", "left", "right", "base"],
            &[
                ("top", "left"),
                ("top", "right"),
                ("left", "base"),
                ("right", "base"),
            ],
        );
        let order = origins(g.install_order().unwrap());
        assert_eq!(order, vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn test_order_is_deterministic() {
        let build = || {
            graph(
                &["x", "y", "z", "w"],
                &[("x", "y"), ("x", "z"), ("y", "w"), ("z", "w")],
            )
        };
        let first = origins(build().install_order().unwrap())
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        for _ in 0..10 {
            let g = build();
            assert_eq!(origins(g.install_order().unwrap()), first);
        }
    }

    #[test]
    fn test_removal_order_reverses_install() {
        let g = graph(&["a", "b"], &[("a", "b")]);
        assert_eq!(origins(g.removal_order().unwrap()), vec!["a", "b"]);
    }

    #[test]
    fn test_cycle_names_path() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
        let err = g.install_order().unwrap_err();
        match err {
            Error::CircularDependency(path) => {
                assert_eq!(path, "a -> b -> c -> a");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_restricted_subgraph() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let keep: HashSet<String> = ["a".to_owned(), "b".to_owned()].into();
        let sub = g.restricted(&keep).unwrap();
        assert_eq!(sub.len(), 2);
        assert!(!sub.contains("c"));
        assert_eq!(origins(sub.install_order().unwrap()), vec!["b", "a"]);
    }

    #[test]
    fn test_transitive_dependents() {
        let g = graph(&["app", "lib", "core"], &[("app", "lib"), ("lib", "core")]);
        let mut deps = g.transitive_dependents("core");
        deps.sort();
        assert_eq!(deps, vec!["app", "lib"]);
        assert!(g.transitive_dependents("app").is_empty());
    }
}
