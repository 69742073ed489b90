//! Container dependency graph using `petgraph`.
//!
//! Rejects dependency cycles and yields a deterministic startup order in
//! which every container comes after the containers it depends on.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use unitsmith_common::error::{Result, UnitsmithError};

use crate::model::Container;

/// A dependency graph of containers.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    nodes: BTreeMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph from every dependency of `containers`.
    ///
    /// Edges to containers outside the slice are ignored.
    #[must_use]
    pub fn from_containers(containers: &[Container]) -> Self {
        let mut graph = Self::new();
        for c in containers {
            let _ = graph.add_container(&c.name);
        }
        for c in containers {
            let dependent = graph.add_container(&c.name);
            for peer in c.dependencies.keys() {
                if let Some(&dependency) = graph.nodes.get(peer) {
                    graph.add_dependency(dependent, dependency);
                }
            }
        }
        graph
    }

    /// Adds a container node, returning the existing one if present.
    pub fn add_container(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(name) {
            return idx;
        }
        let idx = self.graph.add_node(name.to_owned());
        let _ = self.nodes.insert(name.to_owned(), idx);
        idx
    }

    /// Adds a dependency edge: `dependent` depends on `dependency`.
    ///
    /// The graph edge points from `dependency` to `dependent` so that a
    /// topological walk yields dependencies first.
    pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        let _ = self.graph.update_edge(dependency, dependent, ());
    }

    /// Returns the startup order, dependencies first, ties broken by name.
    ///
    /// # Errors
    ///
    /// Returns [`UnitsmithError::CyclicDependency`] naming the containers in
    /// the first cycle found.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        self.check_cycles()?;

        let mut pending: BTreeMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                let incoming = self.graph.neighbors_directed(idx, Direction::Incoming).count();
                (idx, incoming)
            })
            .collect();
        let mut ready: BTreeSet<(&str, NodeIndex)> = pending
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(&idx, _)| (self.graph[idx].as_str(), idx))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some((name, idx)) = ready.pop_first() {
            order.push(name.to_owned());
            for next in self.graph.neighbors_directed(idx, Direction::Outgoing) {
                if let Some(n) = pending.get_mut(&next) {
                    *n -= 1;
                    if *n == 0 {
                        let _ = ready.insert((self.graph[next].as_str(), next));
                    }
                }
            }
        }
        Ok(order)
    }

    fn check_cycles(&self) -> Result<()> {
        for component in petgraph::algo::tarjan_scc(&self.graph) {
            let looped = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&idx| self.graph.contains_edge(idx, idx));
            if looped {
                let mut names: Vec<&str> = component.iter().map(|&i| self.graph[i].as_str()).collect();
                names.sort_unstable();
                return Err(UnitsmithError::CyclicDependency {
                    services: names.join(", "),
                });
            }
        }
        Ok(())
    }
}
