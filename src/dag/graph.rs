// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{ConfdepError, Result};
use crate::manifest::DependencyMap;
use crate::types::SubsystemName;

/// Internal node structure: stores immediate upstream callers and targets.
#[derive(Debug, Clone, Default)]
struct GraphNode {
    /// Callers whose manifests list this node as a target.
    upstream: BTreeSet<SubsystemName>,
    /// Targets re-run when this node registers dependents (any case).
    dependents: BTreeSet<SubsystemName>,
}

/// Flattened view of a [`DependencyMap`]: cases are merged away and each
/// node keeps its immediate neighbours in both directions.
///
/// The map is already validated as acyclic, so this only keeps adjacency
/// for diagnostics, ordering and reachability queries.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: BTreeMap<SubsystemName, GraphNode>,
}

impl DependencyGraph {
    pub fn from_map(map: &DependencyMap) -> Self {
        let flat = map.to_raw().flattened();
        let mut nodes: BTreeMap<SubsystemName, GraphNode> = flat
            .keys()
            .map(|name| (name.clone(), GraphNode::default()))
            .collect();

        for (caller, targets) in flat {
            for target in &targets {
                if let Some(node) = nodes.get_mut(target) {
                    node.upstream.insert(caller.clone());
                }
            }
            if let Some(node) = nodes.get_mut(&caller) {
                node.dependents = targets;
            }
        }

        Self { nodes }
    }

    /// All node names, sorted.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Immediate targets of `name` across all of its cases.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.nodes
            .get(name)
            .map(|n| n.dependents.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Immediate callers that list `name` as a target.
    pub fn upstream_of(&self, name: &str) -> Vec<&str> {
        self.nodes
            .get(name)
            .map(|n| n.upstream.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    /// Nodes that explicitly list themselves as a target.
    pub fn self_edges(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(name, node)| node.dependents.contains(*name))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Every node reachable from `start` (excluding `start` itself unless it
    /// lists itself).
    pub fn reachable_from(&self, start: &str) -> BTreeSet<&str> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = self.dependents_of(start).into_iter().collect();

        while let Some(name) = queue.pop_front() {
            if seen.insert(name) {
                queue.extend(self.dependents_of(name));
            }
        }
        seen
    }

    /// A topological order of the graph (callers before their targets).
    ///
    /// Self-edges are ignored. Only fails if the graph was built from an
    /// unvalidated map.
    pub fn topological_order(&self) -> Result<Vec<&str>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes() {
            graph.add_node(name);
        }
        for (name, node) in &self.nodes {
            for target in node.dependents.iter().filter(|t| *t != name) {
                graph.add_edge(name.as_str(), target.as_str(), ());
            }
        }

        toposort(&graph, None).map_err(|cycle| {
            let node = cycle.node_id().to_string();
            ConfdepError::ManifestCycle(vec![node.clone(), node])
        })
    }
}
