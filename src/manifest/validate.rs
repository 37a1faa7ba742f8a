// src/manifest/validate.rs

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graphmap::DiGraphMap;

use crate::errors::{ConfdepError, Result};
use crate::manifest::model::{DependencyMap, RawDependencyMap};
use crate::types::SubsystemName;

type Flattened = BTreeMap<SubsystemName, BTreeSet<SubsystemName>>;

impl TryFrom<RawDependencyMap> for DependencyMap {
    type Error = ConfdepError;

    fn try_from(raw: RawDependencyMap) -> std::result::Result<Self, Self::Error> {
        if let Some(witness) = find_cycle(&raw) {
            return Err(ConfdepError::ManifestCycle(witness));
        }
        Ok(DependencyMap::new_unchecked(raw))
    }
}

/// Whether the flattened graph of `map` has a topological order.
///
/// Used by administrative checks that only want a yes/no answer.
pub fn is_acyclic(map: &RawDependencyMap) -> bool {
    find_cycle(map).is_none()
}

/// Find a cycle in the flattened graph of `map`.
///
/// Returns a closed path (`[a, b, a]`). For identical input the same witness
/// is returned on every call. Self-edges are permitted and never reported.
pub fn find_cycle(map: &RawDependencyMap) -> Option<Vec<SubsystemName>> {
    let flat = map.flattened();

    // Nodes and edges are added in sorted order so petgraph's traversal, and
    // with it the reported witness, is stable across loads.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in flat.keys() {
        graph.add_node(name.as_str());
    }
    for (caller, targets) in &flat {
        for target in targets {
            if target != caller {
                graph.add_edge(caller.as_str(), target.as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => None,
        Err(cycle) => Some(cycle_witness(&graph, &flat, cycle.node_id())),
    }
}

/// Shortest cycle through the smallest member of the strongly connected
/// component that contains `seed`.
fn cycle_witness(graph: &DiGraphMap<&str, ()>, flat: &Flattened, seed: &str) -> Vec<SubsystemName> {
    let components: Vec<BTreeSet<&str>> = tarjan_scc(graph)
        .into_iter()
        .filter(|c| c.len() > 1)
        .map(|c| c.into_iter().collect())
        .collect();

    let members = components
        .iter()
        .find(|c| c.contains(seed))
        .or_else(|| components.iter().min_by_key(|c| c.first().copied()));

    let Some(members) = members else {
        return vec![seed.to_string(), seed.to_string()];
    };
    let Some(&start) = members.first() else {
        return vec![seed.to_string(), seed.to_string()];
    };

    let mut parent: BTreeMap<&str, &str> = BTreeMap::new();
    let mut queue = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        let Some(targets) = flat.get(node) else {
            continue;
        };
        for next in targets.iter().map(|t| t.as_str()) {
            if next == node || !members.contains(next) {
                continue;
            }
            if next == start {
                let mut path = vec![node];
                let mut cur = node;
                while cur != start {
                    cur = parent[cur];
                    path.push(cur);
                }
                path.reverse();
                path.push(start);
                return path.into_iter().map(str::to_string).collect();
            }
            if !parent.contains_key(next) {
                parent.insert(next, node);
                queue.push_back(next);
            }
        }
    }

    members.iter().map(|s| s.to_string()).collect()
}

/// Check that every target referenced in `map` is a known subsystem.
///
/// Entries are checked in sorted caller / case order, targets in manifest
/// order, so the first unknown target reported is stable.
pub fn validate_closed(map: &DependencyMap, is_known: impl Fn(&str) -> bool) -> Result<()> {
    for (caller, cases) in map.entries() {
        for (case, targets) in cases {
            if let Some(target) = targets.iter().find(|t| !is_known(t)) {
                return Err(ConfdepError::ManifestUnknownTarget {
                    caller: caller.clone(),
                    case: case.clone(),
                    target: target.clone(),
                });
            }
        }
    }
    Ok(())
}
