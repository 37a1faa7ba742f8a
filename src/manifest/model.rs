// src/manifest/model.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::types::SubsystemName;

/// `case → ordered target list` for one caller.
pub type CaseMap = BTreeMap<String, Vec<SubsystemName>>;

/// Dependency map as read from one or more manifest files, before semantic
/// validation.
///
/// ```json
/// {
///   "system_conntrack": {
///     "conntrack_sync": ["service_conntrack_sync"],
///     "vrf": ["vrf"]
///   }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDependencyMap {
    pub entries: BTreeMap<SubsystemName, CaseMap>,
}

impl RawDependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target list for `(caller, case)`, replacing any existing list.
    ///
    /// Duplicate targets are dropped, keeping the first occurrence.
    pub fn insert(&mut self, caller: &str, case: &str, targets: Vec<SubsystemName>) {
        let mut seen = BTreeSet::new();
        let targets = targets
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();
        self.entries
            .entry(caller.to_string())
            .or_default()
            .insert(case.to_string(), targets);
    }

    /// Overlay `other` on top of `self`.
    ///
    /// For every `(caller, case)` present in `other` its list replaces ours
    /// wholesale; callers and cases only present on one side are kept.
    pub fn overlay(&mut self, other: RawDependencyMap) {
        for (caller, cases) in other.entries {
            let ours = self.entries.entry(caller).or_default();
            for (case, targets) in cases {
                ours.insert(case, targets);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flatten cases away: caller → union of all its target lists.
    ///
    /// Every target also appears as a key (possibly with no out-edges), so
    /// the key set is the full node set of the graph.
    pub fn flattened(&self) -> BTreeMap<SubsystemName, BTreeSet<SubsystemName>> {
        let mut graph: BTreeMap<SubsystemName, BTreeSet<SubsystemName>> = BTreeMap::new();
        for (caller, cases) in &self.entries {
            let out: BTreeSet<SubsystemName> = cases.values().flatten().cloned().collect();
            for target in &out {
                graph.entry(target.clone()).or_default();
            }
            graph.entry(caller.clone()).or_default().extend(out);
        }
        graph
    }
}

/// Validated dependency map: every name is well-formed and the flattened
/// graph is acyclic (self-edges aside).
///
/// Constructed through `TryFrom<RawDependencyMap>` (see `manifest::validate`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyMap {
    entries: BTreeMap<SubsystemName, CaseMap>,
}

impl DependencyMap {
    pub(crate) fn new_unchecked(raw: RawDependencyMap) -> Self {
        Self {
            entries: raw.entries,
        }
    }

    /// Target list registered for `(caller, case)`.
    pub fn targets(&self, caller: &str, case: &str) -> Option<&[SubsystemName]> {
        self.entries
            .get(caller)
            .and_then(|cases| cases.get(case))
            .map(|v| v.as_slice())
    }

    pub fn callers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    pub fn cases_of(&self, caller: &str) -> Option<&CaseMap> {
        self.entries.get(caller)
    }

    pub fn entries(&self) -> &BTreeMap<SubsystemName, CaseMap> {
        &self.entries
    }

    /// Copy back into raw form, e.g. to overlay a supplement and re-validate.
    pub fn to_raw(&self) -> RawDependencyMap {
        RawDependencyMap {
            entries: self.entries.clone(),
        }
    }
}
