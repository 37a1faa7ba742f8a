#![allow(dead_code)]

use std::sync::Arc;

use confdep::errors::Result;
use confdep::manifest::{DependencyMap, RawDependencyMap};

/// Builder for dependency maps to simplify test setup.
///
/// ```ignore
/// let map = DependencyMapBuilder::new()
///     .edge("a", "changed", &["b", "c"])
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct DependencyMapBuilder {
    raw: RawDependencyMap,
}

impl DependencyMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `caller` registers `targets` (in order) under `case`.
    pub fn edge(mut self, caller: &str, case: &str, targets: &[&str]) -> Self {
        self.raw.insert(
            caller,
            case,
            targets.iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    /// Convenience for the common one-case-per-caller shape:
    /// `chain(&["a", "b", "c"], "changed")` is `a → b → c`.
    pub fn chain(mut self, names: &[&str], case: &str) -> Self {
        for pair in names.windows(2) {
            self = self.edge(pair[0], case, &[pair[1]]);
        }
        self
    }

    pub fn build_raw(self) -> RawDependencyMap {
        self.raw
    }

    pub fn try_build(self) -> Result<DependencyMap> {
        DependencyMap::try_from(self.raw)
    }

    pub fn build(self) -> DependencyMap {
        self.try_build()
            .expect("Failed to build valid dependency map from builder")
    }

    pub fn build_arc(self) -> Arc<DependencyMap> {
        Arc::new(self.build())
    }
}
