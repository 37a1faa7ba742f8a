// src/manifest/mod.rs

//! Dependency manifests.
//!
//! Responsibilities:
//! - Define the raw and validated dependency maps (`model.rs`).
//! - Read and merge the per-package JSON manifests (`loader.rs`).
//! - Validate acyclicity and closure of the merged map (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{
    check_dependency_graph, load_and_validate, load_from_path, parse_manifest,
    read_dependency_dir, ManifestSource,
};
pub use model::{CaseMap, DependencyMap, RawDependencyMap};
pub use validate::{find_cycle, is_acyclic, validate_closed};
