// src/dag/mod.rs

//! Dependency graph and scheduling.
//!
//! - [`graph`] holds the flattened graph built from the dependency map.
//! - [`scheduler`] owns the pending dependents of a commit and decides which
//!   queue a registration lands in.
//! - [`binding`] provides bindings, owners and the per-invocation context.

pub mod binding;
pub mod graph;
pub mod scheduler;

pub use binding::{Binding, Owner, SubsystemContext};
pub use graph::DependencyGraph;
pub use scheduler::Scheduler;
