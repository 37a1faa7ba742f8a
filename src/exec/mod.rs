// src/exec/mod.rs

//! Subsystem execution layer.
//!
//! - [`subsystem`] defines the four-stage [`Subsystem`] contract and the
//!   type-erased [`DynSubsystem`] stored in the registry.
//! - [`pipeline`] runs one invocation and translates stage failures into
//!   [`crate::errors::ConfdepError::Config`].
//! - [`registry`] maps canonical names to implementations.
//! - [`script`] implements subsystems as shell commands described by TOML
//!   descriptors.

pub mod pipeline;
pub mod registry;
pub mod script;
pub mod subsystem;

pub use pipeline::run_pipeline;
pub use registry::SubsystemRegistry;
pub use script::{ScriptDescriptor, ScriptSubsystem};
pub use subsystem::{
    ConfigError, DependentsSink, DynSubsystem, Stage, StageContext, StageFailure, Subsystem,
};
