// src/config/mod.rs

//! Engine configuration.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate paths and the platform name (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{ConfigFile, ManifestSection, PathsSection, RawConfigFile, SessionSection};
pub use validate::validate_platform;
