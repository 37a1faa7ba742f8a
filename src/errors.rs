// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfdepError {
    #[error("Malformed dependency manifest {path:?}: {reason}")]
    ManifestMalformed { path: PathBuf, reason: String },

    /// The witness is a closed path, first and last element equal.
    #[error("Cycle detected in dependency graph: {}", .0.join(" -> "))]
    ManifestCycle(Vec<String>),

    #[error("Dependency manifest entry '{caller}'.'{case}' references unknown subsystem '{target}'")]
    ManifestUnknownTarget {
        caller: String,
        case: String,
        target: String,
    },

    #[error("Subsystem not found: {0}")]
    SubsystemNotFound(String),

    #[error("Subsystem '{name}' is malformed: {reason}")]
    SubsystemMalformed { name: String, reason: String },

    #[error("Subsystems {first:?} and {second:?} share the canonical name '{name}'")]
    DuplicateSubsystem {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// A pipeline stage failed; `subsystem` is the display name of the
    /// binding that was running.
    #[error("{subsystem}: {message}")]
    Config { subsystem: String, message: String },

    #[error("No dependency case '{case}' registered for caller '{caller}'")]
    UnknownDependencyCase { caller: String, case: String },

    #[error("Commit cancelled")]
    CommitCancelled,

    #[error("Invalid commit session state: {0}")]
    InvalidState(String),

    #[error("Daemon handoff failed: {0}")]
    Daemon(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConfdepError {
    /// Canonical (or display) name of the subsystem this error is attributed
    /// to, if any.
    pub fn subsystem(&self) -> Option<&str> {
        match self {
            ConfdepError::Config { subsystem, .. } => Some(subsystem),
            ConfdepError::SubsystemNotFound(name) => Some(name),
            ConfdepError::SubsystemMalformed { name, .. } => Some(name),
            ConfdepError::UnknownDependencyCase { caller, .. } => Some(caller),
            _ => None,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ConfdepError>;
