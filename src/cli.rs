// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand, ValueEnum};

use crate::types::is_valid_name;

/// Command-line arguments for `confdep`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "confdep",
    version,
    about = "Run configuration subsystems in dependency order.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the engine config file (TOML).
    ///
    /// Default: `Confdep.toml` in the current working directory, if present.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CONFDEP_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Override `[paths].manifest_dir`.
    #[arg(long, global = true, value_name = "DIR")]
    pub manifest_dir: Option<PathBuf>,

    /// Override `[paths].subsystem_dir`.
    #[arg(long, global = true, value_name = "DIR")]
    pub subsystem_dir: Option<PathBuf>,

    /// Override `[manifest].platform`.
    #[arg(long, global = true, value_name = "NAME")]
    pub platform: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Load the merged dependency map and fail if it has a cycle.
    CheckDependencyGraph {
        /// Extra manifest overlaid after all others.
        #[arg(long, value_name = "FILE")]
        supplement: Option<PathBuf>,
    },

    /// Print the merged map, flattened graph and a topological order without
    /// running anything.
    Show {
        #[arg(long, value_name = "FILE")]
        supplement: Option<PathBuf>,
    },

    /// Run subsystems and everything they trigger.
    Commit {
        /// JSON file with the proposed configuration.
        #[arg(long, value_name = "FILE")]
        view: Option<PathBuf>,

        /// Keep dependents in-process even if daemon handoff is configured.
        #[arg(long)]
        force_local: bool,

        /// Subsystems to run, in order.
        #[arg(required = true, value_name = "SUBSYSTEM[@TAG]")]
        targets: Vec<CommitTarget>,
    },
}

/// `name` or `name@tag` on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitTarget {
    pub name: String,
    pub tag: Option<String>,
}

impl FromStr for CommitTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, tag) = match s.split_once('@') {
            Some((_, "")) => return Err(format!("empty tag in '{s}'")),
            Some((name, tag)) => (name, Some(tag.to_string())),
            None => (s, None),
        };
        if !is_valid_name(name) {
            return Err(format!("'{name}' is not a valid subsystem name ([a-z0-9_]+)"));
        }
        Ok(Self {
            name: name.to_string(),
            tag,
        })
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
