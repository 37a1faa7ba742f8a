// src/exec/registry.rs

//! Registry of subsystem implementations, indexed by canonical name.
//!
//! Populated once at startup, either in-process with [`SubsystemRegistry::register`]
//! or by scanning a descriptor directory with
//! [`SubsystemRegistry::load_script_dir`]. After that the scheduler only
//! performs lookups.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::{ConfdepError, Result};
use crate::exec::script::{ScriptDescriptor, ScriptSubsystem};
use crate::exec::subsystem::{DynSubsystem, Subsystem};
use crate::fs::{self, FileSystem};
use crate::types::{SubsystemName, canonical_name, is_valid_name};

/// Extension of subsystem descriptor files.
pub const DESCRIPTOR_EXTENSION: &str = "toml";

/// Origin recorded for subsystems registered in-process.
const BUILTIN_ORIGIN: &str = "<builtin>";

enum Entry {
    Loaded(Arc<dyn DynSubsystem>),
    /// Found on disk but unusable; the reason is reported on first use.
    Malformed(String),
}

struct Registered {
    entry: Entry,
    origin: PathBuf,
}

#[derive(Default)]
pub struct SubsystemRegistry {
    entries: BTreeMap<SubsystemName, Registered>,
}

impl SubsystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-process implementation under `name`.
    pub fn register<S: Subsystem + 'static>(&mut self, name: &str, subsystem: S) -> Result<()> {
        self.register_dyn(name, Arc::new(subsystem))
    }

    pub fn register_dyn(&mut self, name: &str, subsystem: Arc<dyn DynSubsystem>) -> Result<()> {
        if !is_valid_name(name) {
            return Err(ConfdepError::SubsystemMalformed {
                name: name.to_string(),
                reason: "name must match [a-z0-9_]+".to_string(),
            });
        }
        self.insert(name, Entry::Loaded(subsystem), PathBuf::from(BUILTIN_ORIGIN))
    }

    /// Scan `dir` for `<name>.toml` script descriptors and register each
    /// under its canonical name. Returns the number of descriptors seen.
    ///
    /// Descriptors that cannot be parsed or lack an entry point are kept as
    /// malformed entries so the failure surfaces when the subsystem is run.
    pub fn load_script_dir(&mut self, fs: &dyn FileSystem, dir: &Path) -> Result<usize> {
        if !fs.is_dir(dir) {
            return Err(ConfdepError::ConfigError(format!(
                "subsystem directory {:?} does not exist",
                dir
            )));
        }

        let files = fs::files_with_extension(fs, dir, DESCRIPTOR_EXTENSION)?;
        let mut seen = 0;
        for path in files {
            let Some(file_name) = fs::file_name_str(&path) else {
                continue;
            };
            let name = canonical_name(file_name);
            if !is_valid_name(&name) {
                warn!(path = ?path, name = %name, "skipping descriptor with invalid canonical name");
                continue;
            }

            let entry = match read_descriptor(fs, &path) {
                Ok(subsystem) => Entry::Loaded(Arc::new(subsystem)),
                Err(reason) => {
                    warn!(subsystem = %name, path = ?path, reason = %reason, "malformed subsystem descriptor");
                    Entry::Malformed(reason)
                }
            };
            self.insert(&name, entry, path)?;
            seen += 1;
        }

        info!(dir = ?dir, count = seen, "loaded subsystem descriptors");
        Ok(seen)
    }

    fn insert(&mut self, name: &str, entry: Entry, origin: PathBuf) -> Result<()> {
        if let Some(existing) = self.entries.get(name) {
            return Err(ConfdepError::DuplicateSubsystem {
                name: name.to_string(),
                first: existing.origin.clone(),
                second: origin,
            });
        }
        debug!(subsystem = %name, origin = ?origin, "registered subsystem");
        self.entries
            .insert(name.to_string(), Registered { entry, origin });
        Ok(())
    }

    /// Implementation for `name`.
    pub fn load(&self, name: &str) -> Result<Arc<dyn DynSubsystem>> {
        match self.entries.get(name).map(|r| &r.entry) {
            Some(Entry::Loaded(subsystem)) => Ok(Arc::clone(subsystem)),
            Some(Entry::Malformed(reason)) => Err(ConfdepError::SubsystemMalformed {
                name: name.to_string(),
                reason: reason.clone(),
            }),
            None => Err(ConfdepError::SubsystemNotFound(name.to_string())),
        }
    }

    /// Whether a name is known at all, malformed or not.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Where `name` was registered from.
    pub fn origin(&self, name: &str) -> Option<&Path> {
        self.entries.get(name).map(|r| r.origin.as_path())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for SubsystemRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, r)| (name, &r.origin)))
            .finish()
    }
}

fn read_descriptor(fs: &dyn FileSystem, path: &Path) -> std::result::Result<ScriptSubsystem, String> {
    let contents = fs.read_to_string(path).map_err(|e| format!("{e:#}"))?;
    let descriptor: ScriptDescriptor =
        toml::from_str(&contents).map_err(|e| format!("invalid descriptor: {e}"))?;
    ScriptSubsystem::from_descriptor(&descriptor, path.parent())
}
