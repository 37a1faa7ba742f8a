// src/types.rs

use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

/// Name under which a subsystem is keyed in manifests and the registry.
pub type SubsystemName = String;

/// Environment variable through which a tag-node value is exposed to a
/// subsystem pipeline.
pub const TAGNODE_ENV: &str = "TAGNODE";

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_]+$").expect("static name pattern is valid"));

/// Derive the canonical subsystem name from a script or descriptor file name:
/// strip the suffix and replace `-` with `_`.
///
/// ```
/// assert_eq!(confdep::types::canonical_name("interfaces-ethernet.py"), "interfaces_ethernet");
/// assert_eq!(confdep::types::canonical_name("system_conntrack"), "system_conntrack");
/// ```
pub fn canonical_name(file_name: &str) -> SubsystemName {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    stem.replace('-', "_")
}

/// Whether `name` matches `[a-z0-9_]+`.
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// How a commit session hands dependents off.
///
/// - `Local`: the scheduler drives everything in-process (default).
/// - `Daemon`: `set_dependents` / `call_dependents` are forwarded to a
///   long-lived config daemon which owns the pending queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandoffMode {
    #[default]
    Local,
    Daemon,
}

impl FromStr for HandoffMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(HandoffMode::Local),
            "daemon" => Ok(HandoffMode::Daemon),
            other => Err(format!(
                "invalid handoff mode: {other} (expected \"local\" or \"daemon\")"
            )),
        }
    }
}
