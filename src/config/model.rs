// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::types::HandoffMode;

/// Engine configuration as read from a TOML file.
///
/// ```toml
/// [paths]
/// manifest_dir  = "/usr/share/confdep/config-mode-dependencies"
/// subsystem_dir = "/usr/libexec/confdep/conf_mode"
///
/// [manifest]
/// platform = "vyos-1x"
///
/// [session]
/// handoff = "local"
/// force_local = false
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub paths: PathsSection,

    #[serde(default)]
    pub manifest: ManifestSection,

    #[serde(default)]
    pub session: SessionSection,
}

/// `[paths]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsSection {
    /// Directory holding the JSON dependency manifests.
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: PathBuf,

    /// Directory holding `<name>.toml` subsystem descriptors.
    #[serde(default = "default_subsystem_dir")]
    pub subsystem_dir: PathBuf,
}

fn default_manifest_dir() -> PathBuf {
    PathBuf::from("/usr/share/confdep/config-mode-dependencies")
}

fn default_subsystem_dir() -> PathBuf {
    PathBuf::from("/usr/libexec/confdep/conf_mode")
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            manifest_dir: default_manifest_dir(),
            subsystem_dir: default_subsystem_dir(),
        }
    }
}

/// `[manifest]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestSection {
    /// Stem of the base manifest, merged before every other file.
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_platform() -> String {
    "vyos-1x".to_string()
}

impl Default for ManifestSection {
    fn default() -> Self {
        Self {
            platform: default_platform(),
        }
    }
}

/// `[session]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSection {
    #[serde(default)]
    pub handoff: HandoffMode,

    /// Keep dependents in-process even when `handoff = "daemon"`.
    #[serde(default)]
    pub force_local: bool,
}

/// Validated engine configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (or
/// [`ConfigFile::new_unchecked`] inside the crate), so holders can rely on
/// the checks in `validate.rs`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub paths: PathsSection,
    pub manifest: ManifestSection,
    pub session: SessionSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        paths: PathsSection,
        manifest: ManifestSection,
        session: SessionSection,
    ) -> Self {
        Self {
            paths,
            manifest,
            session,
        }
    }

    /// Whether dependents should be handed to a daemon.
    pub fn hands_off(&self) -> bool {
        self.session.handoff == HandoffMode::Daemon && !self.session.force_local
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        let raw = RawConfigFile::default();
        Self::new_unchecked(raw.paths, raw.manifest, raw.session)
    }
}
