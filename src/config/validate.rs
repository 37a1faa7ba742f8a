// src/config/validate.rs

use std::path::Path;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{ConfdepError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ConfdepError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.paths, raw.manifest, raw.session))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_paths(cfg)?;
    validate_platform(&cfg.manifest.platform)?;
    Ok(())
}

fn validate_paths(cfg: &RawConfigFile) -> Result<()> {
    let non_empty = |key: &str, path: &Path| {
        if path.as_os_str().is_empty() {
            return Err(ConfdepError::ConfigError(format!(
                "[paths].{key} must not be empty"
            )));
        }
        Ok(())
    };
    non_empty("manifest_dir", &cfg.paths.manifest_dir)?;
    non_empty("subsystem_dir", &cfg.paths.subsystem_dir)?;
    Ok(())
}

/// The platform names a file stem inside `manifest_dir`, so it must be a
/// plain, non-empty file name.
pub fn validate_platform(platform: &str) -> Result<()> {
    if platform.trim().is_empty() {
        return Err(ConfdepError::ConfigError(
            "[manifest].platform must not be empty".to_string(),
        ));
    }
    if platform.contains(['/', '\\']) || platform == "." || platform == ".." {
        return Err(ConfdepError::ConfigError(format!(
            "[manifest].platform '{platform}' must be a file stem, not a path"
        )));
    }
    Ok(())
}
