// src/fs/mod.rs

//! Filesystem access used when reading manifests and subsystem descriptors.
//!
//! Everything that touches disk at load time goes through [`FileSystem`], so
//! loaders can be exercised against [`mock::MockFileSystem`] in tests.

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod mock;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;

    /// Return a list of entries in a directory.
    /// Returns full paths.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry?;
            entries.push(entry.path());
        }
        Ok(entries)
    }
}

/// File name of `path` as UTF-8, if it has one.
pub fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Entries of `dir` that are files ending in `.{extension}`, sorted by file
/// name so that load order is deterministic regardless of directory order.
pub fn files_with_extension(
    fs: &dyn FileSystem,
    dir: &Path,
    extension: &str,
) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs
        .read_dir(dir)?
        .into_iter()
        .filter(|p| fs.is_file(p))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(extension))
        .collect();
    files.sort_by(|a, b| file_name_str(a).cmp(&file_name_str(b)));
    Ok(files)
}
