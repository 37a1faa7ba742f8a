// src/manifest/loader.rs

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info};

use crate::errors::{ConfdepError, Result};
use crate::fs::{file_name_str, files_with_extension, FileSystem};
use crate::manifest::model::{DependencyMap, RawDependencyMap};
use crate::manifest::validate::find_cycle;
use crate::types::is_valid_name;

/// Suffix of dependency manifest files.
pub const MANIFEST_EXTENSION: &str = "json";

/// Where to find manifests and which one is the base.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    pub dir: PathBuf,
    /// Base manifest stem; `<platform>.json` is merged first.
    pub platform: String,
}

impl ManifestSource {
    pub fn new(dir: impl Into<PathBuf>, platform: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            platform: platform.into(),
        }
    }

    pub fn base_file_name(&self) -> String {
        format!("{}.{}", self.platform, MANIFEST_EXTENSION)
    }
}

fn malformed(path: &Path, reason: impl Into<String>) -> ConfdepError {
    ConfdepError::ManifestMalformed {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Parse the contents of one manifest file.
///
/// Top-level keys whose value is not an object are ignored so that newer
/// manifests can carry metadata. Everything else must have the shape
/// `caller → case → [target, …]` with names matching `[a-z0-9_]+`.
pub fn parse_manifest(path: &Path, contents: &str) -> Result<RawDependencyMap> {
    let root: Value =
        serde_json::from_str(contents).map_err(|e| malformed(path, e.to_string()))?;
    let Value::Object(root) = root else {
        return Err(malformed(path, "top level must be a JSON object"));
    };

    let mut map = RawDependencyMap::new();

    for (caller, cases) in root {
        let Value::Object(cases) = cases else {
            debug!(?path, key = %caller, "ignoring non-object top-level manifest key");
            continue;
        };
        check_name(path, "caller", &caller)?;

        for (case, targets) in cases {
            check_name(path, "case", &case)?;
            let Value::Array(targets) = targets else {
                return Err(malformed(
                    path,
                    format!("'{caller}'.'{case}' must be a list of subsystem names"),
                ));
            };

            let mut names = Vec::with_capacity(targets.len());
            for target in targets {
                let Value::String(target) = target else {
                    return Err(malformed(
                        path,
                        format!("'{caller}'.'{case}' contains a non-string target"),
                    ));
                };
                check_name(path, "target", &target)?;
                names.push(target);
            }
            map.insert(&caller, &case, names);
        }
    }

    Ok(map)
}

fn check_name(path: &Path, what: &str, name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(malformed(
            path,
            format!("invalid {what} name '{name}' (expected [a-z0-9_]+)"),
        ))
    }
}

/// Read and parse a single manifest file.
pub fn load_from_path(fs: &dyn FileSystem, path: &Path) -> Result<RawDependencyMap> {
    let contents = fs
        .read_to_string(path)
        .map_err(|e| malformed(path, format!("{e:#}")))?;
    parse_manifest(path, &contents)
}

/// Read every manifest in `source.dir` and merge them.
///
/// The base manifest is merged first; the rest are overlaid in file-name
/// order. No semantic validation happens here.
pub fn read_dependency_dir(fs: &dyn FileSystem, source: &ManifestSource) -> Result<RawDependencyMap> {
    if !fs.is_dir(&source.dir) {
        return Err(malformed(&source.dir, "manifest directory not found"));
    }

    let base_name = source.base_file_name();
    let base_path = source.dir.join(&base_name);
    if !fs.is_file(&base_path) {
        return Err(malformed(&base_path, "base manifest not found"));
    }

    let mut merged = load_from_path(fs, &base_path)?;
    debug!(path = ?base_path, "loaded base dependency manifest");

    let overlays = files_with_extension(fs, &source.dir, MANIFEST_EXTENSION)
        .map_err(|e| malformed(&source.dir, format!("{e:#}")))?;

    for path in overlays {
        if file_name_str(&path) == Some(base_name.as_str()) {
            continue;
        }
        let overlay = load_from_path(fs, &path)?;
        debug!(?path, callers = overlay.entries.len(), "overlaying dependency manifest");
        merged.overlay(overlay);
    }

    Ok(merged)
}

/// Read, merge and validate the manifests, optionally overlaying one extra
/// `supplement` file last.
///
/// This is the entry point for the rest of the crate: the result is
/// guaranteed acyclic.
pub fn load_and_validate(
    fs: &dyn FileSystem,
    source: &ManifestSource,
    supplement: Option<&Path>,
) -> Result<DependencyMap> {
    let raw = read_with_supplement(fs, source, supplement)?;
    let map = DependencyMap::try_from(raw)?;
    info!(
        dir = ?source.dir,
        callers = map.entries().len(),
        "dependency manifests loaded"
    );
    Ok(map)
}

/// Outcome of [`check_dependency_graph`]: `None` when acyclic, otherwise a
/// cycle witness.
pub fn check_dependency_graph(
    fs: &dyn FileSystem,
    source: &ManifestSource,
    supplement: Option<&Path>,
) -> Result<Option<Vec<String>>> {
    let raw = read_with_supplement(fs, source, supplement)?;
    Ok(find_cycle(&raw))
}

fn read_with_supplement(
    fs: &dyn FileSystem,
    source: &ManifestSource,
    supplement: Option<&Path>,
) -> Result<RawDependencyMap> {
    let mut raw = read_dependency_dir(fs, source)?;
    if let Some(path) = supplement {
        raw.overlay(load_from_path(fs, path)?);
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn source() -> ManifestSource {
        ManifestSource::new("deps", "vyos-1x")
    }

    #[test]
    fn base_is_merged_first_and_overlays_win_per_case() {
        let fs = MockFileSystem::new();
        fs.add_file(
            "deps/vyos-1x.json",
            r#"{"system_ip": {"sysctl": ["system_sysctl"], "vrf": ["vrf"]}}"#,
        );
        // Sorts before the base name but must still be applied after it.
        fs.add_file(
            "deps/addon.json",
            r#"{"system_ip": {"vrf": ["vrf", "protocols_static"]}}"#,
        );

        let raw = read_dependency_dir(&fs, &source()).unwrap();
        let cases = &raw.entries["system_ip"];
        assert_eq!(cases["sysctl"], vec!["system_sysctl"]);
        assert_eq!(cases["vrf"], vec!["vrf", "protocols_static"]);
    }

    #[test]
    fn overlays_apply_in_file_name_order() {
        let fs = MockFileSystem::new();
        fs.add_file("deps/vyos-1x.json", r#"{}"#);
        fs.add_file("deps/b.json", r#"{"a": {"c": ["from_b"]}}"#);
        fs.add_file("deps/a.json", r#"{"a": {"c": ["from_a"]}}"#);

        let raw = read_dependency_dir(&fs, &source()).unwrap();
        assert_eq!(raw.entries["a"]["c"], vec!["from_b"]);
    }

    #[test]
    fn non_object_top_level_keys_are_ignored() {
        let raw = parse_manifest(
            Path::new("m.json"),
            r#"{"version": 3, "comment": "x", "a": {"c": ["b", "b", "d"]}}"#,
        )
        .unwrap();
        assert_eq!(raw.entries.len(), 1);
        assert_eq!(raw.entries["a"]["c"], vec!["b", "d"]);
    }

    #[test]
    fn bad_json_identifies_file() {
        let fs = MockFileSystem::new();
        fs.add_file("deps/vyos-1x.json", "{}");
        fs.add_file("deps/broken.json", "{ nope");

        match read_dependency_dir(&fs, &source()) {
            Err(ConfdepError::ManifestMalformed { path, .. }) => {
                assert_eq!(path, PathBuf::from("deps/broken.json"));
            }
            other => panic!("expected ManifestMalformed, got {other:?}"),
        }
    }

    #[test]
    fn schema_violations_are_malformed() {
        for body in [
            r#"["a"]"#,
            r#"{"a": {"c": "b"}}"#,
            r#"{"a": {"c": [1]}}"#,
            r#"{"Bad-Name": {"c": ["b"]}}"#,
            r#"{"a": {"c": ["has space"]}}"#,
        ] {
            let res = parse_manifest(Path::new("x.json"), body);
            assert!(
                matches!(res, Err(ConfdepError::ManifestMalformed { .. })),
                "{body} should be rejected, got {res:?}"
            );
        }
    }

    #[test]
    fn missing_base_manifest_is_fatal() {
        let fs = MockFileSystem::new();
        fs.add_file("deps/other.json", "{}");
        match read_dependency_dir(&fs, &source()) {
            Err(ConfdepError::ManifestMalformed { path, reason }) => {
                assert_eq!(path, PathBuf::from("deps/vyos-1x.json"));
                assert!(reason.contains("base manifest"));
            }
            other => panic!("expected ManifestMalformed, got {other:?}"),
        }
    }

    #[test]
    fn supplement_can_introduce_a_cycle() {
        let fs = MockFileSystem::new();
        fs.add_file("deps/vyos-1x.json", r#"{"a": {"c": ["b"]}}"#);
        fs.add_file("extra.json", r#"{"b": {"c": ["a"]}}"#);

        assert_eq!(check_dependency_graph(&fs, &source(), None).unwrap(), None);
        let witness = check_dependency_graph(&fs, &source(), Some(Path::new("extra.json")))
            .unwrap()
            .unwrap();
        assert_eq!(witness, vec!["a", "b", "a"]);
        assert!(matches!(
            load_and_validate(&fs, &source(), Some(Path::new("extra.json"))),
            Err(ConfdepError::ManifestCycle(_))
        ));
    }
}
