// tests/on_disk.rs
//
// Manifests and script subsystems read from a real directory tree.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::{TestResult, init_tracing, strings};
use confdep::engine::{CommitSession, GraphSource};
use confdep::errors::ConfdepError;
use confdep::exec::SubsystemRegistry;
use confdep::fs::RealFileSystem;
use confdep::manifest::{self, ManifestSource};
use confdep::view::ConfigView;
use tempfile::{TempDir, tempdir};

struct Layout {
    _dir: TempDir,
    deps: PathBuf,
    subsystems: PathBuf,
    log: PathBuf,
}

impl Layout {
    fn new() -> std::io::Result<Self> {
        let dir = tempdir()?;
        let deps = dir.path().join("deps");
        let subsystems = dir.path().join("conf_mode");
        fs::create_dir(&deps)?;
        fs::create_dir(&subsystems)?;
        let log = dir.path().join("applied.log");
        Ok(Self {
            _dir: dir,
            deps,
            subsystems,
            log,
        })
    }

    fn manifest(&self, file: &str, body: &str) -> std::io::Result<()> {
        fs::write(self.deps.join(file), body)
    }

    /// Descriptor whose `apply` appends `<name> <TAGNODE> <as-dependent>` to
    /// the shared log, followed by `extra` apply commands.
    fn script(&self, name: &str, verify: &str, extra_apply: &str) -> std::io::Result<()> {
        let apply = format!(
            "echo \"{name} ${{TAGNODE:-none}} ${{CONFDEP_AS_DEPENDENT:-0}}\" >> {log}{extra_apply}",
            log = self.log.display(),
        );
        let body = format!(
            "get_config = 'cat'\nverify = '{verify}'\ngenerate = 'true'\napply = '{apply}'\n"
        );
        fs::write(self.subsystems.join(format!("{name}.toml")), body)
    }

    fn applied(&self) -> std::io::Result<Vec<String>> {
        if !self.log.exists() {
            return Ok(Vec::new());
        }
        Ok(fs::read_to_string(&self.log)?
            .lines()
            .map(str::to_string)
            .collect())
    }

    fn session(&self, supplement: Option<&Path>) -> confdep::errors::Result<CommitSession> {
        let mut registry = SubsystemRegistry::new();
        registry.load_script_dir(&RealFileSystem, &self.subsystems)?;
        Ok(CommitSession::new(
            Arc::new(registry),
            GraphSource::Manifests {
                fs: Arc::new(RealFileSystem),
                source: ManifestSource::new(&self.deps, "vyos-1x"),
                supplement: supplement.map(Path::to_path_buf),
            },
        ))
    }
}

#[test]
fn scripts_see_tag_and_dependent_flag_and_register_through_stdout() -> TestResult {
    init_tracing();
    let layout = Layout::new()?;
    layout.manifest(
        "vyos-1x.json",
        r#"{"interfaces_ethernet": {"changed": ["firewall"]}}"#,
    )?;
    // The ethernet config must reach verify through get_config's stdout.
    layout.script(
        "interfaces-ethernet",
        "grep -q mtu",
        "; echo set-dependents changed $TAGNODE",
    )?;
    layout.script("firewall", "true", "")?;

    let view = ConfigView::from_json_str(r#"{"interfaces": {"ethernet": {"eth0": {"mtu": 1500}}}}"#)?;
    let mut session = layout.session(None)?.with_view(view);
    let report = session.commit(&[(
        "interfaces_ethernet".to_string(),
        Some("eth0".to_string()),
    )])?;

    assert_eq!(
        report.applied,
        strings(&["interfaces_ethernet_eth0", "firewall_eth0"])
    );
    assert_eq!(
        layout.applied()?,
        strings(&["interfaces-ethernet eth0 0", "firewall eth0 1"])
    );
    Ok(())
}

#[test]
fn stderr_of_a_failing_stage_becomes_the_error_message() -> TestResult {
    init_tracing();
    let layout = Layout::new()?;
    layout.manifest("vyos-1x.json", r#"{"a": {"changed": ["b"]}}"#)?;
    layout.script("a", "true", "; echo set-dependents changed")?;
    layout.script("b", "echo \"mtu below minimum\" >&2; exit 3", "")?;

    let mut session = layout.session(None)?;
    let err = session.commit(&[("a".to_string(), None)]).unwrap_err();
    match err {
        ConfdepError::Config { subsystem, message } => {
            assert_eq!(subsystem, "b");
            assert_eq!(message, "mtu below minimum");
        }
        other => panic!("expected Config error, got {other:?}"),
    }
    assert_eq!(layout.applied()?, strings(&["a none 0"]));
    Ok(())
}

#[test]
fn silent_failure_reports_the_exit_status() -> TestResult {
    init_tracing();
    let layout = Layout::new()?;
    layout.manifest("vyos-1x.json", "{}")?;
    layout.script("a", "exit 4", "")?;

    let mut session = layout.session(None)?;
    let err = session.commit(&[("a".to_string(), None)]).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("verify") && msg.contains('4'), "{msg}");
    Ok(())
}

#[test]
fn later_manifests_replace_whole_case_lists() -> TestResult {
    init_tracing();
    let layout = Layout::new()?;
    layout.manifest(
        "vyos-1x.json",
        r#"{"system_ip": {"sysctl": ["system_sysctl"], "vrf": ["vrf"]}}"#,
    )?;
    // Sorts before the base file but still lands on top of it.
    layout.manifest("00-addon.json", r#"{"system_ip": {"vrf": ["protocols_static"]}}"#)?;
    layout.manifest("zz-addon.json", r#"{"system_ip": {"vrf": ["vrf", "protocols_static"]}, "version": "2"}"#)?;
    let supplement = layout.deps.parent().map(|p| p.join("extra.json")).ok_or("no parent")?;
    fs::write(&supplement, r#"{"system_ip": {"sysctl": []}}"#)?;

    let source = ManifestSource::new(&layout.deps, "vyos-1x");
    let map = manifest::load_and_validate(&RealFileSystem, &source, None)?;
    assert_eq!(
        map.targets("system_ip", "vrf"),
        Some(&strings(&["vrf", "protocols_static"])[..])
    );
    assert_eq!(map.targets("system_ip", "sysctl"), Some(&strings(&["system_sysctl"])[..]));

    let map = manifest::load_and_validate(&RealFileSystem, &source, Some(&supplement))?;
    assert_eq!(map.targets("system_ip", "sysctl"), Some(&[][..]));
    assert_eq!(map.targets("system_ip", "vrf").map(<[String]>::len), Some(2));
    Ok(())
}

#[test]
fn malformed_manifest_and_descriptor_are_reported_with_their_paths() -> TestResult {
    init_tracing();
    let layout = Layout::new()?;
    layout.manifest("vyos-1x.json", r#"{"a": {"changed": ["b"]}}"#)?;
    layout.script("a", "true", "; echo set-dependents changed")?;
    fs::write(layout.subsystems.join("b.toml"), "get_config = 'cat'\n")?;

    // `b` is known but cannot run.
    let mut session = layout.session(None)?;
    let err = session.commit(&[("a".to_string(), None)]).unwrap_err();
    match err {
        ConfdepError::SubsystemMalformed { name, reason } => {
            assert_eq!(name, "b");
            assert!(reason.contains("verify"), "{reason}");
        }
        other => panic!("expected SubsystemMalformed, got {other:?}"),
    }

    layout.manifest("broken.json", "{ not json")?;
    let mut session = layout.session(None)?;
    match session.begin() {
        Err(ConfdepError::ManifestMalformed { path, .. }) => {
            assert_eq!(path, layout.deps.join("broken.json"));
        }
        other => panic!("expected ManifestMalformed, got {other:?}"),
    }
    Ok(())
}

#[test]
fn duplicate_canonical_names_are_rejected() -> TestResult {
    init_tracing();
    let layout = Layout::new()?;
    layout.script("system-ip", "true", "")?;
    layout.script("system_ip", "true", "")?;

    let mut registry = SubsystemRegistry::new();
    match registry.load_script_dir(&RealFileSystem, &layout.subsystems) {
        Err(ConfdepError::DuplicateSubsystem { name, .. }) => assert_eq!(name, "system_ip"),
        other => panic!("expected DuplicateSubsystem, got {other:?}"),
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn cli_commit_through_the_daemon_applies_tagged_dependents() -> TestResult {
    use clap::Parser;
    use confdep::cli::CliArgs;

    init_tracing();
    let layout = Layout::new()?;
    layout.manifest("vyos-1x.json", r#"{"a": {"changed": ["b", "c"]}, "b": {"changed": ["c"]}}"#)?;
    layout.script("a", "true", "; echo set-dependents changed $TAGNODE")?;
    layout.script("b", "true", "; echo set-dependents changed $TAGNODE")?;
    layout.script("c", "true", "")?;

    let root = layout.deps.parent().ok_or("no parent")?;
    let config = root.join("Confdep.toml");
    fs::write(
        &config,
        format!(
            "[paths]\nmanifest_dir = {:?}\nsubsystem_dir = {:?}\n\n[session]\nhandoff = \"daemon\"\n",
            layout.deps.display().to_string(),
            layout.subsystems.display().to_string(),
        ),
    )?;
    let view = root.join("view.json");
    fs::write(&view, r#"{"interfaces": {}}"#)?;

    let args = CliArgs::try_parse_from([
        "confdep",
        "--config",
        config.to_str().ok_or("non-utf8 path")?,
        "commit",
        "--view",
        view.to_str().ok_or("non-utf8 path")?,
        "a@eth0",
    ])?;
    confdep::run(args).await?;

    assert_eq!(
        layout.applied()?,
        strings(&["a eth0 0", "b eth0 1", "c eth0 1"])
    );
    Ok(())
}
