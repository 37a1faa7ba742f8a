// src/lib.rs

pub mod cli;
pub mod config;
pub mod daemon;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod manifest;
pub mod types;
pub mod view;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{CliArgs, Command, CommitTarget};
use crate::config::{ConfigFile, default_config_path, load_and_validate, load_or_default};
use crate::daemon::ConfigDaemon;
use crate::dag::DependencyGraph;
use crate::engine::{CommitSession, GraphSource};
use crate::errors::ConfdepError;
use crate::exec::SubsystemRegistry;
use crate::fs::{FileSystem, RealFileSystem};
use crate::manifest::{DependencyMap, ManifestSource};
use crate::view::ConfigView;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - engine config loading (+ CLI overrides)
/// - manifest loading and validation
/// - subsystem registry, commit session and optional daemon
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = resolve_config(&args)?;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let source = ManifestSource::new(&cfg.paths.manifest_dir, &cfg.manifest.platform);

    match args.command {
        Command::CheckDependencyGraph { supplement } => {
            check_graph(fs.as_ref(), &source, supplement.as_deref())
        }
        Command::Show { supplement } => {
            let map = manifest::load_and_validate(fs.as_ref(), &source, supplement.as_deref())?;
            print_dry_run(&source, &map)
        }
        Command::Commit {
            view,
            force_local,
            targets,
        } => commit(&cfg, fs, source, view.as_deref(), force_local, targets).await,
    }
}

/// Engine config from `--config` (must exist) or the default path (optional),
/// with CLI overrides applied on top.
fn resolve_config(args: &CliArgs) -> Result<ConfigFile> {
    let mut cfg = match &args.config {
        Some(path) => load_and_validate(path)
            .with_context(|| format!("loading engine config {:?}", path))?,
        None => load_or_default(default_config_path())?,
    };

    if let Some(dir) = &args.manifest_dir {
        cfg.paths.manifest_dir = dir.clone();
    }
    if let Some(dir) = &args.subsystem_dir {
        cfg.paths.subsystem_dir = dir.clone();
    }
    if let Some(platform) = &args.platform {
        config::validate_platform(platform)?;
        cfg.manifest.platform = platform.clone();
    }
    Ok(cfg)
}

fn check_graph(fs: &dyn FileSystem, source: &ManifestSource, supplement: Option<&Path>) -> Result<()> {
    match manifest::check_dependency_graph(fs, source, supplement)? {
        None => {
            println!("dependency graph is acyclic");
            Ok(())
        }
        Some(witness) => Err(ConfdepError::ManifestCycle(witness).into()),
    }
}

async fn commit(
    cfg: &ConfigFile,
    fs: Arc<dyn FileSystem>,
    source: ManifestSource,
    view_path: Option<&Path>,
    force_local: bool,
    targets: Vec<CommitTarget>,
) -> Result<()> {
    let mut registry = SubsystemRegistry::new();
    registry.load_script_dir(fs.as_ref(), &cfg.paths.subsystem_dir)?;
    let registry = Arc::new(registry);

    let view = match view_path {
        Some(path) => ConfigView::from_json_str(&fs.read_to_string(path)?)
            .with_context(|| format!("parsing config view {:?}", path))?,
        None => ConfigView::empty(),
    };

    let graph_source = || GraphSource::Manifests {
        fs: Arc::clone(&fs),
        source: source.clone(),
        supplement: None,
    };

    let force_local = force_local || cfg.session.force_local;
    let mut session = CommitSession::new(Arc::clone(&registry), graph_source())
        .with_view(view.clone())
        .with_force_local(force_local);

    // Daemon handoff: host the daemon-owned queue in a task of this process.
    let daemon = if cfg.hands_off() && !force_local {
        // One flag for both sides, so Ctrl-C also stops a daemon-side drain.
        let host = CommitSession::new(registry, graph_source())
            .with_view(view)
            .with_cancel_flag(session.cancel_flag());
        let (handle, link) = ConfigDaemon::spawn(host);
        session = session.with_daemon_link(Box::new(link));
        Some(handle)
    } else {
        None
    };

    // Ctrl-C → cancel before the next pipeline.
    {
        let cancel = session.cancel_flag();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            warn!("Ctrl+C received; cancelling commit");
            cancel.cancel();
        });
    }

    let targets: Vec<(String, Option<String>)> =
        targets.into_iter().map(|t| (t.name, t.tag)).collect();
    info!(?targets, "starting commit");

    // Pipelines block; the session (and its daemon link) is dropped on the
    // worker, which also lets the daemon loop finish.
    let result = tokio::task::spawn_blocking(move || session.commit(&targets)).await?;

    if let Some(handle) = daemon {
        handle.await??;
    }

    let report = result?;
    for name in &report.applied {
        println!("applied {name}");
    }
    Ok(())
}

/// Dry-run output: merged map, flattened graph, an order, self-edges.
fn print_dry_run(source: &ManifestSource, map: &DependencyMap) -> Result<()> {
    let graph = DependencyGraph::from_map(map);

    println!("confdep dry-run");
    println!("  manifest_dir = {:?}", source.dir);
    println!("  base manifest = {}", source.base_file_name());
    println!();

    println!("dependency map ({} callers):", map.entries().len());
    for (caller, cases) in map.entries() {
        println!("  - {caller}");
        for (case, targets) in cases {
            println!("      {case}: {}", targets.join(", "));
        }
    }
    println!();

    println!("flattened graph ({} nodes):", graph.len());
    for node in graph.nodes() {
        let dependents = graph.dependents_of(node);
        if !dependents.is_empty() {
            println!("  {node} -> {}", dependents.join(", "));
        }
    }
    println!();

    println!("topological order: {}", graph.topological_order()?.join(", "));

    let self_edges = graph.self_edges();
    if !self_edges.is_empty() {
        println!("self-edges: {}", self_edges.join(", "));
    }
    Ok(())
}
