// src/engine/session.rs

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::daemon::{DaemonLink, DaemonReply, DaemonRequest};
use crate::dag::{Binding, Owner, Scheduler, SubsystemContext};
use crate::engine::{CancelFlag, CommitReport, SessionRole, SessionState};
use crate::errors::{ConfdepError, Result};
use crate::exec::{DependentsSink, SubsystemRegistry, run_pipeline};
use crate::fs::FileSystem;
use crate::manifest::{self, DependencyMap, ManifestSource};
use crate::view::ConfigView;

/// Where the session gets its dependency map from.
pub enum GraphSource {
    /// An already validated map (tests, embedding).
    Fixed(Arc<DependencyMap>),
    /// Manifests on disk, loaded lazily on the first `begin`.
    Manifests {
        fs: Arc<dyn FileSystem>,
        source: ManifestSource,
        supplement: Option<PathBuf>,
    },
}

impl fmt::Debug for GraphSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphSource::Fixed(map) => f
                .debug_tuple("Fixed")
                .field(&map.entries().len())
                .finish(),
            GraphSource::Manifests {
                source, supplement, ..
            } => f
                .debug_struct("Manifests")
                .field("source", source)
                .field("supplement", supplement)
                .finish_non_exhaustive(),
        }
    }
}

/// Process-wide commit session.
///
/// Owns the cached dependency graph, the shared config view and the pending
/// dependents of the commit in progress.
///
/// ```text
///  idle ── begin ──▶ ready ── run ──▶ running ── ok ──▶ ready
///                                            └── err ──▶ idle
///  ready ── end ──▶ idle
/// ```
///
/// A session is driven by one thread at a time; `&mut self` on every
/// transition enforces that.
pub struct CommitSession {
    registry: Arc<SubsystemRegistry>,
    graph_source: GraphSource,
    cached_graph: Option<Arc<DependencyMap>>,
    view: ConfigView,
    scheduler: Option<Scheduler>,
    state: SessionState,
    role: SessionRole,
    force_local: bool,
    link: Option<Box<dyn DaemonLink>>,
    cancel: CancelFlag,
}

impl fmt::Debug for CommitSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommitSession")
            .field("state", &self.state)
            .field("role", &self.role)
            .field("force_local", &self.force_local)
            .field("linked", &self.link.is_some())
            .field("graph_source", &self.graph_source)
            .finish_non_exhaustive()
    }
}

impl CommitSession {
    pub fn new(registry: Arc<SubsystemRegistry>, graph_source: GraphSource) -> Self {
        Self {
            registry,
            graph_source,
            cached_graph: None,
            view: ConfigView::empty(),
            scheduler: None,
            state: SessionState::Idle,
            role: SessionRole::Standalone,
            force_local: false,
            link: None,
            cancel: CancelFlag::new(),
        }
    }

    /// Proposed configuration handed to every pipeline.
    pub fn with_view(mut self, view: ConfigView) -> Self {
        self.view = view;
        self
    }

    /// Hand dependents off to a config daemon reachable through `link`.
    pub fn with_daemon_link(mut self, link: Box<dyn DaemonLink>) -> Self {
        self.link = Some(link);
        self
    }

    /// Keep everything in-process even when a daemon link is configured.
    pub fn with_force_local(mut self, force_local: bool) -> Self {
        self.force_local = force_local;
        self
    }

    /// Share an externally owned cancel flag (e.g. one wired to a signal).
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_role(mut self, role: SessionRole) -> Self {
        self.role = role;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    pub fn view(&self) -> &ConfigView {
        &self.view
    }

    /// Handle to the cancel flag; cancelling it aborts the commit before the
    /// next pipeline starts.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Owner of the pending queue for pipelines started by this session.
    ///
    /// The daemon host always owns the daemon queue. A standalone session
    /// hands off only when it has a link and force-local is off.
    pub fn owner(&self) -> Owner {
        match self.role {
            SessionRole::DaemonHost => Owner::Daemon,
            SessionRole::Standalone if self.link.is_some() && !self.force_local => Owner::Daemon,
            SessionRole::Standalone => Owner::Local,
        }
    }

    /// Dependency map, loading and validating it on first use.
    pub fn graph(&mut self) -> Result<Arc<DependencyMap>> {
        if let Some(graph) = &self.cached_graph {
            return Ok(Arc::clone(graph));
        }

        let graph = match &self.graph_source {
            GraphSource::Fixed(map) => Arc::clone(map),
            GraphSource::Manifests {
                fs,
                source,
                supplement,
            } => Arc::new(manifest::load_and_validate(
                fs.as_ref(),
                source,
                supplement.as_deref(),
            )?),
        };
        let registry = &self.registry;
        manifest::validate_closed(&graph, |name| registry.contains(name))?;

        debug!(callers = graph.entries().len(), "dependency graph cached");
        self.cached_graph = Some(Arc::clone(&graph));
        Ok(graph)
    }

    /// Start a commit: fresh pending dependents, graph loaded.
    pub fn begin(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(self.invalid("begin"));
        }
        let graph = self.graph()?;
        self.scheduler = Some(Scheduler::new(graph));
        self.state = SessionState::Ready;
        info!(owner = %self.owner(), role = ?self.role, "commit session started");
        Ok(())
    }

    /// Run `name` (optionally for `tag`) and then everything it triggers.
    ///
    /// Returns the display names applied, top-level first. On error the
    /// session is aborted and back in `Idle`.
    pub fn run(&mut self, name: &str, tag: Option<&str>) -> Result<Vec<String>> {
        let binding = Binding::new(name, tag);
        let root = binding.display_name();
        self.guarded("run", &root, |session| session.run_top_level(&binding))
    }

    /// Drain the dependents registered on behalf of `root` (the display name
    /// of a top-level invocation).
    ///
    /// [`CommitSession::run`] calls this itself; it is public for the daemon
    /// host, where the top-level pipeline ran in another process.
    pub fn call_dependents(&mut self, root: &str) -> Result<Vec<String>> {
        self.guarded("call_dependents", root, |session| session.dispatch_drain(root))
    }

    /// Finish the commit, discarding anything still pending.
    pub fn end(&mut self) -> Result<()> {
        if self.state != SessionState::Ready {
            return Err(self.invalid("end"));
        }
        if let Some(scheduler) = self.scheduler.take()
            && !scheduler.is_empty()
        {
            debug!("discarding pending dependents at end of session");
        }
        self.state = SessionState::Idle;
        info!("commit session ended");
        Ok(())
    }

    /// `begin`, `run` every entry in order, `end`.
    pub fn commit(&mut self, targets: &[(String, Option<String>)]) -> Result<CommitReport> {
        self.begin()?;
        let mut report = CommitReport::default();
        for (name, tag) in targets {
            let applied = self.run(name, tag.as_deref())?;
            report.applied.extend(applied);
        }
        self.end()?;
        info!(applied = ?report.applied, "commit succeeded");
        Ok(report)
    }

    /// Pending display names for `root` in the queue this session would
    /// drain.
    pub fn pending_names(&self, root: &str) -> Vec<String> {
        self.scheduler
            .as_ref()
            .map(|s| s.pending_names(self.owner(), root))
            .unwrap_or_default()
    }

    /// Begin if idle; used by the daemon host, whose session spans many
    /// client commits.
    pub fn ensure_ready(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle => self.begin(),
            SessionState::Ready => Ok(()),
            SessionState::Running => Err(self.invalid("ensure_ready")),
        }
    }

    /// Serve one request forwarded by a client session.
    pub fn handle_request(&mut self, request: DaemonRequest) -> Result<DaemonReply> {
        match request {
            DaemonRequest::SetDependents { caller, case, tag } => {
                self.ensure_ready()?;
                let owner = self.owner();
                let scheduler = self
                    .scheduler
                    .as_mut()
                    .ok_or_else(|| ConfdepError::InvalidState("no pending dependents".into()))?;
                scheduler.register(owner, &caller, &caller, &case, tag.as_deref())?;
                Ok(DaemonReply::Ack)
            }
            DaemonRequest::CallDependents { caller } => {
                self.ensure_ready()?;
                Ok(DaemonReply::Applied(self.call_dependents(&caller)?))
            }
            DaemonRequest::Discard { caller } => {
                let owner = self.owner();
                if let Some(scheduler) = self.scheduler.as_mut() {
                    debug!(
                        caller = %caller,
                        pending = ?scheduler.pending_names(owner, &caller),
                        "client commit failed; discarding its dependents"
                    );
                    scheduler.discard(owner, &caller);
                }
                Ok(DaemonReply::Ack)
            }
            DaemonRequest::Shutdown => {
                if self.state == SessionState::Ready {
                    self.end()?;
                }
                Ok(DaemonReply::Ack)
            }
        }
    }

    /// Ready → Running → (Ready | aborted).
    fn guarded<T>(
        &mut self,
        op: &str,
        root: &str,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.state != SessionState::Ready {
            return Err(self.invalid(op));
        }
        self.state = SessionState::Running;
        match f(self) {
            Ok(value) => {
                self.state = SessionState::Ready;
                Ok(value)
            }
            Err(e) => {
                self.abort(root, &e);
                Err(e)
            }
        }
    }

    /// Drop everything pending for the failed commit, here and, for a
    /// handing-off client, on the daemon. An honoured cancel is consumed.
    fn abort(&mut self, root: &str, error: &ConfdepError) {
        warn!(error = %error, subsystem = ?error.subsystem(), root = %root, "commit aborted");
        self.scheduler = None;
        self.state = SessionState::Idle;
        if matches!(error, ConfdepError::CommitCancelled) {
            self.cancel.reset();
        }

        if self.role != SessionRole::Standalone || self.owner() != Owner::Daemon {
            return;
        }
        let Some(link) = self.link.as_mut() else {
            return;
        };
        if let Err(e) = link.forward(DaemonRequest::Discard {
            caller: root.to_string(),
        }) {
            warn!(error = %e, root = %root, "daemon did not discard pending dependents");
        }
    }

    fn invalid(&self, op: &str) -> ConfdepError {
        ConfdepError::InvalidState(format!("cannot {op} while {:?}", self.state))
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!("cancel requested; aborting commit");
            return Err(ConfdepError::CommitCancelled);
        }
        Ok(())
    }

    fn run_top_level(&mut self, binding: &Binding) -> Result<Vec<String>> {
        self.check_cancel()?;

        let owner = self.owner();
        let ctx = SubsystemContext::top_level(binding, owner);
        let subsystem = self.registry.load(&binding.target)?;
        {
            let mut sink = Dispatch::new(&mut self.scheduler, &mut self.link, self.role)?;
            run_pipeline(subsystem.as_ref(), &self.view, &ctx, &mut sink)?;
        }

        let mut applied = vec![ctx.root.clone()];
        applied.extend(self.dispatch_drain(&ctx.root)?);
        Ok(applied)
    }

    /// Drain locally, or ask the daemon to drain when this session hands off.
    fn dispatch_drain(&mut self, root: &str) -> Result<Vec<String>> {
        let owner = self.owner();
        if owner == Owner::Daemon && self.role == SessionRole::Standalone {
            let link = self
                .link
                .as_mut()
                .ok_or_else(|| ConfdepError::Daemon("no daemon link configured".into()))?;
            let reply = link.forward(DaemonRequest::CallDependents {
                caller: root.to_string(),
            })?;
            return match reply {
                DaemonReply::Applied(names) => Ok(names),
                other => Err(ConfdepError::Daemon(format!(
                    "unexpected reply to call_dependents: {other:?}"
                ))),
            };
        }
        self.drain(owner, root)
    }

    /// Pop and run dependents of `root` until its queue is empty.
    ///
    /// Bindings registered while draining join the same queue. Each display
    /// name runs at most once per drain, the root included.
    fn drain(&mut self, owner: Owner, root: &str) -> Result<Vec<String>> {
        let mut executed = BTreeSet::from([root.to_string()]);
        let mut applied = Vec::new();

        loop {
            let next = self
                .scheduler
                .as_mut()
                .and_then(|s| s.next_dependent(owner, root));
            let Some(binding) = next else {
                break;
            };
            self.check_cancel()?;

            let shown = binding.display_name();
            if !executed.insert(shown.clone()) {
                debug!(subsystem = %shown, root = %root, "already applied in this drain; skipping");
                continue;
            }

            let ctx = SubsystemContext::dependent(&binding, root, owner);
            let subsystem = self.registry.load(&binding.target)?;
            {
                let mut sink = Dispatch::new(&mut self.scheduler, &mut self.link, self.role)?;
                run_pipeline(subsystem.as_ref(), &self.view, &ctx, &mut sink)?;
            }
            applied.push(shown);
        }

        debug!(root = %root, %owner, applied = ?applied, "drain finished");
        Ok(applied)
    }
}

/// Routes `set_dependents` from a running pipeline to the local scheduler or
/// across the daemon link.
struct Dispatch<'a> {
    scheduler: &'a mut Scheduler,
    link: Option<&'a mut Box<dyn DaemonLink>>,
    role: SessionRole,
}

impl<'a> Dispatch<'a> {
    fn new(
        scheduler: &'a mut Option<Scheduler>,
        link: &'a mut Option<Box<dyn DaemonLink>>,
        role: SessionRole,
    ) -> Result<Self> {
        let scheduler = scheduler
            .as_mut()
            .ok_or_else(|| ConfdepError::InvalidState("no pending dependents".into()))?;
        Ok(Self {
            scheduler,
            link: link.as_mut(),
            role,
        })
    }
}

impl DependentsSink for Dispatch<'_> {
    fn set_dependents(
        &mut self,
        ctx: &SubsystemContext,
        case: &str,
        tag: Option<&str>,
    ) -> Result<()> {
        if ctx.owner == Owner::Local || self.role == SessionRole::DaemonHost {
            self.scheduler.set_dependents(ctx, case, tag)?;
            return Ok(());
        }

        let link = self
            .link
            .as_mut()
            .ok_or_else(|| ConfdepError::Daemon("no daemon link configured".into()))?;
        debug!(caller = %ctx.name, case = %case, "forwarding set_dependents to daemon");
        link.forward(DaemonRequest::SetDependents {
            caller: ctx.name.clone(),
            case: case.to_string(),
            tag: tag.map(str::to_string),
        })?;
        Ok(())
    }
}
