use std::sync::{Arc, Mutex};

use confdep::daemon::{DaemonLink, DaemonReply, DaemonRequest};
use confdep::dag::Owner;
use confdep::errors::Result;
use confdep::exec::{ConfigError, Stage, StageContext, Subsystem};
use confdep::types::TAGNODE_ENV;
use confdep::view::ConfigView;

/// One pipeline start as seen by a [`RecordingSubsystem`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// `name` or `name_tag`.
    pub display: String,
    /// `TAGNODE` as visible to the pipeline.
    pub tagnode: Option<String>,
    pub as_dependent: bool,
    pub owner: Owner,
}

/// Shared, ordered record of invocations across many subsystems.
#[derive(Debug, Clone, Default)]
pub struct InvocationLog {
    inner: Arc<Mutex<Vec<Invocation>>>,
}

impl InvocationLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, invocation: Invocation) {
        self.inner.lock().unwrap().push(invocation);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.inner.lock().unwrap().clone()
    }

    /// Display names in invocation order.
    pub fn displays(&self) -> Vec<String> {
        self.invocations().into_iter().map(|i| i.display).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }
}

/// A fake subsystem that:
/// - records every pipeline start into a shared [`InvocationLog`]
/// - optionally calls `set_dependents` from given stages
/// - optionally fails a stage with a [`ConfigError`].
#[derive(Debug, Clone)]
pub struct RecordingSubsystem {
    log: InvocationLog,
    registrations: Vec<(Stage, String, Option<String>)>,
    failure: Option<(Stage, String)>,
}

impl RecordingSubsystem {
    pub fn new(log: &InvocationLog) -> Self {
        Self {
            log: log.clone(),
            registrations: Vec::new(),
            failure: None,
        }
    }

    /// Call `set_dependents(case)` during `stage`.
    pub fn registers(self, stage: Stage, case: &str) -> Self {
        self.registers_tagged(stage, case, None)
    }

    /// Call `set_dependents(case, tag)` during `stage`.
    pub fn registers_tagged(mut self, stage: Stage, case: &str, tag: Option<&str>) -> Self {
        self.registrations
            .push((stage, case.to_string(), tag.map(str::to_string)));
        self
    }

    /// Raise `ConfigError(message)` from `stage`.
    pub fn fails_at(mut self, stage: Stage, message: &str) -> Self {
        self.failure = Some((stage, message.to_string()));
        self
    }

    fn step(&self, stage: &mut StageContext<'_>) -> anyhow::Result<()> {
        let current = stage.stage();
        for (at, case, tag) in &self.registrations {
            if *at == current {
                stage.set_dependents(case, tag.as_deref())?;
            }
        }
        if let Some((at, message)) = &self.failure
            && *at == current
        {
            return Err(ConfigError::new(message.clone()).into());
        }
        Ok(())
    }
}

impl Subsystem for RecordingSubsystem {
    type Config = ();

    fn get_config(&self, _view: &ConfigView, stage: &mut StageContext<'_>) -> anyhow::Result<()> {
        let ctx = stage.context();
        self.log.push(Invocation {
            display: ctx.display_name(),
            tagnode: stage.env_var(TAGNODE_ENV).map(str::to_string),
            as_dependent: stage.called_as_dependent(),
            owner: stage.owner(),
        });
        self.step(stage)
    }

    fn verify(&self, _config: &(), stage: &mut StageContext<'_>) -> anyhow::Result<()> {
        self.step(stage)
    }

    fn generate(&self, _config: &(), stage: &mut StageContext<'_>) -> anyhow::Result<()> {
        self.step(stage)
    }

    fn apply(&self, _config: &(), stage: &mut StageContext<'_>) -> anyhow::Result<()> {
        self.step(stage)
    }
}

/// A fake daemon link that records every forwarded request and answers
/// without doing anything.
#[derive(Debug, Clone, Default)]
pub struct RecordingLink {
    requests: Arc<Mutex<Vec<DaemonRequest>>>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<DaemonRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DaemonLink for RecordingLink {
    fn forward(&mut self, request: DaemonRequest) -> Result<DaemonReply> {
        let reply = match &request {
            DaemonRequest::CallDependents { .. } => DaemonReply::Applied(Vec::new()),
            DaemonRequest::SetDependents { .. }
            | DaemonRequest::Discard { .. }
            | DaemonRequest::Shutdown => DaemonReply::Ack,
        };
        self.requests.lock().unwrap().push(request);
        Ok(reply)
    }
}
