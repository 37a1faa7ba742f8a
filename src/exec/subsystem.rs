// src/exec/subsystem.rs

//! The four-stage subsystem contract.
//!
//! A subsystem implements [`Subsystem`] with its own config type; the
//! registry stores it type-erased as [`DynSubsystem`]. Every stage receives a
//! [`StageContext`] through which it can inspect why it is running and
//! register dependents.

use std::fmt;

use thiserror::Error;

use crate::dag::{Owner, SubsystemContext};
use crate::errors::{ConfdepError, Result};
use crate::types::TAGNODE_ENV;
use crate::view::ConfigView;

/// User-facing failure raised by a subsystem stage.
///
/// Any other error returned from a stage is flattened into a message; this
/// type lets a subsystem choose the exact text the commit reports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    GetConfig,
    Verify,
    Generate,
    Apply,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::GetConfig, Stage::Verify, Stage::Generate, Stage::Apply];

    /// Entry-point name as used in subsystem descriptors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::GetConfig => "get_config",
            Stage::Verify => "verify",
            Stage::Generate => "generate",
            Stage::Apply => "apply",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where `set_dependents` calls made by a stage end up.
///
/// Implemented by the commit session; tests can provide their own.
pub trait DependentsSink {
    fn set_dependents(&mut self, ctx: &SubsystemContext, case: &str, tag: Option<&str>)
        -> Result<()>;
}

/// Handle passed to each stage of a running pipeline.
pub struct StageContext<'a> {
    ctx: &'a SubsystemContext,
    sink: &'a mut dyn DependentsSink,
    stage: Stage,
}

impl<'a> StageContext<'a> {
    pub fn new(ctx: &'a SubsystemContext, sink: &'a mut dyn DependentsSink) -> Self {
        Self {
            ctx,
            sink,
            stage: Stage::GetConfig,
        }
    }

    pub(crate) fn enter(&mut self, stage: Stage) {
        self.stage = stage;
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn context(&self) -> &SubsystemContext {
        self.ctx
    }

    pub fn name(&self) -> &str {
        &self.ctx.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.ctx.tag.as_deref()
    }

    pub fn owner(&self) -> Owner {
        self.ctx.owner
    }

    /// Whether this run was triggered by an upstream subsystem rather than
    /// by the user touching this one.
    pub fn called_as_dependent(&self) -> bool {
        self.ctx.called_as_dependent
    }

    /// Value of an environment variable as seen by this pipeline.
    ///
    /// Only [`TAGNODE_ENV`] is defined, and only when a tag is present.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        if name == TAGNODE_ENV {
            self.tag()
        } else {
            None
        }
    }

    /// Register the dependents listed for this subsystem under `case`.
    pub fn set_dependents(&mut self, case: &str, tag: Option<&str>) -> Result<()> {
        self.sink.set_dependents(self.ctx, case, tag)
    }
}

/// One configuration subsystem (interfaces, firewall, NAT, ...).
///
/// Stages run in order `get_config → verify → generate → apply`; the first
/// error aborts the pipeline. Stages may return any error; see
/// [`ConfigError`] for controlling the reported message.
pub trait Subsystem: Send + Sync {
    type Config;

    fn get_config(&self, view: &ConfigView, stage: &mut StageContext<'_>)
        -> anyhow::Result<Self::Config>;

    fn verify(&self, config: &Self::Config, stage: &mut StageContext<'_>) -> anyhow::Result<()>;

    fn generate(&self, config: &Self::Config, stage: &mut StageContext<'_>) -> anyhow::Result<()>;

    fn apply(&self, config: &Self::Config, stage: &mut StageContext<'_>) -> anyhow::Result<()>;
}

/// A stage failure before translation into a crate error.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: anyhow::Error,
}

impl StageFailure {
    fn at(stage: Stage) -> impl FnOnce(anyhow::Error) -> Self {
        move |error| Self { stage, error }
    }

    /// Message to report: the text of a [`ConfigError`] if one was raised,
    /// otherwise the full error chain.
    pub fn message(&self) -> String {
        match self.error.downcast_ref::<ConfigError>() {
            Some(e) => e.0.clone(),
            None => format!("{:#}", self.error),
        }
    }

    /// Crate error reported for `subsystem`.
    ///
    /// Handoff, state and cancel errors raised through the [`StageContext`]
    /// keep their kind; everything else becomes [`ConfdepError::Config`].
    pub fn into_error(self, subsystem: &str) -> ConfdepError {
        let message = self.message();
        match self.error.downcast::<ConfdepError>() {
            Ok(
                e @ (ConfdepError::Daemon(_)
                | ConfdepError::InvalidState(_)
                | ConfdepError::CommitCancelled),
            ) => e,
            _ => ConfdepError::Config {
                subsystem: subsystem.to_string(),
                message,
            },
        }
    }
}

/// Object-safe form of [`Subsystem`] stored in the registry.
pub trait DynSubsystem: Send + Sync {
    fn run_stages(
        &self,
        view: &ConfigView,
        stage: &mut StageContext<'_>,
    ) -> std::result::Result<(), StageFailure>;
}

impl<S: Subsystem> DynSubsystem for S {
    fn run_stages(
        &self,
        view: &ConfigView,
        stage: &mut StageContext<'_>,
    ) -> std::result::Result<(), StageFailure> {
        stage.enter(Stage::GetConfig);
        let config = self
            .get_config(view, stage)
            .map_err(StageFailure::at(Stage::GetConfig))?;

        stage.enter(Stage::Verify);
        self.verify(&config, stage)
            .map_err(StageFailure::at(Stage::Verify))?;

        stage.enter(Stage::Generate);
        self.generate(&config, stage)
            .map_err(StageFailure::at(Stage::Generate))?;

        stage.enter(Stage::Apply);
        self.apply(&config, stage)
            .map_err(StageFailure::at(Stage::Apply))?;

        Ok(())
    }
}
