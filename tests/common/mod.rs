#![allow(dead_code)]

use std::error::Error;
use std::sync::Arc;

use confdep::engine::{CancelFlag, CommitSession, GraphSource};
use confdep::exec::{StageContext, Subsystem, SubsystemRegistry};
use confdep::manifest::DependencyMap;
use confdep::view::ConfigView;
use confdep_test_utils::{InvocationLog, RecordingSubsystem};

pub type TestResult = Result<(), Box<dyn Error>>;

pub use confdep_test_utils::init_tracing;

/// Registry holding one `RecordingSubsystem` per name, all logging into
/// `log`. `custom` entries replace the plain recorder for their name.
pub fn registry(
    log: &InvocationLog,
    names: &[&str],
    custom: Vec<(&str, RecordingSubsystem)>,
) -> Arc<SubsystemRegistry> {
    let mut registry = SubsystemRegistry::new();
    for (name, subsystem) in custom.iter() {
        registry
            .register(name, subsystem.clone())
            .expect("register custom subsystem");
    }
    for name in names {
        if !registry.contains(name) {
            registry
                .register(name, RecordingSubsystem::new(log))
                .expect("register subsystem");
        }
    }
    Arc::new(registry)
}

/// Standalone session over a fixed, already validated map.
pub fn session(map: DependencyMap, registry: Arc<SubsystemRegistry>) -> CommitSession {
    CommitSession::new(registry, GraphSource::Fixed(Arc::new(map)))
}

pub fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

/// Cancels the session from inside its own pipeline.
pub struct Canceller {
    pub flag: CancelFlag,
}

impl Subsystem for Canceller {
    type Config = ();

    fn get_config(&self, _: &ConfigView, _: &mut StageContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
    fn verify(&self, _: &(), _: &mut StageContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
    fn generate(&self, _: &(), _: &mut StageContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
    fn apply(&self, _: &(), _: &mut StageContext<'_>) -> anyhow::Result<()> {
        self.flag.cancel();
        Ok(())
    }
}
