// src/exec/pipeline.rs

//! Pipeline runner: executes one subsystem invocation.

use tracing::{debug, info, warn};

use crate::dag::SubsystemContext;
use crate::errors::Result;
use crate::exec::subsystem::{DependentsSink, DynSubsystem, StageContext};
use crate::view::ConfigView;

/// Run `get_config → verify → generate → apply` for the invocation described
/// by `ctx`.
///
/// A stage failure is reported as
/// [`ConfdepError::Config`](crate::errors::ConfdepError::Config) carrying the
/// invocation's display name, unless it is a handoff or session error
/// passed up from `set_dependents`. Effects of stages that already ran are
/// left in place.
pub fn run_pipeline(
    subsystem: &dyn DynSubsystem,
    view: &ConfigView,
    ctx: &SubsystemContext,
    sink: &mut dyn DependentsSink,
) -> Result<()> {
    let shown = ctx.display_name();
    info!(
        subsystem = %shown,
        owner = %ctx.owner,
        as_dependent = ctx.called_as_dependent,
        "running subsystem pipeline"
    );

    let mut stage = StageContext::new(ctx, sink);
    match subsystem.run_stages(view, &mut stage) {
        Ok(()) => {
            debug!(subsystem = %shown, "subsystem pipeline finished");
            Ok(())
        }
        Err(failure) => {
            let message = failure.message();
            warn!(
                subsystem = %shown,
                stage = %failure.stage,
                error = %message,
                "subsystem pipeline failed"
            );
            Err(failure.into_error(&shown))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{Binding, Owner};
    use crate::errors::ConfdepError;
    use crate::exec::subsystem::{ConfigError, Stage, Subsystem};
    use anyhow::bail;

    #[derive(Default)]
    struct Sink {
        calls: Vec<(String, String, Option<String>)>,
    }

    impl DependentsSink for Sink {
        fn set_dependents(
            &mut self,
            ctx: &SubsystemContext,
            case: &str,
            tag: Option<&str>,
        ) -> Result<()> {
            self.calls
                .push((ctx.name.clone(), case.to_string(), tag.map(str::to_string)));
            Ok(())
        }
    }

    /// Fails at `fail_at` (if any) and records the stages it saw.
    struct StageRecorder {
        fail_at: Option<Stage>,
        typed: bool,
        seen: std::sync::Mutex<Vec<(Stage, Option<String>)>>,
    }

    impl StageRecorder {
        fn new(fail_at: Option<Stage>, typed: bool) -> Self {
            Self {
                fail_at,
                typed,
                seen: Default::default(),
            }
        }

        fn step(&self, stage: &mut StageContext<'_>) -> anyhow::Result<()> {
            let tag = stage.env_var(crate::types::TAGNODE_ENV).map(str::to_string);
            self.seen.lock().unwrap().push((stage.stage(), tag));
            if self.fail_at == Some(stage.stage()) {
                if self.typed {
                    return Err(ConfigError::new("bad C").into());
                }
                bail!("disk full");
            }
            Ok(())
        }
    }

    impl Subsystem for StageRecorder {
        type Config = ();

        fn get_config(&self, _: &ConfigView, stage: &mut StageContext<'_>) -> anyhow::Result<()> {
            self.step(stage)
        }
        fn verify(&self, _: &(), stage: &mut StageContext<'_>) -> anyhow::Result<()> {
            self.step(stage)
        }
        fn generate(&self, _: &(), stage: &mut StageContext<'_>) -> anyhow::Result<()> {
            stage.set_dependents("changed", None)?;
            self.step(stage)
        }
        fn apply(&self, _: &(), stage: &mut StageContext<'_>) -> anyhow::Result<()> {
            self.step(stage)
        }
    }

    fn ctx(tag: Option<&str>) -> SubsystemContext {
        SubsystemContext::top_level(&Binding::new("c", tag), Owner::Local)
    }

    #[test]
    fn runs_all_stages_in_order_with_tag_visible() {
        let recorder = StageRecorder::new(None, false);
        let mut sink = Sink::default();
        run_pipeline(&recorder, &ConfigView::empty(), &ctx(Some("eth0")), &mut sink).unwrap();

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(
            seen.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
            Stage::ALL.to_vec()
        );
        assert!(seen.iter().all(|(_, tag)| tag.as_deref() == Some("eth0")));
        assert_eq!(sink.calls, vec![("c".into(), "changed".into(), None)]);
    }

    #[test]
    fn tagnode_is_unset_without_tag() {
        let recorder = StageRecorder::new(None, false);
        run_pipeline(&recorder, &ConfigView::empty(), &ctx(None), &mut Sink::default()).unwrap();
        assert!(recorder.seen.lock().unwrap().iter().all(|(_, tag)| tag.is_none()));
    }

    #[test]
    fn typed_config_error_keeps_message_and_stops_pipeline() {
        let recorder = StageRecorder::new(Some(Stage::Verify), true);
        let err = run_pipeline(&recorder, &ConfigView::empty(), &ctx(None), &mut Sink::default())
            .unwrap_err();
        match err {
            ConfdepError::Config { subsystem, message } => {
                assert_eq!(subsystem, "c");
                assert_eq!(message, "bad C");
            }
            other => panic!("expected Config error, got {other:?}"),
        }
        assert_eq!(recorder.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn other_errors_are_wrapped_as_config_errors() {
        let recorder = StageRecorder::new(Some(Stage::Apply), false);
        let err = run_pipeline(&recorder, &ConfigView::empty(), &ctx(Some("eth1")), &mut Sink::default())
            .unwrap_err();
        match err {
            ConfdepError::Config { subsystem, message } => {
                assert_eq!(subsystem, "c_eth1");
                assert_eq!(message, "disk full");
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    /// Sink whose `set_dependents` always fails with `error`.
    struct FailingSink(fn() -> ConfdepError);

    impl DependentsSink for FailingSink {
        fn set_dependents(&mut self, _: &SubsystemContext, _: &str, _: Option<&str>) -> Result<()> {
            Err((self.0)())
        }
    }

    #[test]
    fn handoff_errors_from_set_dependents_keep_their_kind() {
        let recorder = StageRecorder::new(None, false);
        let mut sink = FailingSink(|| ConfdepError::Daemon("daemon is not running".into()));
        let err = run_pipeline(&recorder, &ConfigView::empty(), &ctx(None), &mut sink).unwrap_err();
        assert!(
            matches!(err, ConfdepError::Daemon(ref m) if m == "daemon is not running"),
            "{err:?}"
        );
        // Generate registered first, so its own step never ran.
        assert_eq!(recorder.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn unknown_case_from_set_dependents_is_a_config_error() {
        let recorder = StageRecorder::new(None, false);
        let mut sink = FailingSink(|| ConfdepError::UnknownDependencyCase {
            caller: "c".into(),
            case: "changed".into(),
        });
        let err = run_pipeline(&recorder, &ConfigView::empty(), &ctx(None), &mut sink).unwrap_err();
        match err {
            ConfdepError::Config { subsystem, message } => {
                assert_eq!(subsystem, "c");
                assert!(message.contains("changed"), "{message}");
            }
            other => panic!("expected Config error, got {other:?}"),
        }
    }
}
