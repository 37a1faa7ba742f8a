// src/exec/script.rs

//! Subsystems implemented as shell commands.
//!
//! A descriptor file `<name>.toml` in the subsystem directory lists one
//! command per stage:
//!
//! ```toml
//! get_config = "/usr/libexec/confdep/firewall get-config"
//! verify     = "/usr/libexec/confdep/firewall verify"
//! generate   = "/usr/libexec/confdep/firewall generate"
//! apply      = "/usr/libexec/confdep/firewall apply"
//! ```
//!
//! Each command runs under `sh -c` with JSON on stdin: the whole config view
//! for `get_config`, and whatever `get_config` printed for the later stages.
//! A stdout line `set-dependents <case> [<tag>]` registers dependents.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::exec::subsystem::{ConfigError, Stage, StageContext, Subsystem};
use crate::types::TAGNODE_ENV;
use crate::view::ConfigView;

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^set-dependents\s+([a-z0-9_]+)(?:\s+(\S+))?\s*$")
        .expect("static directive pattern is valid")
});

/// Environment variable carrying the stage name to the command.
pub const STAGE_ENV: &str = "CONFDEP_STAGE";
/// Set to `1` when the subsystem runs because an upstream triggered it.
pub const AS_DEPENDENT_ENV: &str = "CONFDEP_AS_DEPENDENT";

/// On-disk form of a script subsystem.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptDescriptor {
    #[serde(default)]
    pub get_config: Option<String>,
    #[serde(default)]
    pub verify: Option<String>,
    #[serde(default)]
    pub generate: Option<String>,
    #[serde(default)]
    pub apply: Option<String>,
}

impl ScriptDescriptor {
    fn command(&self, stage: Stage) -> Option<&str> {
        let cmd = match stage {
            Stage::GetConfig => &self.get_config,
            Stage::Verify => &self.verify,
            Stage::Generate => &self.generate,
            Stage::Apply => &self.apply,
        };
        cmd.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Entry points with no (or an empty) command.
    pub fn missing_entry_points(&self) -> Vec<&'static str> {
        Stage::ALL
            .iter()
            .filter(|stage| self.command(**stage).is_none())
            .map(Stage::as_str)
            .collect()
    }
}

/// A subsystem whose four stages are shell commands.
#[derive(Debug, Clone)]
pub struct ScriptSubsystem {
    get_config: String,
    verify: String,
    generate: String,
    apply: String,
    /// Working directory for the commands (the descriptor's directory).
    workdir: Option<PathBuf>,
}

impl ScriptSubsystem {
    /// Build from a descriptor; fails with the list of missing entry points.
    pub fn from_descriptor(
        descriptor: &ScriptDescriptor,
        workdir: Option<&Path>,
    ) -> std::result::Result<Self, String> {
        let missing = descriptor.missing_entry_points();
        if !missing.is_empty() {
            return Err(format!("missing entry point(s): {}", missing.join(", ")));
        }
        let cmd = |stage| descriptor.command(stage).unwrap_or_default().to_string();
        Ok(Self {
            get_config: cmd(Stage::GetConfig),
            verify: cmd(Stage::Verify),
            generate: cmd(Stage::Generate),
            apply: cmd(Stage::Apply),
            workdir: workdir.map(Path::to_path_buf),
        })
    }

    fn command(&self, stage: Stage) -> &str {
        match stage {
            Stage::GetConfig => &self.get_config,
            Stage::Verify => &self.verify,
            Stage::Generate => &self.generate,
            Stage::Apply => &self.apply,
        }
    }

    /// Run the command for the current stage, honour any `set-dependents`
    /// directives, and return the remaining stdout.
    fn run_stage(&self, stage: &mut StageContext<'_>, input: &Value) -> Result<String> {
        let current = stage.stage();
        let command = self.command(current);
        let input = serde_json::to_vec(input).context("serialising stage input")?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env(STAGE_ENV, current.as_str());

        match stage.tag() {
            Some(tag) => cmd.env(TAGNODE_ENV, tag),
            None => cmd.env_remove(TAGNODE_ENV),
        };
        if stage.called_as_dependent() {
            cmd.env(AS_DEPENDENT_ENV, "1");
        } else {
            cmd.env_remove(AS_DEPENDENT_ENV);
        }
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        debug!(subsystem = %stage.name(), stage = %current, cmd = %command, "starting stage command");

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning `{command}` for stage {current}"))?;

        // Feed stdin from a separate thread so a chatty child cannot deadlock
        // against a full stdout pipe.
        let stdin = child.stdin.take();
        let output = std::thread::scope(|scope| {
            if let Some(mut stdin) = stdin {
                scope.spawn(move || {
                    // Commands are free to ignore their input.
                    let _ = stdin.write_all(&input);
                });
            }
            child.wait_with_output()
        })
        .with_context(|| format!("waiting for `{command}` (stage {current})"))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            debug!(subsystem = %stage.name(), stage = %current, "stderr: {}", line);
        }

        if !output.status.success() {
            let message = match stderr.trim() {
                "" => format!(
                    "stage {current} exited with status {}",
                    output.status.code().unwrap_or(-1)
                ),
                text => text.to_string(),
            };
            return Err(ConfigError::new(message).into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut payload = Vec::new();
        for line in stdout.lines() {
            match DIRECTIVE_RE.captures(line) {
                Some(caps) => {
                    let case = &caps[1];
                    let tag = caps.get(2).map(|m| m.as_str());
                    stage.set_dependents(case, tag)?;
                }
                None => payload.push(line),
            }
        }

        Ok(payload.join("\n"))
    }
}

impl Subsystem for ScriptSubsystem {
    type Config = Value;

    fn get_config(&self, view: &ConfigView, stage: &mut StageContext<'_>) -> Result<Value> {
        let out = self.run_stage(stage, view.root())?;
        if out.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&out).context("get_config did not print valid JSON")
    }

    fn verify(&self, config: &Value, stage: &mut StageContext<'_>) -> Result<()> {
        self.run_stage(stage, config).map(drop)
    }

    fn generate(&self, config: &Value, stage: &mut StageContext<'_>) -> Result<()> {
        self.run_stage(stage, config).map(drop)
    }

    fn apply(&self, config: &Value, stage: &mut StageContext<'_>) -> Result<()> {
        self.run_stage(stage, config).map(drop)
    }
}
