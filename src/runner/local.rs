//! Local runner
//!
//! Runs commands as subprocesses of the calling machine.

use super::process::{ProcessError, run_process};
use super::traits::{CommandOutput, RunResult, Runner, RunnerError};
use crate::model::{CommandBody, Target, TargetMode};
use async_trait::async_trait;
use std::time::Duration;

/// Runner for [`Target::Local`]
#[derive(Debug, Clone)]
pub struct LocalRunner {
    shell: String,
}

impl LocalRunner {
    /// Creates a runner using `sh`
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    /// Sets the shell used for shell-string bodies
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Runner for LocalRunner {
    fn mode(&self) -> TargetMode {
        TargetMode::Local
    }

    fn name(&self) -> &str {
        "local"
    }

    async fn run(&self, target: &Target, command: &CommandBody, timeout: Duration) -> RunResult {
        RunnerError::check_mode(TargetMode::Local, target)?;

        let (program, args) = match command {
            CommandBody::Shell(line) => (self.shell.as_str(), vec!["-c".to_string(), line.clone()]),
            CommandBody::Argv(argv) => match argv.split_first() {
                Some((program, rest)) => (program.as_str(), rest.to_vec()),
                None => return Err(RunnerError::InvalidCommand("empty argument list".to_string())),
            },
        };

        tracing::debug!(command = %command, "Running locally");

        match run_process(program, &args, timeout).await {
            Ok(out) if out.is_success() => Ok(CommandOutput {
                stdout: out.stdout,
                stderr: out.stderr,
            }),
            Ok(out) => Err(RunnerError::Execution {
                code: out.exit_code,
                stdout: out.stdout,
                stderr: out.stderr,
            }),
            // Mirror the shell's "command not found" for argv bodies
            Err(ProcessError::Spawn(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RunnerError::Execution {
                    code: 127,
                    stdout: String::new(),
                    stderr: format!("{program}: {e}"),
                })
            }
            Err(ProcessError::Spawn(e)) => {
                Err(RunnerError::Transport(format!("failed to spawn {program}: {e}")))
            }
            Err(ProcessError::Io(e)) => Err(RunnerError::Transport(format!(
                "failed to collect output of {program}: {e}"
            ))),
            Err(ProcessError::TimedOut) => Err(RunnerError::Timeout(timeout)),
        }
    }
}
