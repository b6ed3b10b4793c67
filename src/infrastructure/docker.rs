//! Docker runner
//!
//! Executes commands inside running containers through `docker exec`.

use crate::model::{CommandBody, Target, TargetMode};
use crate::runner::process::{ProcessError, ProcessOutput, run_process};
use crate::runner::{CommandOutput, RunResult, Runner, RunnerError};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

/// Errors the docker CLI prints when the daemon or the container is
/// unreachable, as opposed to the command itself failing.
static DAEMON_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(Error response from daemon|Cannot connect to the Docker daemon|error during connect|Error: No such container)",
    )
    .expect("daemon error pattern is valid")
});

static PERMISSION_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)permission denied while trying to connect to the docker daemon")
        .expect("permission error pattern is valid")
});

/// Runner for [`Target::Docker`]
#[derive(Debug, Clone)]
pub struct DockerRunner {
    binary: String,
}

impl DockerRunner {
    /// Creates a runner using the `docker` binary on `PATH`
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Sets the container CLI binary (e.g. `podman`)
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn exec_args(container_id: &str, command: &CommandBody) -> Vec<String> {
        let mut args = vec!["exec".to_string(), container_id.to_string()];
        args.extend(command.to_argv());
        args
    }

    /// The CLI's own error: a single stderr line and no stdout. Anything
    /// else came from the command inside the container.
    fn cli_error(output: &ProcessOutput) -> Option<&str> {
        let stderr = output.stderr.trim();
        (output.stdout.trim().is_empty() && !stderr.is_empty() && !stderr.contains('\n'))
            .then_some(stderr)
    }

    fn classify(output: ProcessOutput) -> RunResult {
        if output.is_success() {
            return Ok(CommandOutput {
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        if let Some(message) = Self::cli_error(&output) {
            if PERMISSION_ERROR.is_match(message) {
                return Err(RunnerError::Auth(message.to_string()));
            }
            if DAEMON_ERROR.is_match(message) {
                return Err(RunnerError::Transport(message.to_string()));
            }
        }

        Err(RunnerError::Execution {
            code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

impl Default for DockerRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Runner for DockerRunner {
    fn mode(&self) -> TargetMode {
        TargetMode::Docker
    }

    fn name(&self) -> &str {
        "docker"
    }

    async fn run(&self, target: &Target, command: &CommandBody, timeout: Duration) -> RunResult {
        let Target::Docker { container_id } = target else {
            return Err(RunnerError::ModeMismatch {
                expected: TargetMode::Docker,
                actual: target.mode(),
            });
        };

        tracing::debug!(container = %container_id, command = %command, "Running in container");

        let args = Self::exec_args(container_id, command);
        match run_process(&self.binary, &args, timeout).await {
            Ok(output) => Self::classify(output),
            Err(ProcessError::Spawn(e)) => Err(RunnerError::Transport(format!(
                "failed to start {}: {e}",
                self.binary
            ))),
            Err(ProcessError::Io(e)) => Err(RunnerError::Transport(format!(
                "failed to collect output of {}: {e}",
                self.binary
            ))),
            Err(ProcessError::TimedOut) => Err(RunnerError::Timeout(timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ErrorKind;

    fn output(exit_code: i32, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
        }
    }

    #[test]
    fn test_exec_args_shell() {
        let args = DockerRunner::exec_args("abc123", &CommandBody::shell("airflow version"));
        assert_eq!(args, vec!["exec", "abc123", "sh", "-c", "airflow version"]);
    }

    #[test]
    fn test_exec_args_argv() {
        let args = DockerRunner::exec_args("abc123", &CommandBody::argv(["python", "-V"]));
        assert_eq!(args, vec!["exec", "abc123", "python", "-V"]);
    }

    #[test]
    fn test_classify_success() {
        let result = DockerRunner::classify(output(0, "2.7.3\n", ""));
        assert_eq!(result.unwrap().stdout, "2.7.3\n");
    }

    #[test]
    fn test_classify_missing_container_is_transport() {
        let err = DockerRunner::classify(output(
            1,
            "",
            "Error response from daemon: No such container: abc123\n",
        ))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_classify_daemon_down_is_transport() {
        let err = DockerRunner::classify(output(
            1,
            "",
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?\n",
        ))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_classify_socket_permission_is_auth() {
        let err = DockerRunner::classify(output(
            1,
            "",
            "Got permission denied while trying to connect to the Docker daemon socket\n",
        ))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[test]
    fn test_classify_command_failure_is_execution() {
        let err = DockerRunner::classify(output(2, "", "ls: /nope: No such file or directory\n"))
            .unwrap_err();
        assert!(matches!(err, RunnerError::Execution { code: 2, .. }));
    }

    #[test]
    fn test_classify_nested_daemon_error_is_execution() {
        // A diagnostic that itself calls docker and reports on its failure
        let err = DockerRunner::classify(output(
            1,
            "checking sidecar daemon\n",
            "Error response from daemon: No such container: sidecar\n",
        ))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);

        let err = DockerRunner::classify(output(
            1,
            "",
            "probing docker-in-docker\nCannot connect to the Docker daemon at tcp://dind:2375\n",
        ))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[tokio::test]
    async fn test_missing_binary_is_transport() {
        let runner = DockerRunner::new().with_binary("no-such-container-cli-xyz");
        let err = runner
            .run(
                &Target::docker("abc"),
                &CommandBody::shell("true"),
                Duration::from_secs(2),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }
}
