//! Subprocess execution with a deadline
//!
//! Shared by the runners that shell out (local, docker). On Unix the child
//! leads its own process group, and the whole group is killed on timeout so
//! that nothing it started outlives the unit.

use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Captured result of a finished process
#[derive(Debug, Clone)]
pub(crate) struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit status, `-1` when terminated by a signal
    pub exit_code: i32,
}

impl ProcessOutput {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Error, Debug)]
pub(crate) enum ProcessError {
    /// The program could not be started
    #[error("failed to start: {0}")]
    Spawn(std::io::Error),
    /// Reading output or waiting failed
    #[error("failed to collect output: {0}")]
    Io(std::io::Error),
    #[error("timed out")]
    TimedOut,
}

/// Runs `program` with `args`, capturing stdout and stderr
pub(crate) async fn run_process(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> Result<ProcessOutput, ProcessError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    tracing::trace!(program = %program, args = ?args, "Spawning process");

    let child = cmd.spawn().map_err(ProcessError::Spawn)?;
    let pid = child.id();

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        }),
        Ok(Err(e)) => Err(ProcessError::Io(e)),
        Err(_) => {
            tracing::debug!(program = %program, timeout_ms = timeout.as_millis(), "Process timed out, killing");
            if let Some(pid) = pid {
                kill_group(pid);
            }
            Err(ProcessError::TimedOut)
        }
    }
}

/// Kills every process in the group led by `pid`
#[cfg(unix)]
fn kill_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    // ESRCH once every member has already exited
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        tracing::debug!(pid, error = %e, "Process group already gone");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}
