//! Runner traits
//!
//! This module defines the capability every backend implements: run one
//! command against one target within a deadline.

use crate::model::{CommandBody, ErrorKind, Outcome, Target, TargetMode};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Result of a single runner invocation
pub type RunResult = Result<CommandOutput, RunnerError>;

/// Output of a command that exited zero
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Creates output with empty stderr
    #[must_use]
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Converts into a success outcome
    #[must_use]
    pub fn into_outcome(self, duration: Duration) -> Outcome {
        Outcome::success(self.stdout.trim_end(), duration)
    }
}

/// Errors a runner reports for a single invocation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    /// The target could not be reached
    #[error("transport error: {0}")]
    Transport(String),

    /// Credentials or permissions were rejected
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The command ran and exited non-zero
    #[error("command exited with status {code}")]
    Execution {
        /// Exit status (`-1` when killed by a signal)
        code: i32,
        /// Standard output captured before exit
        stdout: String,
        /// Standard error captured before exit
        stderr: String,
    },

    /// The deadline passed
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The command body cannot be run
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The runner was handed a target of another mode
    #[error("{actual} target cannot be run by the {expected} runner")]
    ModeMismatch {
        /// Mode the runner serves
        expected: TargetMode,
        /// Mode of the target it received
        actual: TargetMode,
    },
}

impl RunnerError {
    /// Returns the failure classification
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) => ErrorKind::Transport,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Execution { .. } => ErrorKind::Execution,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::InvalidCommand(_) | Self::ModeMismatch { .. } => ErrorKind::Config,
        }
    }

    /// Converts into a failure or timeout outcome
    ///
    /// Exit code, stdout and stderr of an execution error are kept so that
    /// callers can still use partial output.
    #[must_use]
    pub fn into_outcome(self, duration: Duration) -> Outcome {
        let non_empty = |s: &str| {
            let s = s.trim_end();
            (!s.is_empty()).then(|| s.to_string())
        };

        match self {
            Self::Timeout(_) => Outcome::timeout(duration),
            Self::Execution {
                code,
                ref stdout,
                ref stderr,
            } => Outcome::Failure {
                kind: ErrorKind::Execution,
                message: self.to_string(),
                exit_code: Some(code),
                output: non_empty(stdout),
                stderr: non_empty(stderr),
                duration,
            },
            other => Outcome::failure(other.kind(), other.to_string(), duration),
        }
    }

    /// Returns a mismatch error unless `target` has mode `expected`
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::ModeMismatch`] when the modes differ.
    pub fn check_mode(expected: TargetMode, target: &Target) -> Result<(), Self> {
        let actual = target.mode();
        if actual == expected {
            Ok(())
        } else {
            Err(Self::ModeMismatch { expected, actual })
        }
    }
}

/// Capability to run a command against a target
///
/// Implementations must resolve within roughly `timeout`, abandoning the
/// underlying process or connection when it elapses, and must report every
/// transport, authentication or exit-status problem as a [`RunnerError`].
#[async_trait]
pub trait Runner: Send + Sync {
    /// Mode of the targets this runner serves
    fn mode(&self) -> TargetMode;

    /// Runner name used in logs
    fn name(&self) -> &str;

    /// Runs `command` on `target`
    async fn run(&self, target: &Target, command: &CommandBody, timeout: Duration) -> RunResult;
}
