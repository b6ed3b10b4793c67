//! Outcome of one execution unit

use super::errors::ErrorKind;
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Resolved result of one (target, command) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The command ran and exited zero
    Success {
        /// Captured standard output, trailing whitespace removed
        output: String,
        /// Wall time from dispatch to completion
        duration: Duration,
    },

    /// The command could not run, or ran and failed
    Failure {
        /// Failure classification
        kind: ErrorKind,
        /// Human readable diagnosis
        message: String,
        /// Exit status, when the command ran
        exit_code: Option<i32>,
        /// Captured standard output, when the command ran
        output: Option<String>,
        /// Captured standard error, when the command ran
        stderr: Option<String>,
        /// Wall time from dispatch to failure
        duration: Duration,
    },

    /// The deadline passed before the command finished
    Timeout {
        /// Wall time from dispatch to abandonment
        duration: Duration,
    },
}

impl Outcome {
    /// Creates a success outcome
    #[must_use]
    pub fn success(output: impl Into<String>, duration: Duration) -> Self {
        Self::Success {
            output: output.into(),
            duration,
        }
    }

    /// Creates a failure outcome without process output
    #[must_use]
    pub fn failure(kind: ErrorKind, message: impl Into<String>, duration: Duration) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
            exit_code: None,
            output: None,
            stderr: None,
            duration,
        }
    }

    /// Creates a timeout outcome
    #[must_use]
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Returns the report status string
    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "ok",
            Self::Failure { .. } => "error",
            Self::Timeout { .. } => "timeout",
        }
    }

    /// Returns true for [`Outcome::Success`]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns true for [`Outcome::Failure`]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// Returns true for [`Outcome::Timeout`]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns the failure kind, with timeouts reported as [`ErrorKind::Timeout`]
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
            Self::Timeout { .. } => Some(ErrorKind::Timeout),
        }
    }

    /// Returns the captured standard output, if any
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Success { output, .. } => Some(output),
            Self::Failure { output, .. } => output.as_deref(),
            Self::Timeout { .. } => None,
        }
    }

    /// Returns how long the unit took
    #[must_use]
    pub fn duration(&self) -> Duration {
        match self {
            Self::Success { duration, .. }
            | Self::Failure { duration, .. }
            | Self::Timeout { duration } => *duration,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { duration, .. } => write!(f, "ok ({}ms)", duration.as_millis()),
            Self::Failure {
                kind,
                message,
                duration,
                ..
            } => write!(f, "{kind} error: {message} ({}ms)", duration.as_millis()),
            Self::Timeout { duration } => write!(f, "timeout ({}ms)", duration.as_millis()),
        }
    }
}

#[derive(Serialize)]
struct OutcomeRecord<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stderr: Option<&'a str>,
    duration_ms: u64,
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let duration_ms = u64::try_from(self.duration().as_millis()).unwrap_or(u64::MAX);
        let record = match self {
            Self::Success { output, .. } => OutcomeRecord {
                status: self.status(),
                output: Some(output.as_str()),
                error: None,
                error_kind: None,
                exit_code: None,
                stderr: None,
                duration_ms,
            },
            Self::Failure {
                kind,
                message,
                exit_code,
                output,
                stderr,
                ..
            } => OutcomeRecord {
                status: self.status(),
                output: output.as_deref(),
                error: Some(message.as_str()),
                error_kind: Some(*kind),
                exit_code: *exit_code,
                stderr: stderr.as_deref(),
                duration_ms,
            },
            Self::Timeout { .. } => OutcomeRecord {
                status: self.status(),
                output: None,
                error: None,
                error_kind: None,
                exit_code: None,
                stderr: None,
                duration_ms,
            },
        };
        record.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_status_strings() {
        let d = Duration::from_millis(5);
        assert_eq!(Outcome::success("v1", d).status(), "ok");
        assert_eq!(Outcome::failure(ErrorKind::Auth, "denied", d).status(), "error");
        assert_eq!(Outcome::timeout(d).status(), "timeout");
    }

    #[test]
    fn test_serialize_success() {
        let value = serde_json::to_value(Outcome::success("v1", Duration::from_millis(12))).unwrap();
        assert_eq!(value, json!({"status": "ok", "output": "v1", "duration_ms": 12}));
    }

    #[test]
    fn test_serialize_execution_failure_keeps_exit_code_and_stderr() {
        let outcome = Outcome::Failure {
            kind: ErrorKind::Execution,
            message: "command exited with status 2".to_string(),
            exit_code: Some(2),
            output: Some("partial".to_string()),
            stderr: Some("no such file".to_string()),
            duration: Duration::from_millis(40),
        };
        let value = serde_json::to_value(outcome).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "error",
                "output": "partial",
                "error": "command exited with status 2",
                "error_kind": "execution",
                "exit_code": 2,
                "stderr": "no such file",
                "duration_ms": 40
            })
        );
    }

    #[test]
    fn test_serialize_timeout() {
        let value = serde_json::to_value(Outcome::timeout(Duration::from_secs(2))).unwrap();
        assert_eq!(value, json!({"status": "timeout", "duration_ms": 2000}));
    }

    #[test]
    fn test_timeout_error_kind() {
        assert_eq!(
            Outcome::timeout(Duration::ZERO).error_kind(),
            Some(ErrorKind::Timeout)
        );
        assert_eq!(Outcome::success("", Duration::ZERO).error_kind(), None);
    }
}
