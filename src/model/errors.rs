//! Error types for the collection domain

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a run before any command is dispatched
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Two targets resolved to the same identity
    #[error("Duplicate target identity: '{identity}'")]
    DuplicateTarget {
        /// The identity that appeared more than once.
        identity: String,
    },

    /// A target is missing an address field
    #[error("Invalid target '{identity}': {reason}")]
    InvalidTarget {
        /// Identity of the offending target.
        identity: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Two commands share a name inside the same group
    #[error("Duplicate command '{name}' in group '{group}'")]
    DuplicateCommand {
        /// Group the duplicate was found in (`universal` or a mode name).
        group: String,
        /// The duplicated command name.
        name: String,
    },

    /// A command body cannot be executed
    #[error("Malformed command '{name}': {reason}")]
    MalformedCommand {
        /// Name of the command.
        name: String,
        /// What is wrong with its body.
        reason: String,
    },

    /// Concurrency limit must be at least one
    #[error("Concurrency limit must be positive")]
    InvalidConcurrency,

    /// Per-unit timeout must be non-zero
    #[error("Per-unit timeout must be positive")]
    InvalidTimeout,

    /// A configuration file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file could not be parsed
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },
}

/// Classification of a failed execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// The target could not be reached
    Transport,
    /// Credentials or permissions were rejected
    Auth,
    /// The command ran and exited non-zero
    Execution,
    /// The deadline was exceeded
    Timeout,
    /// The unit was misconfigured
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Auth => write!(f, "auth"),
            Self::Execution => write!(f, "execution"),
            Self::Timeout => write!(f, "timeout"),
            Self::Config => write!(f, "config"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_target_message() {
        let err = ConfigError::DuplicateTarget {
            identity: "ssh|db-1".to_string(),
        };
        assert!(err.to_string().contains("ssh|db-1"));
    }

    #[test]
    fn test_error_kind_serialize() {
        let json = serde_json::to_string(&ErrorKind::Transport).unwrap();
        assert_eq!(json, r#""transport""#);
    }

    #[test]
    fn test_error_kind_display_matches_serde() {
        for kind in [
            ErrorKind::Transport,
            ErrorKind::Auth,
            ErrorKind::Execution,
            ErrorKind::Timeout,
            ErrorKind::Config,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }
}
