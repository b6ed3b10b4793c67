//! Target types
//!
//! A target is one place a command can run. Each variant carries exactly the
//! fields its backend needs to address it.

use super::Validate;
use super::errors::ConfigError;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution mode of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    /// The calling machine
    Local,
    /// A container on the local container runtime
    Docker,
    /// A container inside a Kubernetes pod
    Kubernetes,
    /// A remote machine reached over SSH
    Ssh,
}

impl TargetMode {
    /// All modes, in report order
    pub const ALL: [TargetMode; 4] = [Self::Local, Self::Docker, Self::Kubernetes, Self::Ssh];
}

impl fmt::Display for TargetMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Docker => write!(f, "docker"),
            Self::Kubernetes => write!(f, "kubernetes"),
            Self::Ssh => write!(f, "ssh"),
        }
    }
}

fn default_container_name() -> String {
    "scheduler".to_string()
}

/// A place a command can run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Target {
    /// The calling machine
    Local,

    /// A running container, addressed by id or name
    Docker {
        /// Container id or name
        container_id: String,
    },

    /// A container in a pod
    Kubernetes {
        /// Pod namespace
        namespace: String,
        /// Pod name
        pod_name: String,
        /// Container inside the pod
        #[serde(default = "default_container_name")]
        container_name: String,
    },

    /// A remote host
    Ssh {
        /// Hostname or address
        host: String,
        /// Login user (falls back to the configured default)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        /// Port (falls back to the configured default)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },
}

impl Target {
    /// Creates a docker target
    #[must_use]
    pub fn docker(container_id: impl Into<String>) -> Self {
        Self::Docker {
            container_id: container_id.into(),
        }
    }

    /// Creates a kubernetes target
    #[must_use]
    pub fn kubernetes(
        namespace: impl Into<String>,
        pod_name: impl Into<String>,
        container_name: impl Into<String>,
    ) -> Self {
        Self::Kubernetes {
            namespace: namespace.into(),
            pod_name: pod_name.into(),
            container_name: container_name.into(),
        }
    }

    /// Creates an ssh target with default user and port
    #[must_use]
    pub fn ssh(host: impl Into<String>) -> Self {
        Self::Ssh {
            host: host.into(),
            user: None,
            port: None,
        }
    }

    /// Sets the login user of an ssh target; no-op for other modes
    #[must_use]
    pub fn with_user(mut self, login: impl Into<String>) -> Self {
        if let Self::Ssh { ref mut user, .. } = self {
            *user = Some(login.into());
        }
        self
    }

    /// Sets the port of an ssh target; no-op for other modes
    #[must_use]
    pub fn with_port(mut self, value: u16) -> Self {
        if let Self::Ssh { ref mut port, .. } = self {
            *port = Some(value);
        }
        self
    }

    /// Returns the execution mode
    #[must_use]
    pub fn mode(&self) -> TargetMode {
        match self {
            Self::Local => TargetMode::Local,
            Self::Docker { .. } => TargetMode::Docker,
            Self::Kubernetes { .. } => TargetMode::Kubernetes,
            Self::Ssh { .. } => TargetMode::Ssh,
        }
    }

    /// Returns the report key for this target
    ///
    /// The key is the mode followed by the address fields, separated by `|`.
    /// SSH targets render as `user@host:port` with absent parts omitted.
    #[must_use]
    pub fn identity(&self) -> String {
        match self {
            Self::Local => "local".to_string(),
            Self::Docker { container_id } => format!("docker|{container_id}"),
            Self::Kubernetes {
                namespace,
                pod_name,
                container_name,
            } => format!("kubernetes|{namespace}|{pod_name}|{container_name}"),
            Self::Ssh { host, user, port } => {
                let mut id = String::from("ssh|");
                if let Some(user) = user {
                    id.push_str(user);
                    id.push('@');
                }
                id.push_str(host);
                if let Some(port) = port {
                    id.push(':');
                    id.push_str(&port.to_string());
                }
                id
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identity())
    }
}

fn require(field: &str, value: &str, target: &Target) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidTarget {
            identity: target.identity(),
            reason: format!("{field} cannot be empty"),
        });
    }
    Ok(())
}

impl Validate for Target {
    type Error = ConfigError;

    fn validate(&self) -> Result<(), Self::Error> {
        match self {
            Self::Local => Ok(()),
            Self::Docker { container_id } => require("container_id", container_id, self),
            Self::Kubernetes {
                namespace,
                pod_name,
                container_name,
            } => {
                require("namespace", namespace, self)?;
                require("pod_name", pod_name, self)?;
                require("container_name", container_name, self)
            }
            Self::Ssh { host, user, port } => {
                require("host", host, self)?;
                if let Some(user) = user {
                    require("user", user, self)?;
                }
                if *port == Some(0) {
                    return Err(ConfigError::InvalidTarget {
                        identity: self.identity(),
                        reason: "port cannot be 0".to_string(),
                    });
                }
                Ok(())
            }
        }
    }
}

/// Validates a run's target list
///
/// Every target must be well formed and identities must be unique.
///
/// # Errors
///
/// Returns the first [`ConfigError`] found, in list order.
pub fn validate_targets(targets: &[Target]) -> Result<(), ConfigError> {
    let mut seen = AHashSet::with_capacity(targets.len());
    for target in targets {
        target.validate()?;
        let identity = target.identity();
        if !seen.insert(identity.clone()) {
            return Err(ConfigError::DuplicateTarget { identity });
        }
    }
    Ok(())
}
