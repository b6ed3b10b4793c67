//! Hosts file
//!
//! Declares the targets of a run, one section per mode:
//!
//! ```yaml
//! local:
//! docker:
//!   - container_id: 3f2a9c
//! kubernetes:            # empty: discover scheduler pods
//! ssh:
//!   - host: airflow-1.internal
//!     user: ops
//! ```

use super::discovery::{Discover, DiscoveryError};
use crate::model::{ConfigError, Target};
use serde::{Deserialize, Deserializer};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct DockerHost {
    container_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct KubernetesHost {
    name: String,
    namespace: String,
    #[serde(default = "default_container")]
    container: String,
}

fn default_container() -> String {
    "scheduler".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct SshHost {
    host: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    port: Option<u16>,
}

/// Distinguishes a key written with an empty value from a missing key
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Parsed hosts file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostsFile {
    #[serde(default, deserialize_with = "present")]
    local: Option<serde_yaml::Value>,
    #[serde(default, deserialize_with = "present")]
    docker: Option<Option<Vec<DockerHost>>>,
    #[serde(default, deserialize_with = "present")]
    kubernetes: Option<Option<Vec<KubernetesHost>>>,
    #[serde(default, deserialize_with = "present")]
    ssh: Option<Option<Vec<SshHost>>>,
}

impl HostsFile {
    /// Reads and parses a hosts file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`]; unknown
    /// sections and fields are parse errors.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses hosts file content
    ///
    /// # Errors
    ///
    /// Returns the YAML error when the content does not describe a hosts file.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document is an empty hosts file
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Builds a hosts file from command line mode flags
    ///
    /// Docker and Kubernetes sections are left empty so that
    /// [`HostsFile::resolve`] discovers them.
    #[must_use]
    pub fn from_flags(local: bool, docker: bool, kubernetes: bool) -> Self {
        Self {
            local: local.then_some(serde_yaml::Value::Null),
            docker: docker.then_some(None),
            kubernetes: kubernetes.then_some(None),
            ssh: None,
        }
    }

    /// Returns true if the Docker section asks for autodiscovery
    #[must_use]
    pub fn discovers_docker(&self) -> bool {
        matches!(&self.docker, Some(hosts) if hosts.as_ref().is_none_or(Vec::is_empty))
    }

    /// Returns true if the Kubernetes section asks for autodiscovery
    #[must_use]
    pub fn discovers_kubernetes(&self) -> bool {
        matches!(&self.kubernetes, Some(hosts) if hosts.as_ref().is_none_or(Vec::is_empty))
    }

    /// Expands the file into targets, in local, docker, kubernetes, ssh order
    ///
    /// # Errors
    ///
    /// Returns a [`DiscoveryError`] if a requested autodiscovery fails.
    pub async fn resolve(&self, discover: &dyn Discover) -> Result<Vec<Target>, DiscoveryError> {
        let mut targets = Vec::new();

        if self.local.is_some() {
            targets.push(Target::Local);
        }

        if self.discovers_docker() {
            tracing::info!("Attempting autodiscovery for docker hosts");
            targets.extend(discover.docker().await?);
        } else if let Some(Some(hosts)) = &self.docker {
            targets.extend(hosts.iter().map(|h| Target::docker(h.container_id.clone())));
        }

        if self.discovers_kubernetes() {
            tracing::info!("Attempting autodiscovery for kubernetes hosts");
            targets.extend(discover.kubernetes().await?);
        } else if let Some(Some(hosts)) = &self.kubernetes {
            targets.extend(hosts.iter().map(|h| {
                Target::kubernetes(h.namespace.clone(), h.name.clone(), h.container.clone())
            }));
        }

        if let Some(Some(hosts)) = &self.ssh {
            targets.extend(hosts.iter().map(|h| Target::Ssh {
                host: h.host.clone(),
                user: h.user.clone(),
                port: h.port,
            }));
        }

        tracing::info!(count = targets.len(), "Resolved targets");
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct FakeDiscovery;

    #[async_trait]
    impl Discover for FakeDiscovery {
        async fn docker(&self) -> Result<Vec<Target>, DiscoveryError> {
            Ok(vec![Target::docker("found-1"), Target::docker("found-2")])
        }

        async fn kubernetes(&self) -> Result<Vec<Target>, DiscoveryError> {
            Err(DiscoveryError::Kubernetes("no cluster".to_string()))
        }
    }

    #[tokio::test]
    async fn test_explicit_hosts_in_section_order() {
        let hosts = HostsFile::from_yaml(
            "ssh:\n  - host: db-1\n    user: ops\n    port: 2222\n\
             kubernetes:\n  - name: sched-0\n    namespace: airflow\n\
             docker:\n  - container_id: abc\n\
             local:\n",
        )
        .unwrap();

        let targets = hosts.resolve(&FakeDiscovery).await.unwrap();
        assert_eq!(
            targets,
            vec![
                Target::Local,
                Target::docker("abc"),
                Target::kubernetes("airflow", "sched-0", "scheduler"),
                Target::ssh("db-1").with_user("ops").with_port(2222),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_docker_section_discovers() {
        for yaml in ["docker:\n", "docker: []\n"] {
            let hosts = HostsFile::from_yaml(yaml).unwrap();
            assert!(hosts.discovers_docker());
            let targets = hosts.resolve(&FakeDiscovery).await.unwrap();
            assert_eq!(targets.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_missing_sections_do_not_discover() {
        let hosts = HostsFile::from_yaml("ssh:\n  - host: db-1\n").unwrap();
        assert!(!hosts.discovers_docker());
        assert!(!hosts.discovers_kubernetes());
        let targets = hosts.resolve(&FakeDiscovery).await.unwrap();
        assert_eq!(targets, vec![Target::ssh("db-1")]);
    }

    #[tokio::test]
    async fn test_discovery_failure_propagates() {
        let hosts = HostsFile::from_flags(false, false, true);
        let err = hosts.resolve(&FakeDiscovery).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Kubernetes(_)));
    }

    #[test]
    fn test_unknown_section_rejected() {
        assert!(HostsFile::from_yaml("podman:\n  - id: x\n").is_err());
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(HostsFile::from_yaml("docker:\n  - container: x\n").is_err());
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(HostsFile::from_yaml("").unwrap(), HostsFile::default());
    }

    #[test]
    fn test_load_reports_path() {
        let err = HostsFile::load("/nonexistent/hosts.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/hosts.yaml"));
    }

    #[tokio::test]
    async fn test_demo_hosts_file() {
        let hosts = HostsFile::load(
            Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/hosts.yaml"),
        )
        .unwrap();
        assert!(hosts.discovers_docker());
        assert!(!hosts.discovers_kubernetes());

        let targets = hosts.resolve(&FakeDiscovery).await.unwrap();
        assert_eq!(targets.len(), 1 + 2 + 2 + 2);
        assert_eq!(targets[0], Target::Local);
    }
}
