//! Target autodiscovery
//!
//! Finds scheduler containers on the local Docker daemon and scheduler pods
//! in the current Kubernetes cluster.

use super::kubernetes;
use crate::model::Target;
use crate::runner::process::run_process;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while discovering targets
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// Listing containers failed
    #[error("Docker discovery failed: {0}")]
    Docker(String),

    /// Listing pods failed
    #[error("Kubernetes discovery failed: {0}")]
    Kubernetes(String),
}

/// Source of automatically discovered targets
#[async_trait]
pub trait Discover: Send + Sync {
    /// Lists Docker targets
    async fn docker(&self) -> Result<Vec<Target>, DiscoveryError>;

    /// Lists Kubernetes targets
    async fn kubernetes(&self) -> Result<Vec<Target>, DiscoveryError>;
}

/// Discovery against the live Docker daemon and cluster
#[derive(Debug, Clone)]
pub struct LiveDiscovery {
    docker_binary: String,
    name_filter: String,
    label_selector: String,
    container: String,
    kube_context: Option<String>,
    timeout: Duration,
}

impl Default for LiveDiscovery {
    fn default() -> Self {
        Self {
            docker_binary: "docker".to_string(),
            name_filter: "scheduler".to_string(),
            label_selector: "component=scheduler".to_string(),
            container: "scheduler".to_string(),
            kube_context: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl LiveDiscovery {
    /// Creates discovery with the default filters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a named kubeconfig context
    #[must_use]
    pub fn with_kube_context(mut self, context: Option<String>) -> Self {
        self.kube_context = context;
        self
    }

    /// Sets the container name filter passed to `docker ps`
    #[must_use]
    pub fn with_name_filter(mut self, filter: impl Into<String>) -> Self {
        self.name_filter = filter.into();
        self
    }

    /// Sets the pod label selector
    #[must_use]
    pub fn with_label_selector(mut self, selector: impl Into<String>) -> Self {
        self.label_selector = selector.into();
        self
    }

    /// Sets the container CLI binary
    #[must_use]
    pub fn with_docker_binary(mut self, binary: impl Into<String>) -> Self {
        self.docker_binary = binary.into();
        self
    }
}

fn parse_container_ids(stdout: &str) -> Vec<Target> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(Target::docker)
        .collect()
}

#[async_trait]
impl Discover for LiveDiscovery {
    async fn docker(&self) -> Result<Vec<Target>, DiscoveryError> {
        let args = [
            "ps".to_string(),
            "--filter".to_string(),
            format!("name={}", self.name_filter),
            "--format".to_string(),
            "{{.ID}}".to_string(),
        ];
        let output = run_process(&self.docker_binary, &args, self.timeout)
            .await
            .map_err(|e| DiscoveryError::Docker(format!("{}: {e}", self.docker_binary)))?;
        if !output.is_success() {
            return Err(DiscoveryError::Docker(output.stderr.trim().to_string()));
        }

        let targets = parse_container_ids(&output.stdout);
        tracing::info!(count = targets.len(), filter = %self.name_filter, "Discovered docker targets");
        Ok(targets)
    }

    async fn kubernetes(&self) -> Result<Vec<Target>, DiscoveryError> {
        let client = kubernetes::connect(self.kube_context.as_deref())
            .await
            .map_err(DiscoveryError::Kubernetes)?;
        let pods: Api<Pod> = Api::all(client);
        let params = ListParams::default().labels(&self.label_selector);
        let list = pods
            .list(&params)
            .await
            .map_err(|e| DiscoveryError::Kubernetes(e.to_string()))?;

        let targets: Vec<Target> = list
            .items
            .into_iter()
            .filter_map(|pod| {
                let name = pod.metadata.name?;
                let namespace = pod.metadata.namespace?;
                Some(Target::kubernetes(namespace, name, self.container.clone()))
            })
            .collect();
        tracing::info!(count = targets.len(), selector = %self.label_selector, "Discovered kubernetes targets");
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_container_ids() {
        let targets = parse_container_ids("abc123\n\n def456 \n");
        assert_eq!(targets, vec![Target::docker("abc123"), Target::docker("def456")]);
    }

    #[tokio::test]
    async fn test_docker_discovery_missing_binary() {
        let discovery = LiveDiscovery::new().with_docker_binary("no-such-container-cli-xyz");
        let err = discovery.docker().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::Docker(_)));
    }

    #[tokio::test]
    async fn test_docker_discovery_reads_ids() {
        // `echo` prints its arguments, standing in for `docker ps`
        let discovery = LiveDiscovery::new().with_docker_binary("echo");
        let targets = discovery.docker().await.unwrap();
        assert_eq!(targets.len(), 1);
    }
}
