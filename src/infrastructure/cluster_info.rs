//! Cluster summary
//!
//! Server version, a guess at the managed provider, and the CPU and memory
//! summed over every node. Reported next to the fleet with `--cluster-info`.

use super::kubernetes::KubernetesRunner;
use k8s_openapi::api::core::v1::{Node, NodeStatus};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::{Api, ListParams};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

const GIB: u64 = 1024 * 1024 * 1024;

/// Errors raised while summarising the cluster
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterInfoError {
    /// The cluster could not be queried
    #[error("cluster query failed: {0}")]
    Api(String),

    /// A node reported a quantity that does not parse
    #[error("invalid {resource} quantity {value:?}")]
    Quantity {
        /// Resource name (`cpu` or `memory`)
        resource: &'static str,
        /// Raw quantity
        value: String,
    },

    /// The deadline passed
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Cluster-wide facts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterInfo {
    /// API server `gitVersion`
    pub version: String,
    /// `gke`, `eks` or `aks`, guessed from the version string
    pub provider: Option<&'static str>,
    /// Allocatable CPU cores over all nodes
    pub allocated_cpu: f64,
    /// Allocatable memory over all nodes, in whole GiB
    pub allocated_gb: u64,
    /// CPU capacity over all nodes
    pub capacity_cpu: f64,
    /// Memory capacity over all nodes, in whole GiB
    pub capacity_gb: u64,
}

impl ClusterInfo {
    /// Summarises `nodes` for a server reporting `version`
    ///
    /// Nodes without a status, or without a `cpu`/`memory` entry, count as zero.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterInfoError::Quantity`] for a malformed quantity.
    pub fn from_nodes(version: impl Into<String>, nodes: &[Node]) -> Result<Self, ClusterInfoError> {
        let version = version.into();
        let (allocated_cpu, allocated_bytes) = totals(nodes, |s| s.allocatable.as_ref())?;
        let (capacity_cpu, capacity_bytes) = totals(nodes, |s| s.capacity.as_ref())?;
        Ok(Self {
            provider: provider(&version),
            version,
            allocated_cpu,
            allocated_gb: allocated_bytes / GIB,
            capacity_cpu,
            capacity_gb: capacity_bytes / GIB,
        })
    }
}

fn totals(
    nodes: &[Node],
    pick: impl Fn(&NodeStatus) -> Option<&BTreeMap<String, Quantity>>,
) -> Result<(f64, u64), ClusterInfoError> {
    let mut cpu = 0.0;
    let mut memory = 0u64;
    for resources in nodes.iter().filter_map(|n| n.status.as_ref()).filter_map(&pick) {
        if let Some(Quantity(raw)) = resources.get("cpu") {
            cpu += parse_cpu(raw)?;
        }
        if let Some(Quantity(raw)) = resources.get("memory") {
            memory = memory.saturating_add(parse_memory(raw)?);
        }
    }
    Ok((cpu, memory))
}

fn provider(version: &str) -> Option<&'static str> {
    if version.contains("gke") {
        Some("gke")
    } else if version.contains("eks") {
        Some("eks")
    } else if version.contains("az") {
        Some("aks")
    } else {
        None
    }
}

/// Splits `"16Gi"` into `(16.0, "Gi")`
fn split_quantity(raw: &str) -> Option<(f64, &str)> {
    let raw = raw.trim();
    let at = raw.find(|c: char| c.is_ascii_alphabetic()).unwrap_or(raw.len());
    let (number, suffix) = raw.split_at(at);
    let number: f64 = number.parse().ok()?;
    (number.is_finite() && number >= 0.0).then_some((number, suffix))
}

/// Parses a CPU quantity (`"4"`, `"1.5"`, `"500m"`) into cores
///
/// # Errors
///
/// Returns [`ClusterInfoError::Quantity`] for anything else.
pub fn parse_cpu(raw: &str) -> Result<f64, ClusterInfoError> {
    let invalid = || ClusterInfoError::Quantity {
        resource: "cpu",
        value: raw.to_string(),
    };
    let (number, suffix) = split_quantity(raw).ok_or_else(invalid)?;
    let divisor = match suffix {
        "" => 1.0,
        "m" => 1e3,
        "u" => 1e6,
        "n" => 1e9,
        _ => return Err(invalid()),
    };
    Ok(number / divisor)
}

/// Parses a memory quantity (`"16Gi"`, `"16393216Ki"`, `"1G"`, `"512"`)
/// into bytes
///
/// # Errors
///
/// Returns [`ClusterInfoError::Quantity`] for an unknown suffix or a
/// malformed number.
pub fn parse_memory(raw: &str) -> Result<u64, ClusterInfoError> {
    let invalid = || ClusterInfoError::Quantity {
        resource: "memory",
        value: raw.to_string(),
    };
    let (number, suffix) = split_quantity(raw).ok_or_else(invalid)?;
    let scale: f64 = match suffix {
        "" => 1.0,
        "Ki" => 1024f64,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        _ => return Err(invalid()),
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bytes = (number * scale).round() as u64;
    Ok(bytes)
}

impl KubernetesRunner {
    /// Queries the server version and the node list with this runner's client
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterInfoError`] if the cluster cannot be reached within
    /// `timeout` or reports malformed quantities.
    pub async fn cluster_info(&self, timeout: Duration) -> Result<ClusterInfo, ClusterInfoError> {
        let query = async {
            let client = self
                .client()
                .await
                .map_err(|e| ClusterInfoError::Api(e.to_string()))?;
            let version = client
                .apiserver_version()
                .await
                .map_err(|e| ClusterInfoError::Api(e.to_string()))?;
            let nodes: Api<Node> = Api::all(client);
            let list = nodes
                .list(&ListParams::default())
                .await
                .map_err(|e| ClusterInfoError::Api(e.to_string()))?;

            tracing::debug!(nodes = list.items.len(), version = %version.git_version, "Listed cluster nodes");
            ClusterInfo::from_nodes(version.git_version, &list.items)
        };

        tokio::time::timeout(timeout, query)
            .await
            .unwrap_or(Err(ClusterInfoError::Timeout(timeout)))
    }
}
