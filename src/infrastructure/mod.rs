//! Infrastructure layer
//!
//! Backend runners, target discovery, the cluster summary, configuration
//! files and logging.

mod cluster_info;
mod config;
mod discovery;
mod docker;
mod hosts;
pub(crate) mod kubernetes;
mod logging;
mod ssh;

pub use cluster_info::{ClusterInfo, ClusterInfoError};
pub use config::{CommandFile, Config};
pub use discovery::{Discover, DiscoveryError, LiveDiscovery};
pub use docker::DockerRunner;
pub use hosts::HostsFile;
pub use kubernetes::KubernetesRunner;
pub use logging::init_logging;
pub use ssh::{SshOptions, SshRunner};
