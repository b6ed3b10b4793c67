//! Runner dispatch table

use super::{LocalRunner, Runner};
use crate::infrastructure::{Config, DockerRunner, KubernetesRunner, SshRunner};
use crate::model::TargetMode;
use std::fmt;
use std::sync::Arc;

/// One runner per target mode
///
/// [`RunnerSet::get`] is the only place a target mode is mapped to the code
/// that executes it.
#[derive(Clone)]
pub struct RunnerSet {
    local: Arc<dyn Runner>,
    docker: Arc<dyn Runner>,
    kubernetes: Arc<dyn Runner>,
    ssh: Arc<dyn Runner>,
}

impl RunnerSet {
    /// Creates the production runners configured from `config`
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let kubernetes = match &config.kube_context {
            Some(context) => KubernetesRunner::new().with_context(context.clone()),
            None => KubernetesRunner::new(),
        };
        Self {
            local: Arc::new(LocalRunner::new()),
            docker: Arc::new(DockerRunner::new()),
            kubernetes: Arc::new(kubernetes),
            ssh: Arc::new(SshRunner::new(config.ssh.clone())),
        }
    }

    /// Replaces the runner serving `runner.mode()`
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        match runner.mode() {
            TargetMode::Local => self.local = runner,
            TargetMode::Docker => self.docker = runner,
            TargetMode::Kubernetes => self.kubernetes = runner,
            TargetMode::Ssh => self.ssh = runner,
        }
        self
    }

    /// Returns the runner for `mode`
    #[must_use]
    pub fn get(&self, mode: TargetMode) -> &Arc<dyn Runner> {
        match mode {
            TargetMode::Local => &self.local,
            TargetMode::Docker => &self.docker,
            TargetMode::Kubernetes => &self.kubernetes,
            TargetMode::Ssh => &self.ssh,
        }
    }
}

impl Default for RunnerSet {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl fmt::Debug for RunnerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerSet")
            .field("local", &self.local.name())
            .field("docker", &self.docker.name())
            .field("kubernetes", &self.kubernetes.name())
            .field("ssh", &self.ssh.name())
            .finish()
    }
}
