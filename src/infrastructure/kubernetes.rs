//! Kubernetes runner
//!
//! Executes commands inside pod containers through the cluster API's exec
//! subresource. The attach stream multiplexes stdout, stderr and a status
//! channel; the status object decides between success, a non-zero exit and
//! an exec-level failure.

use crate::model::{CommandBody, Target, TargetMode};
use crate::runner::{CommandOutput, RunResult, Runner, RunnerError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams};
use kube::config::{Config as KubeConfig, KubeConfigOptions};
use kube::Client;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::OnceCell;
use tokio::time::{Instant, timeout_at};

/// Runner for [`Target::Kubernetes`]
///
/// The cluster client is created on first use and shared by every
/// invocation of this runner.
#[derive(Default)]
pub struct KubernetesRunner {
    context: Option<String>,
    client: OnceCell<Client>,
}

impl fmt::Debug for KubernetesRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubernetesRunner")
            .field("context", &self.context)
            .field("connected", &self.client.initialized())
            .finish()
    }
}

impl KubernetesRunner {
    /// Creates a runner that infers cluster configuration
    /// (in-cluster service account, then the default kubeconfig context)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a named kubeconfig context
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Uses an existing client
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self {
            context: None,
            client: OnceCell::new_with(Some(client)),
        }
    }

    pub(crate) async fn client(&self) -> Result<Client, RunnerError> {
        let client = self
            .client
            .get_or_try_init(|| async {
                connect(self.context.as_deref())
                    .await
                    .map_err(RunnerError::Transport)
            })
            .await?;
        Ok(client.clone())
    }

    async fn ensure_running(pods: &Api<Pod>, namespace: &str, pod_name: &str) -> Result<(), RunnerError> {
        let pod = pods.get(pod_name).await.map_err(classify_api_error)?;
        let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
        if phase == Some("Pending") {
            return Err(RunnerError::Transport(format!(
                "pod {namespace}/{pod_name} is pending"
            )));
        }
        Ok(())
    }
}

/// Builds a cluster client for `context`, or from the inferred environment
pub(crate) async fn connect(context: Option<&str>) -> Result<Client, String> {
    let config = match context {
        Some(context) => {
            let options = KubeConfigOptions {
                context: Some(context.to_string()),
                ..KubeConfigOptions::default()
            };
            KubeConfig::from_kubeconfig(&options)
                .await
                .map_err(|e| format!("failed to load kubeconfig context '{context}': {e}"))?
        }
        None => KubeConfig::infer()
            .await
            .map_err(|e| format!("failed to infer cluster config: {e}"))?,
    };
    Client::try_from(config).map_err(|e| format!("failed to build cluster client: {e}"))
}

/// Maps a cluster API error onto the runner taxonomy
pub(crate) fn classify_api_error(err: kube::Error) -> RunnerError {
    match err {
        kube::Error::Api(response) if response.code == 401 || response.code == 403 => {
            RunnerError::Auth(response.message)
        }
        kube::Error::Api(response) if response.code == 404 => {
            RunnerError::Transport(format!("not found: {}", response.message))
        }
        other => RunnerError::Transport(other.to_string()),
    }
}

fn exit_code(status: &Status) -> Option<i32> {
    status
        .details
        .as_ref()?
        .causes
        .as_ref()?
        .iter()
        .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
        .and_then(|cause| cause.message.as_deref())
        .and_then(|message| message.trim().parse().ok())
}

/// Decides the result of an exec from its status channel
fn interpret_status(status: Option<&Status>, stdout: String, stderr: String) -> RunResult {
    let Some(status) = status else {
        return Err(RunnerError::Transport(
            "exec stream closed without a status".to_string(),
        ));
    };

    if status.status.as_deref() == Some("Success") {
        return Ok(CommandOutput { stdout, stderr });
    }

    if status.reason.as_deref() == Some("NonZeroExitCode") {
        return Err(RunnerError::Execution {
            code: exit_code(status).unwrap_or(-1),
            stdout,
            stderr,
        });
    }

    let message = status
        .message
        .clone()
        .unwrap_or_else(|| "exec failed".to_string());
    Err(RunnerError::Transport(message))
}

async fn read_stream<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[async_trait]
impl Runner for KubernetesRunner {
    fn mode(&self) -> TargetMode {
        TargetMode::Kubernetes
    }

    fn name(&self) -> &str {
        "kubernetes"
    }

    async fn run(&self, target: &Target, command: &CommandBody, timeout: Duration) -> RunResult {
        let Target::Kubernetes {
            namespace,
            pod_name,
            container_name,
        } = target
        else {
            return Err(RunnerError::ModeMismatch {
                expected: TargetMode::Kubernetes,
                actual: target.mode(),
            });
        };

        let deadline = Instant::now() + timeout;
        let argv = command.to_argv();

        tracing::debug!(
            namespace = %namespace,
            pod = %pod_name,
            container = %container_name,
            command = %command,
            "Running in pod"
        );

        let setup = async {
            let client = self.client().await?;
            let pods: Api<Pod> = Api::namespaced(client, namespace);
            Self::ensure_running(&pods, namespace, pod_name).await?;

            let params = AttachParams::default()
                .container(container_name.as_str())
                .stdin(false)
                .stdout(true)
                .stderr(true);
            pods.exec(pod_name, argv, &params)
                .await
                .map_err(classify_api_error)
        };

        let mut attached = match timeout_at(deadline, setup).await {
            Ok(result) => result?,
            Err(_) => return Err(RunnerError::Timeout(timeout)),
        };

        let stdout = attached.stdout();
        let stderr = attached.stderr();
        let status = attached.take_status();

        let collect = async move {
            let (stdout, stderr) = tokio::join!(read_stream(stdout), read_stream(stderr));
            let status = match status {
                Some(status) => status.await,
                None => None,
            };
            (stdout, stderr, status)
        };

        match timeout_at(deadline, collect).await {
            Ok((stdout, stderr, status)) => {
                let stdout = stdout
                    .map_err(|e| RunnerError::Transport(format!("failed to read stdout: {e}")))?;
                let stderr = stderr
                    .map_err(|e| RunnerError::Transport(format!("failed to read stderr: {e}")))?;
                interpret_status(status.as_ref(), stdout, stderr)
            }
            Err(_) => {
                attached.abort();
                Err(RunnerError::Timeout(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ErrorKind;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{StatusCause, StatusDetails};

    fn failure(reason: &str, message: &str, causes: Vec<StatusCause>) -> Status {
        Status {
            status: Some("Failure".to_string()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            details: Some(StatusDetails {
                causes: Some(causes),
                ..StatusDetails::default()
            }),
            ..Status::default()
        }
    }

    #[test]
    fn test_success_status() {
        let status = Status {
            status: Some("Success".to_string()),
            ..Status::default()
        };
        let out = interpret_status(Some(&status), "2.7.3\n".to_string(), String::new()).unwrap();
        assert_eq!(out.stdout, "2.7.3\n");
    }

    #[test]
    fn test_non_zero_exit_status() {
        let status = failure(
            "NonZeroExitCode",
            "command terminated with non-zero exit code: exit status 3",
            vec![StatusCause {
                reason: Some("ExitCode".to_string()),
                message: Some("3".to_string()),
                field: None,
            }],
        );
        let err = interpret_status(Some(&status), String::new(), "boom".to_string()).unwrap_err();
        assert_eq!(
            err,
            RunnerError::Execution {
                code: 3,
                stdout: String::new(),
                stderr: "boom".to_string(),
            }
        );
    }

    #[test]
    fn test_exec_failure_is_transport() {
        let status = failure("InternalError", "container not found (\"scheduler\")", vec![]);
        let err = interpret_status(Some(&status), String::new(), String::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("container not found"));
    }

    #[test]
    fn test_missing_status_is_transport() {
        let err = interpret_status(None, String::new(), String::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_classify_forbidden_is_auth() {
        let err = classify_api_error(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "pods \"scheduler-0\" is forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        }));
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[test]
    fn test_classify_not_found_is_transport() {
        let err = classify_api_error(kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "pods \"gone\" not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        }));
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_rejects_other_modes() {
        let runner = KubernetesRunner::new();
        let err = runner
            .run(&Target::Local, &CommandBody::shell("true"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::ModeMismatch { .. }));
    }
}
