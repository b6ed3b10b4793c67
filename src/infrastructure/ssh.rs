//! SSH runner
//!
//! Opens one session per invocation: connect, verify the host key against
//! `~/.ssh/known_hosts`, authenticate with a private key, then exec the
//! command on a session channel and collect its streams until the channel
//! closes.

use crate::model::{CommandBody, Target, TargetMode};
use crate::runner::{CommandOutput, RunResult, Runner, RunnerError};
use async_trait::async_trait;
use russh::{ChannelMsg, Disconnect, client};
use russh_keys::key;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// SSH connection defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SshOptions {
    /// User for targets that do not name one (falls back to `$USER`)
    pub default_user: Option<String>,
    /// Port for targets that do not name one
    pub default_port: u16,
    /// Private key (defaults to the first of `id_ed25519`, `id_ecdsa` and
    /// `id_rsa` found in `~/.ssh`)
    pub key_path: Option<PathBuf>,
    /// Reject hosts missing from `known_hosts`
    pub strict_host_key_checking: bool,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            default_user: None,
            default_port: 22,
            key_path: None,
            strict_host_key_checking: false,
        }
    }
}

#[derive(Error, Debug)]
#[error("host key for {host}:{port} {reason}")]
struct HostKeyRejected {
    host: String,
    port: u16,
    reason: String,
}

struct ClientHandler {
    host: String,
    port: u16,
    strict: bool,
}

impl ClientHandler {
    fn reject(&self, reason: impl Into<String>) -> anyhow::Error {
        HostKeyRejected {
            host: self.host.clone(),
            port: self.port,
            reason: reason.into(),
        }
        .into()
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        match russh_keys::check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => Ok(true),
            Ok(false) if self.strict => Err(self.reject("is not in known_hosts")),
            Ok(false) => {
                tracing::debug!(host = %self.host, "Accepting unknown host key");
                Ok(true)
            }
            Err(russh_keys::Error::KeyChanged { line }) => Err(self.reject(format!(
                "does not match known_hosts line {line}"
            ))),
            Err(e) if self.strict => Err(self.reject(format!("could not be verified: {e}"))),
            Err(e) => {
                tracing::warn!(host = %self.host, error = %e, "Could not read known_hosts");
                Ok(true)
            }
        }
    }
}

/// Runner for [`Target::Ssh`]
#[derive(Debug, Clone, Default)]
pub struct SshRunner {
    options: SshOptions,
}

impl SshRunner {
    /// Creates a runner with the given defaults
    #[must_use]
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    /// Returns the connection defaults
    #[must_use]
    pub fn options(&self) -> &SshOptions {
        &self.options
    }

    fn user_for(&self, user: Option<&String>) -> String {
        user.cloned()
            .or_else(|| self.options.default_user.clone())
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "root".to_string())
    }

    fn key_path(&self) -> Result<PathBuf, RunnerError> {
        if let Some(path) = &self.options.key_path {
            return Ok(path.clone());
        }
        let ssh_dir = dirs::home_dir()
            .ok_or_else(|| RunnerError::Auth("cannot locate home directory for SSH keys".to_string()))?
            .join(".ssh");
        ["id_ed25519", "id_ecdsa", "id_rsa"]
            .iter()
            .map(|name| ssh_dir.join(name))
            .find(|path| path.exists())
            .ok_or_else(|| {
                RunnerError::Auth(format!("no private key found in {}", ssh_dir.display()))
            })
    }

    async fn connect(
        &self,
        host: &str,
        port: u16,
        user: &str,
    ) -> Result<client::Handle<ClientHandler>, RunnerError> {
        let config = Arc::new(client::Config::default());
        let handler = ClientHandler {
            host: host.to_string(),
            port,
            strict: self.options.strict_host_key_checking,
        };

        let mut session = client::connect(config, (host, port), handler)
            .await
            .map_err(classify_connect_error)?;

        let key_path = self.key_path()?;
        let key_pair = russh_keys::load_secret_key(&key_path, None).map_err(|e| {
            RunnerError::Auth(format!("failed to load key {}: {e}", key_path.display()))
        })?;

        let accepted = session
            .authenticate_publickey(user, Arc::new(key_pair))
            .await
            .map_err(|e| RunnerError::Transport(format!("authentication exchange failed: {e}")))?;
        if !accepted {
            return Err(RunnerError::Auth(format!(
                "public key rejected for {user}@{host}:{port}"
            )));
        }

        Ok(session)
    }

    async fn exec(&self, host: &str, port: u16, user: &str, command_line: &str) -> RunResult {
        let session = self.connect(host, port, user).await?;
        let transport = |e: russh::Error| RunnerError::Transport(format!("{host}:{port}: {e}"));

        let mut channel = session.channel_open_session().await.map_err(transport)?;
        channel.exec(true, command_line).await.map_err(transport)?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status = None;
        let mut exit_signal = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, .. } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    exit_signal = Some(format!("{signal_name:?}"));
                }
                _ => {}
            }
        }

        if let Err(e) = session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            tracing::debug!(host = %host, port, error = %e, "SSH disconnect failed");
        }

        finish(
            exit_status,
            exit_signal,
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        )
    }
}

fn classify_connect_error(err: anyhow::Error) -> RunnerError {
    if let Some(rejected) = err.downcast_ref::<HostKeyRejected>() {
        return RunnerError::Auth(rejected.to_string());
    }
    if let Some(russh::Error::UnknownKey) = err.downcast_ref::<russh::Error>() {
        return RunnerError::Auth("server host key rejected".to_string());
    }
    RunnerError::Transport(format!("connection failed: {err:#}"))
}

/// Turns the collected channel state into a result
fn finish(
    exit_status: Option<u32>,
    exit_signal: Option<String>,
    stdout: String,
    mut stderr: String,
) -> RunResult {
    match (exit_status, exit_signal) {
        (Some(0), _) => Ok(CommandOutput { stdout, stderr }),
        (Some(code), _) => Err(RunnerError::Execution {
            code: i32::try_from(code).unwrap_or(i32::MAX),
            stdout,
            stderr,
        }),
        (None, Some(signal)) => {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!("killed by signal {signal}"));
            Err(RunnerError::Execution {
                code: -1,
                stdout,
                stderr,
            })
        }
        (None, None) => Err(RunnerError::Transport(
            "channel closed without an exit status".to_string(),
        )),
    }
}

#[async_trait]
impl Runner for SshRunner {
    fn mode(&self) -> TargetMode {
        TargetMode::Ssh
    }

    fn name(&self) -> &str {
        "ssh"
    }

    async fn run(&self, target: &Target, command: &CommandBody, timeout: Duration) -> RunResult {
        let Target::Ssh { host, user, port } = target else {
            return Err(RunnerError::ModeMismatch {
                expected: TargetMode::Ssh,
                actual: target.mode(),
            });
        };

        let user = self.user_for(user.as_ref());
        let port = port.unwrap_or(self.options.default_port);
        let command_line = command.to_shell_string();

        tracing::debug!(host = %host, port, user = %user, command = %command, "Running over SSH");

        // Dropping the session future closes the connection
        match tokio::time::timeout(timeout, self.exec(host, port, &user, &command_line)).await {
            Ok(result) => result,
            Err(_) => Err(RunnerError::Timeout(timeout)),
        }
    }
}
