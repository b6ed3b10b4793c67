//! Configuration management
//!
//! Application settings and the command set file.

use super::ssh::SshOptions;
use crate::model::{CommandBody, CommandGroup, CommandSet, ConfigError, TargetMode, Validate};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Log level
    pub log_level: String,
    /// Maximum number of units in flight
    pub concurrency: usize,
    /// Per-unit deadline, in seconds
    pub unit_timeout_secs: u64,
    /// Slack granted to a runner past its deadline before the unit is
    /// recorded as timed out, in milliseconds
    pub grace_ms: u64,
    /// Kubeconfig context (inferred when unset)
    pub kube_context: Option<String>,
    /// SSH connection defaults
    pub ssh: SshOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            concurrency: default_concurrency(),
            unit_timeout_secs: 30,
            grace_ms: 500,
            kube_context: None,
            ssh: SshOptions::default(),
        }
    }
}

impl Config {
    /// Loads configuration from a YAML file; missing fields take defaults
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = read(path)?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Per-unit deadline
    #[must_use]
    pub fn unit_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_timeout_secs)
    }

    /// Engine backstop slack
    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// A command body as written in the command file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBody {
    Shell(String),
    Argv(Vec<String>),
    Script(ScriptBody),
}

/// A diagnostic script shipped next to the command file
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScriptBody {
    script: PathBuf,
    #[serde(default = "default_interpreter")]
    interpreter: String,
}

fn default_interpreter() -> String {
    "python".to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCommandFile {
    #[serde(default)]
    universal: Option<serde_yaml::Mapping>,
    #[serde(default)]
    local: Option<serde_yaml::Mapping>,
    #[serde(default)]
    docker: Option<serde_yaml::Mapping>,
    #[serde(default)]
    kubernetes: Option<serde_yaml::Mapping>,
    #[serde(default)]
    ssh: Option<serde_yaml::Mapping>,
}

/// Loader for command set files
///
/// ```yaml
/// universal:
///   airflow_report: { script: airflow_report.py, interpreter: python3 }
///   hostname: hostname
/// docker:
///   airflow_report: { script: airflow_report.py }
/// local:
///   helm_releases: [helm, ls, -aA, -o, json]
/// ```
#[derive(Debug, Clone)]
pub struct CommandFile {
    path: PathBuf,
}

impl CommandFile {
    /// Creates a loader for `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads, parses and validates the command set
    ///
    /// Script paths are resolved relative to the command file's directory.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file or a referenced script cannot
    /// be read, does not parse, or describes an invalid command set.
    pub fn load(&self) -> Result<CommandSet, ConfigError> {
        let content = read(&self.path)?;
        let base_dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        self.parse(&content, base_dir)
    }

    fn parse(&self, content: &str, base_dir: &Path) -> Result<CommandSet, ConfigError> {
        let raw: RawCommandFile = serde_yaml::from_str(content).map_err(|e| self.parse_error(e))?;

        let mut set = CommandSet::new();
        if let Some(universal) = raw.universal {
            set = set.with_universal_group(self.group(universal, base_dir)?);
        }
        for (mode, mapping) in [
            (TargetMode::Local, raw.local),
            (TargetMode::Docker, raw.docker),
            (TargetMode::Kubernetes, raw.kubernetes),
            (TargetMode::Ssh, raw.ssh),
        ] {
            if let Some(mapping) = mapping {
                set = set.with_mode_group(mode, self.group(mapping, base_dir)?);
            }
        }

        set.validate()?;
        tracing::debug!(path = %self.path.display(), "Loaded command set");
        Ok(set)
    }

    fn group(&self, mapping: serde_yaml::Mapping, base_dir: &Path) -> Result<CommandGroup, ConfigError> {
        let mut group = CommandGroup::new();
        for (key, value) in mapping {
            let name = match key {
                serde_yaml::Value::String(name) => name,
                other => {
                    return Err(ConfigError::MalformedCommand {
                        name: format!("{other:?}"),
                        reason: "command names must be strings".to_string(),
                    });
                }
            };
            let raw: RawBody = serde_yaml::from_value(value).map_err(|e| self.parse_error(e))?;
            let body = match raw {
                RawBody::Shell(line) => CommandBody::Shell(line),
                RawBody::Argv(argv) => CommandBody::Argv(argv),
                RawBody::Script(script) => {
                    let path = base_dir.join(&script.script);
                    let contents = read(&path)?;
                    CommandBody::argv([script.interpreter, "-c".to_string(), contents])
                }
            };
            group.push(name, body);
        }
        Ok(group)
    }

    fn parse_error(&self, source: serde_yaml::Error) -> ConfigError {
        ConfigError::Parse {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn names(set: &CommandSet, mode: TargetMode) -> Vec<String> {
        set.applicable(mode).iter().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.unit_timeout(), Duration::from_secs(30));
        assert_eq!(config.grace(), Duration::from_millis(500));
        assert!(config.concurrency >= 1);
        assert_eq!(config.ssh.default_port, 22);
    }

    #[test]
    fn test_config_load_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level: debug\nconcurrency: 4\nssh:\n  default_user: ops").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.unit_timeout_secs, 30);
        assert_eq!(config.ssh.default_user.as_deref(), Some("ops"));
        assert_eq!(config.ssh.default_port, 22);
    }

    #[test]
    fn test_config_load_missing_file() {
        let err = Config::load("/nonexistent/fleetscope.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_command_file_groups_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.yaml");
        std::fs::write(
            &path,
            "universal:\n  version: airflow version\n  hostname: hostname\n\
             local:\n  helm: [helm, ls, -aA, -o, json]\n\
             docker:\n  version: [airflow, version]\n",
        )
        .unwrap();

        let set = CommandFile::new(&path).load().unwrap();
        assert_eq!(names(&set, TargetMode::Local), vec!["version", "hostname", "helm"]);
        assert_eq!(names(&set, TargetMode::Docker), vec!["version", "hostname"]);
        assert_eq!(
            set.applicable(TargetMode::Docker)[0].body,
            CommandBody::argv(["airflow", "version"])
        );
    }

    #[test]
    fn test_command_file_script_body() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.py"), "print('{}')\n").unwrap();
        let path = dir.path().join("commands.yaml");
        std::fs::write(
            &path,
            "universal:\n  report: { script: report.py }\n  report3: { script: report.py, interpreter: python3 }\n",
        )
        .unwrap();

        let set = CommandFile::new(&path).load().unwrap();
        let group = set.universal_group();
        assert_eq!(
            group.get("report"),
            Some(&CommandBody::argv(["python", "-c", "print('{}')\n"]))
        );
        assert_eq!(
            group.get("report3").unwrap().to_argv()[0],
            "python3".to_string()
        );
    }

    #[test]
    fn test_command_file_missing_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.yaml");
        std::fs::write(&path, "universal:\n  report: { script: missing.py }\n").unwrap();

        let err = CommandFile::new(&path).load().unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_command_file_rejects_unknown_group() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.yaml");
        std::fs::write(&path, "podman:\n  version: podman version\n").unwrap();

        let err = CommandFile::new(&path).load().unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_command_file_rejects_blank_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("commands.yaml");
        std::fs::write(&path, "ssh:\n  uptime: ''\n").unwrap();

        let err = CommandFile::new(&path).load().unwrap_err();
        assert!(matches!(err, ConfigError::MalformedCommand { .. }));
    }

    #[test]
    fn test_demo_files_load() {
        let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
        let set = CommandFile::new(demos.join("commands.yaml")).load().unwrap();
        assert_eq!(
            set.applicable(TargetMode::Docker)[1].body,
            CommandBody::argv(["python3", "--version"])
        );

        let config = Config::load(demos.join("fleetscope.yaml")).unwrap();
        assert_eq!(config.concurrency, 16);
    }
}
