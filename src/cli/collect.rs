//! `fleetscope collect` - Run the command set against the fleet
//!
//! Targets come from a hosts file (`-f`) or from the mode flags plus
//! autodiscovery. The report is written as JSON.

use super::render::{RenderOptions, render_json};
use anyhow::{Context, Result, bail};
use clap::Args;
use fleetscope::infrastructure::{
    CommandFile, Config, HostsFile, KubernetesRunner, LiveDiscovery, init_logging,
};
use fleetscope::{EngineConfig, ExecutionEngine, RunnerSet};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Arguments of `fleetscope collect`
#[derive(Args, Debug)]
pub struct CollectArgs {
    /// Include the local machine
    #[arg(long, env = "FLEETSCOPE_LOCAL")]
    pub local: bool,

    /// Discover scheduler containers on the local Docker daemon
    #[arg(long, env = "FLEETSCOPE_DOCKER")]
    pub docker: bool,

    /// Discover scheduler pods in the current Kubernetes cluster
    #[arg(long, env = "FLEETSCOPE_KUBERNETES")]
    pub kubernetes: bool,

    /// Hosts file listing local, docker, kubernetes and ssh targets
    #[arg(short = 'f', long, env = "FLEETSCOPE_HOSTS_FILE")]
    pub hosts_file: Option<PathBuf>,

    /// Command set file
    #[arg(short, long, env = "FLEETSCOPE_COMMANDS", default_value = "commands.yaml")]
    pub commands: PathBuf,

    /// Output file, `-` for stdout
    #[arg(short, long, env = "FLEETSCOPE_OUTPUT", default_value = "report.json")]
    pub output: PathBuf,

    /// Maximum number of commands in flight (defaults to the CPU count)
    #[arg(short, long, env = "FLEETSCOPE_PARALLELISM")]
    pub parallelism: Option<usize>,

    /// Per-command timeout in seconds
    #[arg(short, long, env = "FLEETSCOPE_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Add a summary of the current Kubernetes cluster to the report
    #[arg(long, env = "FLEETSCOPE_CLUSTER_INFO")]
    pub cluster_info: bool,

    /// Parse JSON output and split other output into lines
    #[arg(long)]
    pub structured: bool,

    /// Pretty-print the report
    #[arg(long)]
    pub pretty: bool,

    /// Application configuration file
    #[arg(long, env = "FLEETSCOPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (overridden by `RUST_LOG`)
    #[arg(long, env = "FLEETSCOPE_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl CollectArgs {
    /// Loads the configuration file and applies flag overrides
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(parallelism) = self.parallelism {
            config.concurrency = parallelism;
        }
        if let Some(timeout) = self.timeout {
            config.unit_timeout_secs = timeout;
        }
        if let Some(level) = &self.log_level {
            config.log_level.clone_from(level);
        }
        Ok(config)
    }

    fn hosts(&self) -> Result<HostsFile> {
        if let Some(path) = &self.hosts_file {
            return HostsFile::load(path)
                .with_context(|| format!("Failed to load hosts file: {}", path.display()));
        }
        if !(self.local || self.docker || self.kubernetes) {
            bail!("No targets selected: pass --local, --docker, --kubernetes or -f HOSTS_FILE");
        }
        Ok(HostsFile::from_flags(self.local, self.docker, self.kubernetes))
    }
}

/// Summarises the cluster, recording a failure in place of the summary
async fn cluster_info(config: &Config) -> serde_json::Value {
    let runner = match &config.kube_context {
        Some(context) => KubernetesRunner::new().with_context(context.clone()),
        None => KubernetesRunner::new(),
    };
    let summary = runner
        .cluster_info(config.unit_timeout())
        .await
        .map_err(|e| e.to_string())
        .and_then(|info| serde_json::to_value(info).map_err(|e| e.to_string()));
    match summary {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(error = %error, "Failed to summarise cluster");
            serde_json::json!({ "error": error })
        }
    }
}

fn write_output(path: &Path, rendered: &str) -> Result<()> {
    if path == Path::new("-") {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{rendered}").context("Failed to write report to stdout")?;
        return Ok(());
    }
    std::fs::write(path, rendered)
        .with_context(|| format!("Failed to write report to: {}", path.display()))
}

/// Runs a collection
pub async fn collect(args: CollectArgs) -> Result<()> {
    let config = args.config()?;
    init_logging(&config.log_level);

    let hosts = args.hosts()?;
    let discovery = LiveDiscovery::new().with_kube_context(config.kube_context.clone());
    let targets = hosts
        .resolve(&discovery)
        .await
        .context("Failed to resolve targets")?;

    let commands = CommandFile::new(&args.commands)
        .load()
        .with_context(|| format!("Failed to load commands: {}", args.commands.display()))?;

    tracing::info!(
        targets = targets.len(),
        output = %args.output.display(),
        "Generating report"
    );

    let cluster = if args.cluster_info {
        Some(cluster_info(&config).await)
    } else {
        None
    };

    let engine = ExecutionEngine::new(RunnerSet::from_config(&config), EngineConfig::from(&config));
    let report = engine.execute(&targets, &commands).await?;

    let rendered = render_json(
        &report,
        cluster,
        RenderOptions {
            pretty: args.pretty,
            structured: args.structured,
        },
    )
    .context("Failed to render report")?;
    write_output(&args.output, &rendered)?;

    let summary = report.summary();
    tracing::info!(
        ok = summary.ok,
        error = summary.error,
        timeout = summary.timeout,
        "Report written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: CollectArgs,
    }

    fn parse(argv: &[&str]) -> CollectArgs {
        let mut full = vec!["collect"];
        full.extend_from_slice(argv);
        Harness::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleetscope.yaml");
        std::fs::write(&path, "concurrency: 2\nunit_timeout_secs: 5\n").unwrap();

        let args = parse(&["--config", path.to_str().unwrap(), "-t", "9"]);
        let config = args.config().unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.unit_timeout_secs, 9);
    }

    #[test]
    fn test_no_targets_is_an_error() {
        let args = parse(&[]);
        assert!(args.hosts().is_err());
    }

    #[tokio::test]
    async fn test_cluster_info_never_fails_the_run() {
        let config = Config {
            unit_timeout_secs: 2,
            kube_context: Some("fleetscope-no-such-context".to_string()),
            ..Config::default()
        };
        let value = cluster_info(&config).await;
        assert!(value["error"].as_str().is_some_and(|e| !e.is_empty()));
    }

    #[tokio::test]
    async fn test_collect_local_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let commands = dir.path().join("commands.yaml");
        std::fs::write(&commands, "universal:\n  ver: echo v1\n").unwrap();
        let output = dir.path().join("report.json");

        let args = parse(&[
            "--local",
            "-c",
            commands.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--structured",
        ]);
        collect(args).await.unwrap();

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(report["local"]["ver"]["status"], "ok");
        assert_eq!(report["local"]["ver"]["output"], serde_json::json!(["v1"]));
    }
}
