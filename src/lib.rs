//! # Fleetscope - concurrent diagnostics across a fleet
//!
//! Fleetscope runs a set of named diagnostic commands against a mixed list
//! of targets (the local machine, Docker containers, Kubernetes pods and
//! SSH hosts) and assembles one report keyed by target and command.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fleetscope::{CommandSet, Target};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), fleetscope::ConfigError> {
//! let targets = vec![Target::Local, Target::ssh("airflow-1.internal")];
//! let commands = CommandSet::new().universal("version", "airflow version");
//!
//! let report = fleetscope::execute(&targets, &commands, 8, Duration::from_secs(30)).await?;
//! println!("{}", serde_json::to_string_pretty(&report).unwrap());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **One outcome per unit**: every (target, command) pair resolves to a
//!   success, a classified failure, or a timeout
//! - **Bounded concurrency**: at most `C` commands in flight
//! - **Failure isolation**: an unreachable host never affects other units
//! - **Deterministic reports**: ordered by input targets and commands
//!
//! ## License
//!
//! Licensed under either of
//! - Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <https://www.apache.org/licenses/LICENSE-2.0>)
//! - MIT license ([LICENSE-MIT](LICENSE-MIT) or <https://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod engine;
pub mod infrastructure;
pub mod model;
pub mod runner;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use engine::{EngineConfig, ExecutionEngine, ExecutionPlan, ExecutionUnit, UnitState, execute};
pub use infrastructure::{
    CommandFile, Config, Discover, DiscoveryError, DockerRunner, HostsFile, KubernetesRunner,
    LiveDiscovery, SshOptions, SshRunner,
};
pub use model::{
    CommandBody, CommandGroup, CommandSet, ConfigError, ErrorKind, NamedCommand, Outcome, Report,
    ReportSummary, Target, TargetMode, TargetReport, Validate,
};
pub use runner::{CommandOutput, LocalRunner, RunResult, Runner, RunnerError, RunnerSet};

/// Version of the fleetscope crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
