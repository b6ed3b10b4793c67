//! Execution engine
//!
//! Runs every applicable command against every target with bounded
//! concurrency, a per-unit deadline, and failure isolation between units.
//!
//! Each unit runs in its own task and returns `(index, Outcome)`; outcomes
//! are merged after the join, so no state is shared between tasks.

mod aggregate;
mod plan;

pub use aggregate::aggregate;
pub use plan::{ExecutionPlan, ExecutionUnit, InvalidTransition, PlannedTarget, UnitKey, UnitState};

use crate::infrastructure::Config;
use crate::model::{CommandSet, ConfigError, ErrorKind, Outcome, Report, Target};
use crate::runner::{Runner, RunnerSet};
use ahash::AHashMap;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Engine limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of units in flight
    pub concurrency: usize,
    /// Deadline handed to runners for each unit
    pub unit_timeout: Duration,
    /// Extra time a runner gets past `unit_timeout` before the engine
    /// abandons it
    pub grace: Duration,
}

impl EngineConfig {
    /// Creates limits with the default grace period
    #[must_use]
    pub fn new(concurrency: usize, unit_timeout: Duration) -> Self {
        Self {
            concurrency,
            unit_timeout,
            grace: Duration::from_millis(500),
        }
    }

    /// Sets the grace period
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Checks that the limits are usable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidConcurrency`] or
    /// [`ConfigError::InvalidTimeout`] for zero values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if self.unit_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            concurrency: config.concurrency,
            unit_timeout: config.unit_timeout(),
            grace: config.grace(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Multi-target execution engine
#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    runners: RunnerSet,
    config: EngineConfig,
}

impl ExecutionEngine {
    /// Creates an engine
    #[must_use]
    pub fn new(runners: RunnerSet, config: EngineConfig) -> Self {
        Self { runners, config }
    }

    /// Returns the engine limits
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs `commands` against `targets` and returns the report
    ///
    /// Every applicable (target, command) pair gets exactly one outcome.
    /// Runner failures, timeouts and panics are recorded in the report and
    /// never abort the run.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] before anything is dispatched if the
    /// limits, the targets or the command set are invalid.
    pub async fn execute(&self, targets: &[Target], commands: &CommandSet) -> Result<Report, ConfigError> {
        self.config.validate()?;
        let plan = ExecutionPlan::build(targets, commands)?;

        let span = tracing::info_span!("run", run_id = %Uuid::new_v4());
        Ok(self.dispatch(plan).instrument(span).await)
    }

    async fn dispatch(&self, plan: ExecutionPlan) -> Report {
        let started = Instant::now();
        tracing::info!(
            targets = plan.targets().len(),
            units = plan.len(),
            concurrency = self.config.concurrency,
            timeout_ms = self.config.unit_timeout.as_millis(),
            "Starting run"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut states = vec![UnitState::Pending; plan.len()];
        let mut tasks = JoinSet::new();

        for unit in plan.units() {
            // The semaphore is never closed
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if let Ok(state) = states[unit.index].advance(UnitState::Dispatched) {
                states[unit.index] = state;
            }

            let runner = Arc::clone(self.runners.get(unit.target.mode()));
            let unit = unit.clone();
            let config = self.config;
            let span = tracing::info_span!(
                "unit",
                identity = %unit.target_identity,
                command = %unit.command_name
            );
            tasks.spawn(
                async move {
                    let _permit = permit;
                    let outcome = run_unit(runner.as_ref(), &unit, config).await;
                    (unit.index, outcome)
                }
                .instrument(span),
            );
        }

        let mut outcomes: AHashMap<UnitKey, Outcome> = AHashMap::with_capacity(plan.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => {
                    match states[index].advance(UnitState::for_outcome(&outcome)) {
                        Ok(state) => {
                            states[index] = state;
                            outcomes.insert(plan.units()[index].key(), outcome);
                        }
                        Err(e) => tracing::warn!(unit = index, error = %e, "Discarding outcome"),
                    }
                }
                Err(e) => tracing::error!(error = %e, "Unit task did not complete"),
            }
        }

        let report = aggregate(&plan, &outcomes);
        let summary = report.summary();
        tracing::info!(
            ok = summary.ok,
            error = summary.error,
            timeout = summary.timeout,
            duration_ms = started.elapsed().as_millis(),
            "Run complete"
        );
        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one unit to exactly one outcome
async fn run_unit(runner: &dyn Runner, unit: &ExecutionUnit, config: EngineConfig) -> Outcome {
    let started = Instant::now();
    let call = AssertUnwindSafe(runner.run(&unit.target, &unit.body, config.unit_timeout)).catch_unwind();

    let outcome = match tokio::time::timeout(config.unit_timeout + config.grace, call).await {
        Ok(Ok(Ok(output))) => output.into_outcome(started.elapsed()),
        Ok(Ok(Err(err))) => err.into_outcome(started.elapsed()),
        Ok(Err(payload)) => Outcome::failure(
            ErrorKind::Execution,
            format!("{} runner panicked: {}", runner.name(), panic_message(payload.as_ref())),
            started.elapsed(),
        ),
        Err(_) => {
            tracing::warn!(runner = runner.name(), "Runner overran its deadline, abandoning");
            Outcome::timeout(started.elapsed())
        }
    };

    let duration_ms = outcome.duration().as_millis();
    match &outcome {
        Outcome::Success { .. } => tracing::debug!(status = outcome.status(), duration_ms, "Unit finished"),
        Outcome::Failure { kind, message, .. } => {
            tracing::warn!(status = outcome.status(), kind = %kind, error = %message, duration_ms, "Unit failed");
        }
        Outcome::Timeout { .. } => tracing::warn!(status = outcome.status(), duration_ms, "Unit timed out"),
    }
    outcome
}

/// Runs `commands` against `targets` with the default runners
///
/// # Errors
///
/// Returns a [`ConfigError`] before anything is dispatched if the inputs
/// are invalid.
pub async fn execute(
    targets: &[Target],
    commands: &CommandSet,
    concurrency: usize,
    unit_timeout: Duration,
) -> Result<Report, ConfigError> {
    ExecutionEngine::new(RunnerSet::default(), EngineConfig::new(concurrency, unit_timeout))
        .execute(targets, commands)
        .await
}
