//! Execution plan
//!
//! The cross product of targets and the commands applicable to each, built
//! once per run before anything is dispatched.

use crate::model::{
    CommandBody, CommandSet, ConfigError, Outcome, Target, TargetMode, Validate, validate_targets,
};
use std::sync::Arc;
use thiserror::Error;

/// Key of a unit in the flat outcome map: `(target identity, command name)`
pub type UnitKey = (String, String);

/// One (target, command) pair scheduled for execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionUnit {
    /// Position in the plan
    pub index: usize,
    /// Identity of the target
    pub target_identity: String,
    /// Name of the command
    pub command_name: String,
    /// What to run
    pub body: CommandBody,
    /// Where to run it
    pub target: Arc<Target>,
}

impl ExecutionUnit {
    /// Returns the flat map key of this unit
    #[must_use]
    pub fn key(&self) -> UnitKey {
        (self.target_identity.clone(), self.command_name.clone())
    }
}

/// A target as it appears in the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTarget {
    /// Target identity
    pub identity: String,
    /// Target mode
    pub mode: TargetMode,
}

/// Ordered list of execution units for one run
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    targets: Vec<PlannedTarget>,
    units: Vec<ExecutionUnit>,
}

impl ExecutionPlan {
    /// Validates the inputs and builds the plan
    ///
    /// Units are ordered by target, then by command as returned by
    /// [`CommandSet::applicable`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for duplicate or incomplete targets and for
    /// invalid command sets.
    pub fn build(targets: &[Target], commands: &CommandSet) -> Result<Self, ConfigError> {
        validate_targets(targets)?;
        commands.validate()?;

        let mut plan = Self::default();
        for target in targets {
            let identity = target.identity();
            let shared = Arc::new(target.clone());
            for command in commands.applicable(target.mode()) {
                plan.units.push(ExecutionUnit {
                    index: plan.units.len(),
                    target_identity: identity.clone(),
                    command_name: command.name.clone(),
                    body: command.body.clone(),
                    target: Arc::clone(&shared),
                });
            }
            plan.targets.push(PlannedTarget {
                identity,
                mode: target.mode(),
            });
        }
        Ok(plan)
    }

    /// Returns the targets in input order
    #[must_use]
    pub fn targets(&self) -> &[PlannedTarget] {
        &self.targets
    }

    /// Returns the units in plan order
    #[must_use]
    pub fn units(&self) -> &[ExecutionUnit] {
        &self.units
    }

    /// Returns the number of units
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if nothing is to be run
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Lifecycle of an execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    /// Waiting for a worker slot
    Pending,
    /// Handed to a runner
    Dispatched,
    /// Resolved to a success
    Succeeded,
    /// Resolved to a failure
    Failed,
    /// Resolved to a timeout
    TimedOut,
}

/// A transition [`UnitState::advance`] refused
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal unit transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    /// State the unit was in
    pub from: UnitState,
    /// State that was requested
    pub to: UnitState,
}

impl UnitState {
    /// Returns true for the resolved states
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }

    /// Terminal state matching an outcome
    #[must_use]
    pub fn for_outcome(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Success { .. } => Self::Succeeded,
            Outcome::Failure { .. } => Self::Failed,
            Outcome::Timeout { .. } => Self::TimedOut,
        }
    }

    /// Moves to `next`
    ///
    /// # Errors
    ///
    /// Only `Pending -> Dispatched` and `Dispatched -> terminal` are legal.
    pub fn advance(self, next: Self) -> Result<Self, InvalidTransition> {
        match (self, next) {
            (Self::Pending, Self::Dispatched) => Ok(next),
            (Self::Dispatched, to) if to.is_terminal() => Ok(next),
            (from, to) => Err(InvalidTransition { from, to }),
        }
    }
}
