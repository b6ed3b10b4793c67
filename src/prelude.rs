//! Prelude module for common imports

pub use crate::engine::{EngineConfig, ExecutionEngine, execute};
pub use crate::model::{
    CommandBody, CommandSet, ConfigError, ErrorKind, Outcome, Report, Target, TargetMode, Validate,
};
pub use crate::runner::{CommandOutput, RunResult, Runner, RunnerError, RunnerSet};
