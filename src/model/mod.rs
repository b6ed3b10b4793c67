//! Collection domain model
//!
//! Targets, command sets, outcomes and the report they are assembled into.

pub mod command;
pub mod errors;
pub mod outcome;
pub mod report;
pub mod target;

pub use command::{CommandBody, CommandGroup, CommandSet, NamedCommand};
pub use errors::{ConfigError, ErrorKind};
pub use outcome::Outcome;
pub use report::{Report, ReportSummary, TargetReport};
pub use target::{Target, TargetMode, validate_targets};

/// Trait for types that can be validated
#[allow(clippy::missing_errors_doc)]
pub trait Validate {
    /// Type of validation error
    type Error;

    /// Validates this type
    fn validate(&self) -> std::result::Result<(), Self::Error>;
}
