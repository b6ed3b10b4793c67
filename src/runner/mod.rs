//! Runner layer
//!
//! One [`Runner`] per target mode, selected through [`RunnerSet`].

mod local;
pub(crate) mod process;
mod registry;
mod traits;

pub use local::LocalRunner;
pub use registry::RunnerSet;
pub use traits::{CommandOutput, RunResult, Runner, RunnerError};
