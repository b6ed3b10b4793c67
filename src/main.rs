//! fleetscope - collect diagnostics from a fleet of hosts
//!
//! Runs a command set against local, Docker, Kubernetes and SSH targets
//! concurrently and writes a JSON report.
//!
//! ## Commands
//!
//! - `fleetscope collect` - Run the command set and write the report
//! - `fleetscope completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Local machine plus discovered scheduler containers
//! fleetscope collect --local --docker -c commands.yaml -o -
//!
//! # Explicit hosts, 16 commands in flight, 10s per command
//! fleetscope collect -f hosts.yaml -p 16 -t 10 --structured --pretty
//!
//! # Generate shell completions
//! fleetscope completions bash > /etc/bash_completion.d/fleetscope
//! ```

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if std::env::var("FLEETSCOPE_VERBOSE").is_ok() {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
