//! Final report structure
//!
//! A [`Report`] maps target identity to command name to [`Outcome`], keeping
//! the order of the input target list and of each target's command list.

use super::outcome::Outcome;
use super::target::TargetMode;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Outcomes for one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    /// Target identity
    pub identity: String,
    /// Target mode
    pub mode: TargetMode,
    /// Outcomes keyed by command name, in command order
    pub commands: Vec<(String, Outcome)>,
}

impl TargetReport {
    /// Looks up the outcome of a command
    #[must_use]
    pub fn get(&self, command: &str) -> Option<&Outcome> {
        self.commands
            .iter()
            .find(|(name, _)| name == command)
            .map(|(_, outcome)| outcome)
    }
}

struct CommandMap<'a>(&'a [(String, Outcome)]);

impl Serialize for CommandMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, outcome) in self.0 {
            map.serialize_entry(name, outcome)?;
        }
        map.end()
    }
}

/// Counts of outcomes by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    /// Successful units
    pub ok: usize,
    /// Failed units
    pub error: usize,
    /// Timed out units
    pub timeout: usize,
}

impl ReportSummary {
    /// Total number of units
    #[must_use]
    pub fn total(&self) -> usize {
        self.ok + self.error + self.timeout
    }
}

/// Nested result of a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    targets: Vec<TargetReport>,
}

impl Report {
    /// Creates a report from per-target sections
    #[must_use]
    pub fn new(targets: Vec<TargetReport>) -> Self {
        Self { targets }
    }

    /// Returns the per-target sections in input order
    #[must_use]
    pub fn targets(&self) -> &[TargetReport] {
        &self.targets
    }

    /// Looks up a target section
    #[must_use]
    pub fn target(&self, identity: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.identity == identity)
    }

    /// Looks up one outcome
    #[must_use]
    pub fn get(&self, identity: &str, command: &str) -> Option<&Outcome> {
        self.target(identity).and_then(|t| t.get(command))
    }

    /// Returns the number of (target, command) entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.iter().map(|t| t.commands.len()).sum()
    }

    /// Returns true if there are no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates `(identity, command, outcome)` in report order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &Outcome)> {
        self.targets.iter().flat_map(|t| {
            t.commands
                .iter()
                .map(move |(name, outcome)| (t.identity.as_str(), name.as_str(), outcome))
        })
    }

    /// Counts outcomes by status
    #[must_use]
    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for (_, _, outcome) in self.entries() {
            match outcome {
                Outcome::Success { .. } => summary.ok += 1,
                Outcome::Failure { .. } => summary.error += 1,
                Outcome::Timeout { .. } => summary.timeout += 1,
            }
        }
        summary
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.targets.len()))?;
        for target in &self.targets {
            map.serialize_entry(&target.identity, &CommandMap(&target.commands))?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ErrorKind;
    use std::time::Duration;

    fn sample() -> Report {
        let d = Duration::from_millis(1);
        Report::new(vec![
            TargetReport {
                identity: "ssh|zeta".to_string(),
                mode: TargetMode::Ssh,
                commands: vec![
                    ("version".to_string(), Outcome::success("2.7.3", d)),
                    ("uptime".to_string(), Outcome::timeout(d)),
                ],
            },
            TargetReport {
                identity: "local".to_string(),
                mode: TargetMode::Local,
                commands: vec![(
                    "version".to_string(),
                    Outcome::failure(ErrorKind::Execution, "exit 1", d),
                )],
            },
        ])
    }

    #[test]
    fn test_lookup() {
        let report = sample();
        assert_eq!(report.len(), 3);
        assert!(report.get("ssh|zeta", "uptime").unwrap().is_timeout());
        assert!(report.get("local", "uptime").is_none());
    }

    #[test]
    fn test_summary() {
        let summary = sample().summary();
        assert_eq!(summary, ReportSummary { ok: 1, error: 1, timeout: 1 });
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn test_serialize_keeps_input_order() {
        let json = serde_json::to_string(&sample()).unwrap();
        let zeta = json.find("ssh|zeta").unwrap();
        let local = json.find("\"local\"").unwrap();
        assert!(zeta < local);
        assert!(json.find("\"version\"").unwrap() < json.find("\"uptime\"").unwrap());
    }
}
