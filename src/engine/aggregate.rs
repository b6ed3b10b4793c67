//! Result aggregation
//!
//! Reshapes the flat `(target, command) -> Outcome` map collected by the
//! engine into a [`Report`] ordered like the plan. Pure; no I/O.

use super::plan::{ExecutionPlan, UnitKey};
use crate::model::{ErrorKind, Outcome, Report, TargetReport};
use ahash::AHashMap;
use std::time::Duration;

/// Builds the report for `plan` from collected outcomes
///
/// A unit with no entry in `outcomes` is reported as an execution failure so
/// that every unit appears exactly once; entries that match no unit are
/// ignored.
#[must_use]
pub fn aggregate(plan: &ExecutionPlan, outcomes: &AHashMap<UnitKey, Outcome>) -> Report {
    let mut sections: Vec<TargetReport> = plan
        .targets()
        .iter()
        .map(|t| TargetReport {
            identity: t.identity.clone(),
            mode: t.mode,
            commands: Vec::new(),
        })
        .collect();
    let positions: AHashMap<&str, usize> = plan
        .targets()
        .iter()
        .enumerate()
        .map(|(idx, t)| (t.identity.as_str(), idx))
        .collect();

    for unit in plan.units() {
        let outcome = outcomes.get(&unit.key()).cloned().unwrap_or_else(|| {
            Outcome::failure(
                ErrorKind::Execution,
                "unit produced no outcome",
                Duration::ZERO,
            )
        });
        if let Some(&idx) = positions.get(unit.target_identity.as_str()) {
            sections[idx]
                .commands
                .push((unit.command_name.clone(), outcome));
        }
    }

    Report::new(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommandSet, Target};
    use pretty_assertions::assert_eq;

    fn plan() -> ExecutionPlan {
        let targets = vec![Target::ssh("b"), Target::Local, Target::docker("a")];
        let commands = CommandSet::new()
            .universal("zeta", "echo z")
            .universal("alpha", "echo a");
        ExecutionPlan::build(&targets, &commands).unwrap()
    }

    fn outcomes(plan: &ExecutionPlan) -> AHashMap<UnitKey, Outcome> {
        plan.units()
            .iter()
            .rev()
            .map(|u| {
                (
                    u.key(),
                    Outcome::success(u.command_name.clone(), Duration::from_millis(3)),
                )
            })
            .collect()
    }

    #[test]
    fn test_order_follows_plan() {
        let plan = plan();
        let report = aggregate(&plan, &outcomes(&plan));

        let order: Vec<(&str, &str)> = report.entries().map(|(t, c, _)| (t, c)).collect();
        assert_eq!(
            order,
            vec![
                ("ssh|b", "zeta"),
                ("ssh|b", "alpha"),
                ("local", "zeta"),
                ("local", "alpha"),
                ("docker|a", "zeta"),
                ("docker|a", "alpha"),
            ]
        );
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let plan = plan();
        let outcomes = outcomes(&plan);
        let first = serde_json::to_string(&aggregate(&plan, &outcomes)).unwrap();
        let second = serde_json::to_string(&aggregate(&plan, &outcomes)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_outcome_is_filled() {
        let plan = plan();
        let mut outcomes = outcomes(&plan);
        outcomes.remove(&("local".to_string(), "alpha".to_string()));

        let report = aggregate(&plan, &outcomes);
        assert_eq!(report.len(), plan.len());
        assert_eq!(
            report.get("local", "alpha").and_then(Outcome::error_kind),
            Some(ErrorKind::Execution)
        );
    }

    #[test]
    fn test_orphan_outcome_ignored() {
        let plan = plan();
        let mut outcomes = outcomes(&plan);
        outcomes.insert(
            ("ssh|ghost".to_string(), "zeta".to_string()),
            Outcome::timeout(Duration::from_secs(1)),
        );

        let report = aggregate(&plan, &outcomes);
        assert_eq!(report.len(), plan.len());
        assert!(report.target("ssh|ghost").is_none());
    }
}
