//! JSON rendering of reports

use fleetscope::Report;
use serde_json::{Map, Value};

/// Top-level key of the cluster summary
pub const CLUSTER_INFO_KEY: &str = "kubernetes_cluster_info";

/// How a report is rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Indent the output
    pub pretty: bool,
    /// Embed JSON command output as JSON and split other output into lines
    pub structured: bool,
}

/// Turns raw command output into a JSON value
fn structure(output: &str) -> Value {
    serde_json::from_str(output).unwrap_or_else(|_| {
        let trimmed = output.trim();
        if trimmed.is_empty() {
            return Value::Array(Vec::new());
        }
        Value::Array(
            trimmed
                .lines()
                .map(|line| Value::String(line.trim().to_string()))
                .collect(),
        )
    })
}

/// Serializes `report` in target and command order
///
/// A cluster summary, when given, comes first under [`CLUSTER_INFO_KEY`].
pub fn render_json(
    report: &Report,
    cluster_info: Option<Value>,
    options: RenderOptions,
) -> serde_json::Result<String> {
    let mut value = serde_json::to_value(report)?;

    if options.structured {
        let outcomes = value
            .as_object_mut()
            .into_iter()
            .flat_map(|targets| targets.values_mut())
            .filter_map(Value::as_object_mut)
            .flat_map(|commands| commands.values_mut());
        for outcome in outcomes {
            if let Some(Value::String(raw)) = outcome.get("output") {
                let structured = structure(raw);
                outcome["output"] = structured;
            }
        }
    }

    if let Some(info) = cluster_info {
        let mut document = Map::new();
        document.insert(CLUSTER_INFO_KEY.to_string(), info);
        if let Value::Object(mut targets) = value {
            document.append(&mut targets);
        }
        value = Value::Object(document);
    }

    if options.pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetscope::{ErrorKind, Outcome, TargetMode, TargetReport};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn report() -> Report {
        Report::new(vec![
            TargetReport {
                identity: "ssh|db-1".to_string(),
                mode: TargetMode::Ssh,
                commands: vec![
                    (
                        "report".to_string(),
                        Outcome::success(r#"{"version": "2.7.3"}"#, Duration::from_millis(12)),
                    ),
                    (
                        "ver".to_string(),
                        Outcome::failure(ErrorKind::Transport, "connection refused", Duration::from_millis(3)),
                    ),
                ],
            },
            TargetReport {
                identity: "local".to_string(),
                mode: TargetMode::Local,
                commands: vec![(
                    "pkgs".to_string(),
                    Outcome::success("airflow==2.7.3\n  celery==5.3.4 ", Duration::from_millis(40)),
                )],
            },
        ])
    }

    #[test]
    fn test_plain_render_keeps_order() {
        let rendered = render_json(&report(), None, RenderOptions::default()).unwrap();
        let ssh = rendered.find("ssh|db-1").unwrap();
        let local = rendered.find("\"local\"").unwrap();
        assert!(ssh < local);
        assert!(rendered.find("\"report\"").unwrap() < rendered.find("\"ver\"").unwrap());
    }

    #[test]
    fn test_plain_render_shape() {
        let rendered = render_json(&report(), None, RenderOptions::default()).unwrap();
        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(
            value["ssh|db-1"]["ver"],
            json!({
                "status": "error",
                "error": "connection refused",
                "error_kind": "transport",
                "duration_ms": 3
            })
        );
        assert_eq!(value["ssh|db-1"]["report"]["output"], json!(r#"{"version": "2.7.3"}"#));
    }

    #[test]
    fn test_structured_render() {
        let options = RenderOptions {
            pretty: true,
            structured: true,
        };
        let rendered = render_json(&report(), None, options).unwrap();
        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["ssh|db-1"]["report"]["output"], json!({"version": "2.7.3"}));
        assert_eq!(
            value["local"]["pkgs"]["output"],
            json!(["airflow==2.7.3", "celery==5.3.4"])
        );
        assert!(rendered.contains('\n'));
    }

    #[test]
    fn test_cluster_info_comes_first() {
        let info = json!({"version": "v1.29.0", "provider": null});
        let rendered = render_json(&report(), Some(info.clone()), RenderOptions::default()).unwrap();
        assert!(rendered.starts_with(&format!("{{\"{CLUSTER_INFO_KEY}\"")));

        let value: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value[CLUSTER_INFO_KEY], info);
        assert_eq!(value["local"]["pkgs"]["status"], json!("ok"));
    }

    #[test]
    fn test_structure_empty_output() {
        assert_eq!(structure("  \n"), json!([]));
    }
}
