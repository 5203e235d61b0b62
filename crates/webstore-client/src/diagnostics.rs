//! Development-mode change reports.

use serde::Serialize;
use serde_json::Value;
use tracing::info;

/// Document-level summary of one applied batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocChangeReport {
    pub collection: String,
    pub doc_id: String,
    pub action_name: String,
    pub before: Value,
    pub after: Value,
    pub operations: Vec<Value>,
}

impl DocChangeReport {
    /// Build a report from the `changes` list of an `onChangeDocDevMode`
    /// push. The last entry describes the whole document; the ones before
    /// it are the individual operations. Returns `None` for an empty list.
    pub fn from_changes(
        collection: &str,
        doc_id: &str,
        action_name: Option<&str>,
        changes: &[Value],
    ) -> Option<Self> {
        let (whole, operations) = changes.split_last()?;
        Some(Self {
            collection: collection.to_string(),
            doc_id: doc_id.to_string(),
            action_name: action_name.unwrap_or("SET").to_string(),
            before: strip_bookkeeping(whole.get("before")),
            after: strip_bookkeeping(whole.get("op").and_then(|op| op.get("value"))),
            operations: operations
                .iter()
                .map(|change| change.get("op").cloned().unwrap_or(Value::Null))
                .collect(),
        })
    }
}

fn strip_bookkeeping(value: Option<&Value>) -> Value {
    let mut value = value.cloned().unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        let _ = map.remove("_id");
        let _ = map.remove("_rev");
    }
    value
}

/// Receives change reports while development mode is on.
pub trait DiagnosticsSink: Send + Sync {
    fn report(&self, report: &DocChangeReport);
}

/// Default sink: one `info!` event per report.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn report(&self, report: &DocChangeReport) {
        let operations = Value::Array(report.operations.clone());
        info!(
            target: "webstore::devmode",
            action = %report.action_name,
            collection = %report.collection,
            doc_id = %report.doc_id,
            before = %report.before,
            operations = %operations,
            after = %report.after,
            "document changed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn report_splits_whole_doc_entry_from_operations() {
        let changes = vec![
            json!({"op": {"type": "SET", "path": "$.name", "value": "sun"}, "before": "moon"}),
            json!({"op": {"type": "DELETE", "path": "$.tmp"}, "before": 1}),
            json!({
                "op": {"type": "SET", "path": "$", "value": {"_id": "d", "_rev": "2", "name": "sun"}},
                "before": {"_id": "d", "_rev": "1", "name": "moon", "tmp": 1},
            }),
        ];
        let report = DocChangeReport::from_changes("c", "d", Some("rename"), &changes).unwrap();

        assert_eq!(report.action_name, "rename");
        assert_eq!(report.before, json!({"name": "moon", "tmp": 1}));
        assert_eq!(report.after, json!({"name": "sun"}));
        assert_eq!(
            report.operations,
            vec![
                json!({"type": "SET", "path": "$.name", "value": "sun"}),
                json!({"type": "DELETE", "path": "$.tmp"}),
            ]
        );
    }

    #[test]
    fn missing_action_reads_as_set() {
        let changes = vec![json!({"op": {"type": "SET", "path": "$", "value": 1}, "before": null})];
        let report = DocChangeReport::from_changes("c", "d", None, &changes).unwrap();
        assert_eq!(report.action_name, "SET");
        assert_eq!(report.before, Value::Null);
        assert_eq!(report.after, json!(1));
        assert!(report.operations.is_empty());
    }

    #[test]
    fn tracing_sink_logs_report() {
        let changes = vec![
            json!({"op": {"type": "DELETE", "path": "$.tmp"}, "before": 1}),
            json!({"op": {"type": "SET", "path": "$", "value": {}}, "before": {"tmp": 1}}),
        ];
        let report = DocChangeReport::from_changes("c", "d", Some("trim"), &changes).unwrap();
        TracingSink.report(&report);
        assert_eq!(report.operations.len(), 1);
    }

    #[test]
    fn empty_changes_produce_no_report() {
        assert!(DocChangeReport::from_changes("c", "d", None, &[]).is_none());
    }

    #[test]
    fn report_serializes_camel_case() {
        let changes = vec![json!({"op": {"value": {}}, "before": {}})];
        let report = DocChangeReport::from_changes("c", "d", None, &changes).unwrap();
        let wire = serde_json::to_value(&report).unwrap();
        assert_eq!(wire["docId"], json!("d"));
        assert_eq!(wire["actionName"], json!("SET"));
    }
}
