use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::JsonPath;

/// One path-scoped step of an operation batch.
///
/// `MOVE` reuses the `path`/`value` wire fields for source and destination.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocOp {
    Set {
        path: JsonPath,
        #[serde(default)]
        value: Value,
    },
    SetDate {
        path: JsonPath,
    },
    Get {
        path: JsonPath,
    },
    Move {
        #[serde(rename = "path")]
        from: JsonPath,
        #[serde(rename = "value")]
        to: JsonPath,
    },
    Delete {
        path: JsonPath,
    },
}

impl DocOp {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Set { .. } => "SET",
            Self::SetDate { .. } => "SET_DATE",
            Self::Get { .. } => "GET",
            Self::Move { .. } => "MOVE",
            Self::Delete { .. } => "DELETE",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Get { .. })
    }

    /// Primary path of the operation (the source for `MOVE`).
    pub fn path(&self) -> &JsonPath {
        match self {
            Self::Set { path, .. }
            | Self::SetDate { path }
            | Self::Get { path }
            | Self::Delete { path } => path,
            Self::Move { from, .. } => from,
        }
    }

    /// Every path whose contents this operation may change.
    pub fn touched_paths(&self) -> Vec<&JsonPath> {
        match self {
            Self::Get { .. } => Vec::new(),
            Self::Move { from, to } => vec![from, to],
            other => vec![other.path()],
        }
    }
}

/// Timestamp format stored by `SET_DATE`: RFC 3339, millisecond precision, `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn p(s: &str) -> JsonPath {
        JsonPath::parse(s).unwrap()
    }

    #[test]
    fn wire_shapes() {
        let ops = vec![
            DocOp::Set { path: p("$.name"), value: json!("moon") },
            DocOp::SetDate { path: p("$.updated") },
            DocOp::Get { path: p("$") },
            DocOp::Move { from: p("$.name"), to: p("$.newName") },
            DocOp::Delete { path: p("$.list[0]") },
        ];
        assert_eq!(
            serde_json::to_value(&ops).unwrap(),
            json!([
                {"type": "SET", "path": "$.name", "value": "moon"},
                {"type": "SET_DATE", "path": "$.updated"},
                {"type": "GET", "path": "$"},
                {"type": "MOVE", "path": "$.name", "value": "$.newName"},
                {"type": "DELETE", "path": "$.list[0]"},
            ])
        );
    }

    #[test]
    fn parse_from_wire() {
        let op: DocOp =
            serde_json::from_value(json!({"type": "MOVE", "path": "$.a", "value": "$['b']"})).unwrap();
        assert_eq!(op, DocOp::Move { from: p("$.a"), to: p("$.b") });

        let set: DocOp = serde_json::from_value(json!({"type": "SET", "path": "$.a"})).unwrap();
        assert_eq!(set, DocOp::Set { path: p("$.a"), value: Value::Null });
    }

    #[test]
    fn rejects_bad_path_and_type() {
        assert!(serde_json::from_value::<DocOp>(json!({"type": "GET", "path": "$..a"})).is_err());
        assert!(serde_json::from_value::<DocOp>(json!({"type": "PATCH", "path": "$.a"})).is_err());
    }

    #[test]
    fn touched_paths_by_kind() {
        let mv = DocOp::Move { from: p("$.a"), to: p("$.b") };
        assert_eq!(mv.touched_paths(), vec![&p("$.a"), &p("$.b")]);
        assert!(DocOp::Get { path: p("$.a") }.touched_paths().is_empty());
        assert!(!DocOp::Get { path: p("$.a") }.is_mutation());
        assert!(DocOp::Delete { path: p("$.a") }.is_mutation());
        assert_eq!(DocOp::SetDate { path: p("$.a") }.kind(), "SET_DATE");
    }

    #[test]
    fn timestamp_has_millis_and_zulu() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        assert_eq!(format_timestamp(at), "2024-03-05T07:08:09.000Z");
        assert!(timestamp_now().ends_with('Z'));
    }
}
