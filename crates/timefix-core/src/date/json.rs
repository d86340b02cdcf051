use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::FixError;

/// A parsed sidecar record. Only `photoTakenTime` is ever looked at.
pub type Record = Map<String, Value>;

/// Read and parse one Google JSON sidecar. The top level must be an object.
pub fn read_record(json_dir: &Path, name: &str) -> Result<Record, FixError> {
    let bytes = fs::read(json_dir.join(name)).map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            FixError::RecordNotFound(name.to_string())
        } else {
            FixError::RecordUnreadable {
                name: name.to_string(),
                source,
            }
        }
    })?;

    let data: Value = serde_json::from_slice(&bytes).map_err(|e| FixError::RecordMalformed {
        name: name.to_string(),
        reason: e.to_string(),
    })?;

    match data {
        Value::Object(map) => Ok(map),
        other => Err(FixError::RecordMalformed {
            name: name.to_string(),
            reason: format!("top level is {}, not an object", json_kind(&other)),
        }),
    }
}

/// Raw `photoTakenTime.timestamp` value. Google writes it as a string, but an
/// integer is accepted too. Empty strings count as absent.
pub fn photo_taken_timestamp(record: &Record) -> Option<String> {
    let ts = record.get("photoTakenTime")?.as_object()?.get("timestamp")?;
    match ts {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => n.as_i64().map(|v| v.to_string()),
        _ => None,
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn obj(v: Value) -> Record {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn test_photo_taken_timestamp() {
        let r = obj(json!({"title": "a.jpg", "photoTakenTime": {"timestamp": "1609459200", "formatted": "x"}}));
        assert_eq!(photo_taken_timestamp(&r).as_deref(), Some("1609459200"));

        let r = obj(json!({"photoTakenTime": {"timestamp": 1609459200}}));
        assert_eq!(photo_taken_timestamp(&r).as_deref(), Some("1609459200"));

        assert!(photo_taken_timestamp(&obj(json!({"creationTime": {"timestamp": "1"}}))).is_none());
        assert!(photo_taken_timestamp(&obj(json!({"photoTakenTime": "1609459200"}))).is_none());
        assert!(photo_taken_timestamp(&obj(json!({"photoTakenTime": {}}))).is_none());
        assert!(photo_taken_timestamp(&obj(json!({"photoTakenTime": {"timestamp": ""}}))).is_none());
    }

    #[test]
    fn test_read_record_errors() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("ok.jpg.json"), br#"{"photoTakenTime": {"timestamp": "5"}}"#).unwrap();
        fs::write(dir.path().join("bad.jpg.json"), b"{not json").unwrap();
        fs::write(dir.path().join("list.jpg.json"), b"[1, 2]").unwrap();

        assert!(read_record(dir.path(), "ok.jpg.json").is_ok());
        assert!(matches!(
            read_record(dir.path(), "bad.jpg.json"),
            Err(FixError::RecordMalformed { .. })
        ));
        assert!(matches!(
            read_record(dir.path(), "list.jpg.json"),
            Err(FixError::RecordMalformed { ref reason, .. }) if reason.contains("array")
        ));
        assert!(matches!(
            read_record(dir.path(), "gone.jpg.json"),
            Err(FixError::RecordNotFound(_))
        ));
    }
}
