//! JSON codec for patch operations.
//!
//! Converts operations to/from `serde_json::Value` in RFC 6902 format with
//! a slash-delimited `path` string. The displaced value rides along as
//! `oldValue` so persisted patches stay invertible.

use serde_json::{json, Value};

use super::pointer::{format_json_pointer, parse_json_pointer, Path};
use super::types::{Op, PatchError};

fn encode_path(path: &[String]) -> Value {
    Value::String(format_json_pointer(path))
}

fn decode_path(v: &Value) -> Result<Path, PatchError> {
    let s = v
        .as_str()
        .ok_or_else(|| PatchError::InvalidOp("path must be a string".into()))?;
    Ok(parse_json_pointer(s))
}

// ── Serialization ─────────────────────────────────────────────────────────

/// Serialize an `Op` to a `serde_json::Value` in the JSON Patch format.
pub fn to_json(op: &Op) -> Value {
    match op {
        Op::Add { path, value } => json!({
            "op": "add",
            "path": encode_path(path),
            "value": value
        }),
        Op::Remove { path, old_value } => {
            let mut m = serde_json::Map::new();
            m.insert("op".into(), json!("remove"));
            m.insert("path".into(), encode_path(path));
            if let Some(ov) = old_value {
                m.insert("oldValue".into(), ov.clone());
            }
            Value::Object(m)
        }
        Op::Replace { path, value, old_value } => {
            let mut m = serde_json::Map::new();
            m.insert("op".into(), json!("replace"));
            m.insert("path".into(), encode_path(path));
            m.insert("value".into(), value.clone());
            if let Some(ov) = old_value {
                m.insert("oldValue".into(), ov.clone());
            }
            Value::Object(m)
        }
    }
}

/// Serialize a full patch (list of operations).
pub fn to_json_patch(ops: &[Op]) -> Value {
    Value::Array(ops.iter().map(to_json).collect())
}

// ── Deserialization ───────────────────────────────────────────────────────

/// Deserialize an `Op` from its JSON Patch form.
pub fn from_json(value: &Value) -> Result<Op, PatchError> {
    let obj = value
        .as_object()
        .ok_or_else(|| PatchError::InvalidOp("op must be an object".into()))?;
    let op_name = obj
        .get("op")
        .and_then(Value::as_str)
        .ok_or_else(|| PatchError::InvalidOp("missing op name".into()))?;
    let path = decode_path(
        obj.get("path")
            .ok_or_else(|| PatchError::InvalidOp("missing path".into()))?,
    )?;
    match op_name {
        "add" => Ok(Op::Add {
            path,
            value: obj
                .get("value")
                .cloned()
                .ok_or_else(|| PatchError::InvalidOp("add requires value".into()))?,
        }),
        "remove" => Ok(Op::Remove {
            path,
            old_value: obj.get("oldValue").cloned(),
        }),
        "replace" => Ok(Op::Replace {
            path,
            value: obj
                .get("value")
                .cloned()
                .ok_or_else(|| PatchError::InvalidOp("replace requires value".into()))?,
            old_value: obj.get("oldValue").cloned(),
        }),
        other => Err(PatchError::InvalidOp(format!("unknown op: {other}"))),
    }
}

/// Deserialize a full patch (list of operations).
pub fn from_json_patch(value: &Value) -> Result<Vec<Op>, PatchError> {
    let arr = value
        .as_array()
        .ok_or_else(|| PatchError::InvalidOp("patch must be an array".into()))?;
    arr.iter().map(from_json).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_patch::pointer::parse_json_pointer;
    use serde_json::json;

    #[test]
    fn encode_add() {
        let op = Op::Add { path: parse_json_pointer("/a/b"), value: json!(1) };
        assert_eq!(to_json(&op), json!({"op": "add", "path": "/a/b", "value": 1}));
    }

    #[test]
    fn encode_remove_with_old_value() {
        let op = Op::Remove { path: parse_json_pointer("/a"), old_value: Some(json!(5)) };
        assert_eq!(
            to_json(&op),
            json!({"op": "remove", "path": "/a", "oldValue": 5})
        );
    }

    #[test]
    fn decode_replace() {
        let v = json!({"op": "replace", "path": "/x", "value": 2, "oldValue": 1});
        let op = from_json(&v).unwrap();
        assert_eq!(
            op,
            Op::Replace {
                path: parse_json_pointer("/x"),
                value: json!(2),
                old_value: Some(json!(1)),
            }
        );
    }

    #[test]
    fn roundtrip_patch() {
        let ops = vec![
            Op::Add { path: parse_json_pointer("/a"), value: json!({"x": 1}) },
            Op::Remove { path: parse_json_pointer("/b/0"), old_value: Some(json!("gone")) },
            Op::Replace {
                path: parse_json_pointer("/c~1d"),
                value: json!(true),
                old_value: None,
            },
        ];
        let encoded = to_json_patch(&ops);
        let decoded = from_json_patch(&encoded).unwrap();
        assert_eq!(decoded, ops);
    }

    #[test]
    fn reject_unknown_op() {
        let v = json!({"op": "move", "path": "/a", "from": "/b"});
        assert!(matches!(from_json(&v), Err(PatchError::InvalidOp(_))));
    }

    #[test]
    fn serde_impls_delegate_to_codec() {
        let op = Op::Add { path: parse_json_pointer("/a"), value: json!(1) };
        let s = serde_json::to_string(&op).unwrap();
        let back: Op = serde_json::from_str(&s).unwrap();
        assert_eq!(back, op);
    }
}
