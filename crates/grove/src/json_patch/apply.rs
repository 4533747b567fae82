//! JSON Patch apply logic.
//!
//! All applicators mutate the document in place and return the value that
//! was displaced, which is what inverse-patch construction needs.

use serde_json::Value;

use super::pointer::get_mut;
use super::types::{Op, PatchError};

// ── Individual operation applicators ─────────────────────────────────────

pub(crate) fn apply_add(
    doc: &mut Value,
    path: &[String],
    value: Value,
) -> Result<Option<Value>, PatchError> {
    if path.is_empty() {
        let old = std::mem::replace(doc, value);
        return Ok(Some(old));
    }
    let (parent_path, key) = path.split_at(path.len() - 1);
    let key = &key[0];
    let parent = get_mut(doc, parent_path).ok_or(PatchError::NotFound)?;
    match parent {
        Value::Object(map) => {
            let old = map.insert(key.clone(), value);
            Ok(old)
        }
        Value::Array(arr) => {
            if key == "-" {
                arr.push(value);
                Ok(None)
            } else {
                let idx: usize = key.parse().map_err(|_| PatchError::InvalidIndex)?;
                if idx > arr.len() {
                    return Err(PatchError::InvalidIndex);
                }
                arr.insert(idx, value);
                Ok(None)
            }
        }
        _ => Err(PatchError::InvalidTarget),
    }
}

pub(crate) fn apply_remove(doc: &mut Value, path: &[String]) -> Result<Value, PatchError> {
    if path.is_empty() {
        return Err(PatchError::InvalidTarget);
    }
    let (parent_path, key) = path.split_at(path.len() - 1);
    let key = &key[0];
    let parent = get_mut(doc, parent_path).ok_or(PatchError::NotFound)?;
    match parent {
        Value::Object(map) => map.remove(key).ok_or(PatchError::NotFound),
        Value::Array(arr) => {
            let idx: usize = key.parse().map_err(|_| PatchError::InvalidIndex)?;
            if idx >= arr.len() {
                return Err(PatchError::NotFound);
            }
            Ok(arr.remove(idx))
        }
        _ => Err(PatchError::InvalidTarget),
    }
}

pub(crate) fn apply_replace(
    doc: &mut Value,
    path: &[String],
    value: Value,
) -> Result<Value, PatchError> {
    if path.is_empty() {
        return Ok(std::mem::replace(doc, value));
    }
    let target = get_mut(doc, path).ok_or(PatchError::NotFound)?;
    Ok(std::mem::replace(target, value))
}

// ── Main apply functions ──────────────────────────────────────────────────

/// Apply a single operation to the document (in-place mutation).
///
/// Returns the value displaced at the path, if any.
pub fn apply_op(doc: &mut Value, op: &Op) -> Result<Option<Value>, PatchError> {
    match op {
        Op::Add { path, value } => apply_add(doc, path, value.clone()),
        Op::Remove { path, .. } => apply_remove(doc, path).map(Some),
        Op::Replace { path, value, .. } => apply_replace(doc, path, value.clone()).map(Some),
    }
}

/// Apply a sequence of operations in order, returning the final document.
pub fn apply_ops(mut doc: Value, ops: &[Op]) -> Result<Value, PatchError> {
    for op in ops {
        apply_op(&mut doc, op)?;
    }
    Ok(doc)
}

// ── Tests ─────────────────────────────────────────────────────────────────
