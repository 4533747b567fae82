//! Core types for the JSON Patch module.
//!
//! The operation set is the RFC 6902 subset used as the wire format for
//! recorded patches: `add`, `remove`, `replace`. Mutating operations carry
//! the displaced value (`old_value`) so a recorded patch is invertible and
//! self-describing once persisted in a ledger.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

pub use super::pointer::Path;

// ── Error ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum PatchError {
    #[error("NOT_FOUND")]
    NotFound,
    #[error("INVALID_INDEX")]
    InvalidIndex,
    #[error("INVALID_TARGET")]
    InvalidTarget,
    #[error("INVALID_OP: {0}")]
    InvalidOp(String),
}

// ── Op enum ───────────────────────────────────────────────────────────────

/// A structural-diff operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Add {
        path: Path,
        value: Value,
    },
    Remove {
        path: Path,
        old_value: Option<Value>,
    },
    Replace {
        path: Path,
        value: Value,
        old_value: Option<Value>,
    },
}

impl Op {
    /// Returns the operation name string.
    pub fn op_name(&self) -> &'static str {
        match self {
            Op::Add { .. } => "add",
            Op::Remove { .. } => "remove",
            Op::Replace { .. } => "replace",
        }
    }

    /// Returns the path of the operation.
    pub fn path(&self) -> &Path {
        match self {
            Op::Add { path, .. } => path,
            Op::Remove { path, .. } => path,
            Op::Replace { path, .. } => path,
        }
    }
}

impl Serialize for Op {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        super::codec::to_json(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Op {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        super::codec::from_json(&value).map_err(D::Error::custom)
    }
}
