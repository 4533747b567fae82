//! The recording scope: a patch-capturing proxy over a tree's document.
//!
//! Every mutation made through the scope is applied immediately and
//! captured as a forward patch plus its inverse, so the enclosing action
//! can be reported to the container or rolled back without any further
//! context.

use serde_json::Value;

use crate::json_patch::apply::{apply_add, apply_remove, apply_replace};
use crate::json_patch::pointer::{self, parse_json_pointer, Path};
use crate::json_patch::{Op, PatchError};

pub struct ActionScope<'a> {
    doc: &'a mut Value,
    patches: Vec<Op>,
    inverse_patches: Vec<Op>,
}

impl<'a> ActionScope<'a> {
    pub(crate) fn new(doc: &'a mut Value) -> Self {
        Self {
            doc,
            patches: Vec::new(),
            inverse_patches: Vec::new(),
        }
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    /// The whole document.
    pub fn document(&self) -> &Value {
        self.doc
    }

    /// The value at a JSON Pointer, if present.
    pub fn get(&self, pointer_str: &str) -> Option<&Value> {
        pointer::get(self.doc, &parse_json_pointer(pointer_str))
    }

    pub(crate) fn get_path(&self, path: &[String]) -> Option<&Value> {
        pointer::get(self.doc, path)
    }

    // ── Recorded mutations ────────────────────────────────────────────────

    pub fn add(&mut self, pointer_str: &str, value: Value) -> Result<(), PatchError> {
        self.add_path(parse_json_pointer(pointer_str), value)
    }

    pub fn remove(&mut self, pointer_str: &str) -> Result<(), PatchError> {
        self.remove_path(parse_json_pointer(pointer_str))
    }

    pub fn replace(&mut self, pointer_str: &str, value: Value) -> Result<(), PatchError> {
        self.replace_path(parse_json_pointer(pointer_str), value)
    }

    pub(crate) fn add_path(&mut self, mut path: Path, value: Value) -> Result<(), PatchError> {
        // Resolve array-append to a concrete index so the recorded patch
        // and its inverse point at a real position.
        if path.last().map(String::as_str) == Some("-") {
            if let Some(Value::Array(arr)) = pointer::get(self.doc, &path[..path.len() - 1]) {
                let index = arr.len().to_string();
                if let Some(last) = path.last_mut() {
                    *last = index;
                }
            }
        }
        let old = apply_add(self.doc, &path, value.clone())?;
        let inverse = match old {
            Some(old_value) => Op::Replace {
                path: path.clone(),
                value: old_value,
                old_value: Some(value.clone()),
            },
            None => Op::Remove {
                path: path.clone(),
                old_value: Some(value.clone()),
            },
        };
        self.patches.push(Op::Add { path, value });
        self.inverse_patches.push(inverse);
        Ok(())
    }

    pub(crate) fn remove_path(&mut self, path: Path) -> Result<(), PatchError> {
        let old = apply_remove(self.doc, &path)?;
        self.patches.push(Op::Remove {
            path: path.clone(),
            old_value: Some(old.clone()),
        });
        self.inverse_patches.push(Op::Add { path, value: old });
        Ok(())
    }

    pub(crate) fn replace_path(&mut self, path: Path, value: Value) -> Result<(), PatchError> {
        let old = apply_replace(self.doc, &path, value.clone())?;
        self.patches.push(Op::Replace {
            path: path.clone(),
            value: value.clone(),
            old_value: Some(old.clone()),
        });
        self.inverse_patches.push(Op::Replace {
            path,
            value: old,
            old_value: Some(value),
        });
        Ok(())
    }

    /// Apply an already-built operation through the recorder.
    pub(crate) fn apply_op(&mut self, op: &Op) -> Result<(), PatchError> {
        match op {
            Op::Add { path, value } => self.add_path(path.clone(), value.clone()),
            Op::Remove { path, .. } => self.remove_path(path.clone()),
            Op::Replace { path, value, .. } => self.replace_path(path.clone(), value.clone()),
        }
    }

    /// Consume the scope, releasing the captured forward and inverse
    /// patch sequences (both in application order).
    pub(crate) fn into_parts(self) -> (Vec<Op>, Vec<Op>) {
        (self.patches, self.inverse_patches)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
