//! Patch records and history entries.
//!
//! A `PatchRecord` is the atomic unit of recorded change: one top-level
//! action's forward and inverse patches on one tree. A `HistoryEntry`
//! aggregates every record produced across all trees by one logical
//! action, and tracks completion by open-call counting: the entry is
//! `Complete` exactly when its last open call closes, and is immutable
//! from then on.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::json_patch::Op;

/// Stable identifier of a tree within a document.
pub type TreeId = String;

/// Tree id used for entries originated by the container itself
/// (undo, redo, replay).
pub const CONTAINER_TREE_ID: &str = "container";

// ── Error ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("history entry {0} is already complete")]
    EntryComplete(Uuid),
    #[error("call {call} is already open on history entry {entry}")]
    CallAlreadyOpen { entry: Uuid, call: Uuid },
    #[error("call {call} is not open on history entry {entry}")]
    CallNotOpen { entry: Uuid, call: Uuid },
    #[error("unknown history entry {0}")]
    UnknownEntry(Uuid),
    #[error("history references unknown tree {0}")]
    UnknownTree(TreeId),
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
}

// ── Patch record ──────────────────────────────────────────────────────────

/// Direction of a history replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOperation {
    Undo,
    Redo,
}

/// The forward and inverse patches one action produced on one tree.
///
/// Applying `patches` and then `inverse_patches` in reverse order to the
/// same starting state is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRecord {
    pub tree: TreeId,
    pub action: String,
    pub patches: Vec<Op>,
    #[serde(rename = "inversePatches")]
    pub inverse_patches: Vec<Op>,
}

impl PatchRecord {
    /// A record with no patches. Still closes its call when reported.
    pub fn empty(tree: impl Into<TreeId>, action: impl Into<String>) -> Self {
        Self {
            tree: tree.into(),
            action: action.into(),
            patches: vec![],
            inverse_patches: vec![],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty() && self.inverse_patches.is_empty()
    }

    /// Patches to apply for the given replay direction.
    ///
    /// Undo uses the inverse patches in reverse order: individual
    /// structural patches are not commutative, so inverting a sequence
    /// requires inverting the order too.
    pub fn patches_for(&self, op: HistoryOperation) -> Vec<Op> {
        match op {
            HistoryOperation::Undo => self.inverse_patches.iter().rev().cloned().collect(),
            HistoryOperation::Redo => self.patches.clone(),
        }
    }
}

// ── History entry ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Recording,
    Complete,
}

/// One logical user or system action, aggregated across all trees.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: Uuid,
    /// Originating tree.
    pub tree: TreeId,
    pub action: String,
    pub undoable: bool,
    pub records: Vec<PatchRecord>,
    /// Call ids opened against this entry and not yet closed.
    /// Runtime-only, never persisted.
    pub open_calls: BTreeSet<Uuid>,
    /// Runtime-only, never persisted.
    pub state: EntryState,
}

impl HistoryEntry {
    pub fn new(id: Uuid, tree: impl Into<TreeId>, action: impl Into<String>, undoable: bool) -> Self {
        Self {
            id,
            tree: tree.into(),
            action: action.into(),
            undoable,
            records: vec![],
            open_calls: BTreeSet::new(),
            state: EntryState::Recording,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == EntryState::Complete
    }

    /// True if any record actually carries patches; entries whose records
    /// are all empty have no replayable effect.
    pub fn has_patches(&self) -> bool {
        self.records.iter().any(|r| !r.is_empty())
    }

    /// Open a call against this entry.
    pub fn open_call(&mut self, call: Uuid) -> Result<(), ProtocolError> {
        if self.is_complete() {
            return Err(ProtocolError::EntryComplete(self.id));
        }
        if !self.open_calls.insert(call) {
            return Err(ProtocolError::CallAlreadyOpen { entry: self.id, call });
        }
        Ok(())
    }

    /// Append a record and close the named call. Flips the entry to
    /// `Complete` when the last open call closes.
    pub fn close_call(&mut self, call: Uuid, record: PatchRecord) -> Result<(), ProtocolError> {
        if self.is_complete() {
            return Err(ProtocolError::EntryComplete(self.id));
        }
        if !self.open_calls.remove(&call) {
            return Err(ProtocolError::CallNotOpen { entry: self.id, call });
        }
        self.records.push(record);
        if self.open_calls.is_empty() {
            self.state = EntryState::Complete;
        }
        Ok(())
    }
}

// ── Persisted forms ───────────────────────────────────────────────────────

/// Serialized form of a history entry: `open_calls` and `state` are
/// runtime bookkeeping and are not part of the persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntrySnapshot {
    pub id: Uuid,
    pub tree: TreeId,
    pub action: String,
    pub undoable: bool,
    pub records: Vec<PatchRecord>,
}

impl From<&HistoryEntry> for HistoryEntrySnapshot {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            id: entry.id,
            tree: entry.tree.clone(),
            action: entry.action.clone(),
            undoable: entry.undoable,
            records: entry.records.clone(),
        }
    }
}

impl From<HistoryEntrySnapshot> for HistoryEntry {
    /// Loaded entries are complete by construction: a persisted document
    /// only contains finished work.
    fn from(snapshot: HistoryEntrySnapshot) -> Self {
        Self {
            id: snapshot.id,
            tree: snapshot.tree,
            action: snapshot.action,
            undoable: snapshot.undoable,
            records: snapshot.records,
            open_calls: BTreeSet::new(),
            state: EntryState::Complete,
        }
    }
}

/// The persisted document: an ordered list of history entries.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub history: Vec<HistoryEntrySnapshot>,
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::json_patch::apply::apply_ops;
    use serde_json::json;

    fn record_with_patches() -> PatchRecord {
        PatchRecord {
            tree: "t1".into(),
            action: "addNode".into(),
            patches: vec![
                Op::Add { path: vec!["a".into()], value: json!(1) },
                Op::Replace { path: vec!["a".into()], value: json!(2), old_value: Some(json!(1)) },
            ],
            inverse_patches: vec![
                Op::Remove { path: vec!["a".into()], old_value: Some(json!(1)) },
                Op::Replace { path: vec!["a".into()], value: json!(1), old_value: Some(json!(2)) },
            ],
        }
    }

    #[test]
    fn patch_roundtrip_is_noop() {
        let record = record_with_patches();
        let start = json!({});
        let forward = apply_ops(start.clone(), &record.patches).unwrap();
        let back = apply_ops(forward, &record.patches_for(HistoryOperation::Undo)).unwrap();
        assert_eq!(back, start);
    }

    #[test]
    fn entry_completes_when_last_call_closes() {
        let mut entry = HistoryEntry::new(Uuid::new_v4(), "t1", "addNode", true);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        entry.open_call(a).unwrap();
        entry.open_call(b).unwrap();
        entry.close_call(b, PatchRecord::empty("t2", "x")).unwrap();
        assert_eq!(entry.state, EntryState::Recording);
        entry.close_call(a, record_with_patches()).unwrap();
        assert_eq!(entry.state, EntryState::Complete);
    }

    #[test]
    fn complete_entry_rejects_mutation() {
        let mut entry = HistoryEntry::new(Uuid::new_v4(), "t1", "addNode", true);
        let call = Uuid::new_v4();
        entry.open_call(call).unwrap();
        entry.close_call(call, PatchRecord::empty("t1", "addNode")).unwrap();
        assert!(entry.is_complete());
        assert_eq!(
            entry.open_call(Uuid::new_v4()),
            Err(ProtocolError::EntryComplete(entry.id))
        );
        assert_eq!(
            entry.close_call(call, PatchRecord::empty("t1", "addNode")),
            Err(ProtocolError::EntryComplete(entry.id))
        );
    }

    #[test]
    fn reopening_open_call_is_a_violation() {
        let mut entry = HistoryEntry::new(Uuid::new_v4(), "t1", "addNode", true);
        let call = Uuid::new_v4();
        entry.open_call(call).unwrap();
        assert_eq!(
            entry.open_call(call),
            Err(ProtocolError::CallAlreadyOpen { entry: entry.id, call })
        );
    }

    #[test]
    fn closing_unknown_call_is_a_violation() {
        let mut entry = HistoryEntry::new(Uuid::new_v4(), "t1", "addNode", true);
        entry.open_call(Uuid::new_v4()).unwrap();
        let stray = Uuid::new_v4();
        assert_eq!(
            entry.close_call(stray, PatchRecord::empty("t1", "addNode")),
            Err(ProtocolError::CallNotOpen { entry: entry.id, call: stray })
        );
    }

    #[test]
    fn snapshot_drops_runtime_state() {
        let mut entry = HistoryEntry::new(Uuid::new_v4(), "t1", "addNode", true);
        let call = Uuid::new_v4();
        entry.open_call(call).unwrap();
        entry.close_call(call, record_with_patches()).unwrap();

        let snapshot = HistoryEntrySnapshot::from(&entry);
        let value = serde_json::to_value(&snapshot).unwrap();
        assert!(value.get("open_calls").is_none());
        assert!(value.get("state").is_none());

        let restored = HistoryEntry::from(snapshot);
        assert!(restored.is_complete());
        assert_eq!(restored.records, entry.records);
    }
}
