//! The document store: the append-only ledger of history entries.
//!
//! Entries are never deleted while the document lives; they form the
//! permanent edit record used for persistence, undo/redo, and full-state
//! replay. The store also decides when an entry becomes eligible for the
//! undo stack: it must be undoable and already carry at least one
//! patch-carrying record, so an effect-free entry never produces an undo
//! step that does nothing.

use std::sync::Arc;

use futures::future::try_join_all;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::TreeRegistry;
use crate::error::TreeError;
use crate::history::{
    DocumentSnapshot, HistoryEntry, HistoryEntrySnapshot, PatchRecord, ProtocolError, TreeId,
    CONTAINER_TREE_ID,
};
use crate::json_patch::Op;
use crate::undo_store::UndoStore;

/// Action name of the audit entry a replay records itself under. Replay
/// entries reproduce state the rest of the ledger already encodes, so a
/// later replay skips them; undo/redo audit entries stay in.
pub const REPLAY_ACTION: &str = "replayHistoryToTrees";

pub struct DocumentStore {
    undo_store: Arc<UndoStore>,
    entries: Mutex<IndexMap<Uuid, HistoryEntry>>,
}

impl DocumentStore {
    pub fn new(undo_store: Arc<UndoStore>) -> Self {
        Self {
            undo_store,
            entries: Mutex::new(IndexMap::new()),
        }
    }

    // ── Ledger mutation ───────────────────────────────────────────────────

    /// Idempotent entry registration: creates the entry if absent and opens
    /// `call_id` against it.
    pub fn create_or_update_history_entry(
        &self,
        entry_id: Uuid,
        call_id: Uuid,
        action_name: &str,
        tree_id: &str,
        undoable: bool,
    ) -> Result<(), ProtocolError> {
        let register = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(entry_id).or_insert_with(|| {
                info!(entry = %entry_id, tree = tree_id, action = action_name, undoable, "new history entry");
                HistoryEntry::new(entry_id, tree_id, action_name, undoable)
            });
            entry.open_call(call_id)?;
            entry.undoable && entry.has_patches()
        };
        if register {
            self.undo_store.add_history_entry(entry_id);
        }
        Ok(())
    }

    /// Open an additional call against an existing entry.
    pub fn start_history_entry_call(
        &self,
        entry_id: Uuid,
        call_id: Uuid,
    ) -> Result<(), ProtocolError> {
        let mut entries = self.entries.lock();
        let entry = entries
            .get_mut(&entry_id)
            .ok_or(ProtocolError::UnknownEntry(entry_id))?;
        entry.open_call(call_id)
    }

    /// Append a record and close its call. An empty record still closes the
    /// call; the entry completes when its last open call closes.
    pub fn add_patches_to_history_entry(
        &self,
        entry_id: Uuid,
        call_id: Uuid,
        record: PatchRecord,
    ) -> Result<(), ProtocolError> {
        let register = {
            let mut entries = self.entries.lock();
            let entry = entries
                .get_mut(&entry_id)
                .ok_or(ProtocolError::UnknownEntry(entry_id))?;
            debug!(
                entry = %entry_id,
                call = %call_id,
                tree = %record.tree,
                action = %record.action,
                patches = record.patches.len(),
                "patch record"
            );
            entry.close_call(call_id, record)?;
            if entry.is_complete() {
                info!(entry = %entry_id, records = entry.records.len(), "history entry complete");
            }
            entry.undoable && entry.has_patches()
        };
        if register {
            self.undo_store.add_history_entry(entry_id);
        }
        Ok(())
    }

    // ── Views ─────────────────────────────────────────────────────────────

    pub fn entry(&self, entry_id: Uuid) -> Option<HistoryEntry> {
        self.entries.lock().get(&entry_id).cloned()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Entries still `Recording`. With no timeout or retry in the protocol,
    /// a call whose close never arrives leaves its entry here forever; this
    /// view is how a host can flag such entries.
    pub fn stalled_entries(&self) -> Vec<Uuid> {
        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_complete())
            .map(|e| e.id)
            .collect()
    }

    // ── Persistence ───────────────────────────────────────────────────────

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            history: self
                .entries
                .lock()
                .values()
                .map(HistoryEntrySnapshot::from)
                .collect(),
        }
    }

    /// Replace the ledger with a persisted document. Loaded entries are
    /// complete; undoable patch-carrying entries are registered with the
    /// undo store in ledger order so undo works after rehydration.
    pub fn load(&self, snapshot: DocumentSnapshot) {
        let undoable: Vec<Uuid> = {
            let mut entries = self.entries.lock();
            entries.clear();
            for entry_snapshot in snapshot.history {
                entries.insert(entry_snapshot.id, HistoryEntry::from(entry_snapshot));
            }
            entries
                .values()
                .filter(|e| e.undoable && e.has_patches())
                .map(|e| e.id)
                .collect()
        };
        for id in undoable {
            self.undo_store.add_history_entry(id);
        }
    }

    // ── Replay ────────────────────────────────────────────────────────────

    /// Rehydrate trees from the ledger: concatenate, per tree and in ledger
    /// order, every entry's forward patches, then drive each affected tree
    /// through the same start → apply → finish bracket undo and redo use.
    pub async fn replay_history_to_trees(
        &self,
        registry: &TreeRegistry,
    ) -> Result<(), TreeError> {
        let per_tree: IndexMap<TreeId, Vec<Op>> = {
            let entries = self.entries.lock();
            let mut per_tree: IndexMap<TreeId, Vec<Op>> = IndexMap::new();
            for entry in entries.values() {
                if entry.tree == CONTAINER_TREE_ID && entry.action == REPLAY_ACTION {
                    continue;
                }
                for record in &entry.records {
                    per_tree
                        .entry(record.tree.clone())
                        .or_default()
                        .extend(record.patches.iter().cloned());
                }
            }
            per_tree
        };
        if per_tree.is_empty() {
            return Ok(());
        }

        info!(trees = per_tree.len(), "replaying history to trees");
        let entry_id = Uuid::new_v4();
        let top_call = Uuid::new_v4();
        self.create_or_update_history_entry(
            entry_id,
            top_call,
            REPLAY_ACTION,
            CONTAINER_TREE_ID,
            false,
        )?;
        self.apply_patches_to_trees(registry, entry_id, per_tree).await?;
        self.add_patches_to_history_entry(
            entry_id,
            top_call,
            PatchRecord::empty(CONTAINER_TREE_ID, REPLAY_ACTION),
        )?;
        Ok(())
    }

    /// The shared start → apply → finish bracket: one reconciliation code
    /// path for live propagation, undo/redo, and cold-start replay. Each
    /// per-tree step opens its call before the tree is invoked, so the
    /// entry cannot complete early however the responses interleave.
    pub(crate) async fn apply_patches_to_trees(
        &self,
        registry: &TreeRegistry,
        entry_id: Uuid,
        per_tree: IndexMap<TreeId, Vec<Op>>,
    ) -> Result<(), TreeError> {
        let mut trees = Vec::with_capacity(per_tree.len());
        for (tree_id, patches) in per_tree {
            let tree = registry
                .get(&tree_id)
                .ok_or(ProtocolError::UnknownTree(tree_id.clone()))?;
            trees.push((tree, patches));
        }

        let mut starts = Vec::with_capacity(trees.len());
        for (tree, _) in &trees {
            let call_id = Uuid::new_v4();
            self.start_history_entry_call(entry_id, call_id)?;
            starts.push(tree.start_applying_container_patches(entry_id, call_id));
        }
        try_join_all(starts).await?;

        let mut applies = Vec::with_capacity(trees.len());
        for (tree, patches) in &trees {
            let call_id = Uuid::new_v4();
            self.start_history_entry_call(entry_id, call_id)?;
            applies.push(tree.apply_container_patches(entry_id, call_id, patches.clone()));
        }
        try_join_all(applies).await?;

        let mut finishes = Vec::with_capacity(trees.len());
        for (tree, _) in &trees {
            let call_id = Uuid::new_v4();
            self.start_history_entry_call(entry_id, call_id)?;
            finishes.push(tree.finish_applying_container_patches(entry_id, call_id));
        }
        try_join_all(finishes).await?;

        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (DocumentStore, Arc<UndoStore>) {
        let undo = Arc::new(UndoStore::new());
        (DocumentStore::new(undo.clone()), undo)
    }

    fn patch_record(tree: &str) -> PatchRecord {
        PatchRecord {
            tree: tree.into(),
            action: "addNode".into(),
            patches: vec![Op::Add { path: vec!["a".into()], value: json!(1) }],
            inverse_patches: vec![Op::Remove { path: vec!["a".into()], old_value: Some(json!(1)) }],
        }
    }

    #[test]
    fn create_is_idempotent_per_entry() {
        let (store, _) = store();
        let entry = Uuid::new_v4();
        store
            .create_or_update_history_entry(entry, Uuid::new_v4(), "addNode", "t1", true)
            .unwrap();
        store
            .create_or_update_history_entry(entry, Uuid::new_v4(), "addNode", "t1", true)
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.entry(entry).unwrap().open_calls.len(), 2);
    }

    #[test]
    fn completion_is_independent_of_close_order() {
        // Property: an entry with N open calls completes exactly on the
        // Nth close, in any order.
        let orders: Vec<[usize; 3]> = vec![[0, 1, 2], [2, 1, 0], [1, 2, 0]];
        for order in orders {
            let (store, _) = store();
            let entry = Uuid::new_v4();
            let calls = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
            store
                .create_or_update_history_entry(entry, calls[0], "addNode", "t1", true)
                .unwrap();
            store.start_history_entry_call(entry, calls[1]).unwrap();
            store.start_history_entry_call(entry, calls[2]).unwrap();
            for (n, &i) in order.iter().enumerate() {
                assert!(!store.entry(entry).unwrap().is_complete());
                store
                    .add_patches_to_history_entry(entry, calls[i], patch_record("t1"))
                    .unwrap();
                let complete = store.entry(entry).unwrap().is_complete();
                assert_eq!(complete, n == 2);
            }
        }
    }

    #[test]
    fn complete_entry_rejects_further_calls() {
        let (store, _) = store();
        let entry = Uuid::new_v4();
        let call = Uuid::new_v4();
        store
            .create_or_update_history_entry(entry, call, "addNode", "t1", true)
            .unwrap();
        store.add_patches_to_history_entry(entry, call, patch_record("t1")).unwrap();
        assert_eq!(
            store.start_history_entry_call(entry, Uuid::new_v4()),
            Err(ProtocolError::EntryComplete(entry))
        );
    }

    #[test]
    fn unknown_entry_is_a_violation() {
        let (store, _) = store();
        let entry = Uuid::new_v4();
        assert_eq!(
            store.start_history_entry_call(entry, Uuid::new_v4()),
            Err(ProtocolError::UnknownEntry(entry))
        );
    }

    #[test]
    fn undo_registration_needs_patches_and_undoable_flag() {
        let (store, undo) = store();

        // Undoable but effect-free: never registered.
        let empty_entry = Uuid::new_v4();
        let call = Uuid::new_v4();
        store
            .create_or_update_history_entry(empty_entry, call, "noop", "t1", true)
            .unwrap();
        store
            .add_patches_to_history_entry(empty_entry, call, PatchRecord::empty("t1", "noop"))
            .unwrap();
        assert_eq!(undo.undo_levels(), 0);

        // Patch-carrying but not undoable: never registered.
        let audit = Uuid::new_v4();
        let call = Uuid::new_v4();
        store
            .create_or_update_history_entry(audit, call, "undo", CONTAINER_TREE_ID, false)
            .unwrap();
        store.add_patches_to_history_entry(audit, call, patch_record("t1")).unwrap();
        assert_eq!(undo.undo_levels(), 0);

        // Undoable with a patch-carrying record: registered once it lands,
        // even when the record closes the entry's only call.
        let entry = Uuid::new_v4();
        let call = Uuid::new_v4();
        store
            .create_or_update_history_entry(entry, call, "addNode", "t1", true)
            .unwrap();
        store.add_patches_to_history_entry(entry, call, patch_record("t1")).unwrap();
        assert_eq!(undo.undo_levels(), 1);
    }

    #[test]
    fn snapshot_load_roundtrip() {
        let (store, _) = store();
        let entry = Uuid::new_v4();
        let call = Uuid::new_v4();
        store
            .create_or_update_history_entry(entry, call, "addNode", "t1", true)
            .unwrap();
        store.add_patches_to_history_entry(entry, call, patch_record("t1")).unwrap();

        let snapshot = store.snapshot();
        let encoded = serde_json::to_value(&snapshot).unwrap();
        let decoded: DocumentSnapshot = serde_json::from_value(encoded).unwrap();

        let (restored, undo) = self::store();
        restored.load(decoded);
        assert_eq!(restored.len(), 1);
        assert!(restored.entry(entry).unwrap().is_complete());
        assert_eq!(undo.undo_levels(), 1);
    }
}
