//! The undo store: a cursor over the undoable subset of the ledger.
//!
//! Holds entry ids, not entries; the records resolve through the document
//! store when an undo or redo actually runs. Each undo/redo creates its
//! own non-undoable container entry so the ledger replays with full
//! fidelity, without the operation ever landing on the undo stack itself.
//!
//! Known limitation: if a user acts while patches are mid-application the
//! stack can become inconsistent; intermediate actions are not merged into
//! the replaying action.

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::context::DocumentContext;
use crate::error::TreeError;
use crate::history::{
    HistoryOperation, PatchRecord, ProtocolError, TreeId, CONTAINER_TREE_ID,
};
use crate::json_patch::Op;

#[derive(Default)]
struct UndoState {
    history: Vec<Uuid>,
    undo_idx: usize,
}

#[derive(Default)]
pub struct UndoStore {
    state: Mutex<UndoState>,
}

impl UndoStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Stack maintenance ─────────────────────────────────────────────────

    /// Called by the document store when an entry becomes undo-eligible.
    /// A new entry id discards the redo tail before appending; either way
    /// the cursor resets to the end of the stack.
    pub(crate) fn add_history_entry(&self, entry_id: Uuid) {
        let mut st = self.state.lock();
        if !st.history.contains(&entry_id) {
            let undo_idx = st.undo_idx;
            st.history.truncate(undo_idx);
            st.history.push(entry_id);
        }
        st.undo_idx = st.history.len();
    }

    // ── Views ─────────────────────────────────────────────────────────────

    pub fn undo_levels(&self) -> usize {
        self.state.lock().undo_idx
    }

    pub fn redo_levels(&self) -> usize {
        let st = self.state.lock();
        st.history.len() - st.undo_idx
    }

    pub fn can_undo(&self) -> bool {
        self.undo_levels() > 0
    }

    pub fn can_redo(&self) -> bool {
        self.redo_levels() > 0
    }

    /// The undoable entry ids currently on the stack, oldest first.
    pub fn history(&self) -> Vec<Uuid> {
        self.state.lock().history.clone()
    }

    // ── Undo / redo ───────────────────────────────────────────────────────

    pub async fn undo(&self, ctx: &DocumentContext) -> Result<(), TreeError> {
        let entry_id = {
            let st = self.state.lock();
            if st.undo_idx == 0 {
                return Err(ProtocolError::NothingToUndo.into());
            }
            st.history[st.undo_idx - 1]
        };
        self.apply(ctx, entry_id, HistoryOperation::Undo).await?;
        let mut st = self.state.lock();
        st.undo_idx = st.undo_idx.saturating_sub(1);
        Ok(())
    }

    pub async fn redo(&self, ctx: &DocumentContext) -> Result<(), TreeError> {
        let entry_id = {
            let st = self.state.lock();
            if st.undo_idx >= st.history.len() {
                return Err(ProtocolError::NothingToRedo.into());
            }
            st.history[st.undo_idx]
        };
        self.apply(ctx, entry_id, HistoryOperation::Redo).await?;
        self.state.lock().undo_idx += 1;
        Ok(())
    }

    async fn apply(
        &self,
        ctx: &DocumentContext,
        entry_id: Uuid,
        op: HistoryOperation,
    ) -> Result<(), TreeError> {
        let entry = ctx
            .document
            .entry(entry_id)
            .ok_or(ProtocolError::UnknownEntry(entry_id))?;

        // Undo walks the records backwards with each record's inverse
        // patches reversed; redo replays everything forward.
        let mut per_tree: IndexMap<TreeId, Vec<Op>> = IndexMap::new();
        let mut collect = |record: &PatchRecord| {
            per_tree
                .entry(record.tree.clone())
                .or_default()
                .extend(record.patches_for(op));
        };
        match op {
            HistoryOperation::Undo => entry.records.iter().rev().for_each(&mut collect),
            HistoryOperation::Redo => entry.records.iter().for_each(&mut collect),
        }

        let action_name = match op {
            HistoryOperation::Undo => "undo",
            HistoryOperation::Redo => "redo",
        };
        info!(target_entry = %entry_id, action = action_name, trees = per_tree.len(), "replaying entry");

        let audit_id = Uuid::new_v4();
        let top_call = Uuid::new_v4();
        ctx.document.create_or_update_history_entry(
            audit_id,
            top_call,
            action_name,
            CONTAINER_TREE_ID,
            false,
        )?;
        ctx.document
            .apply_patches_to_trees(&ctx.registry, audit_id, per_tree)
            .await?;
        ctx.document.add_patches_to_history_entry(
            audit_id,
            top_call,
            PatchRecord::empty(CONTAINER_TREE_ID, action_name),
        )?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_tracks_appends() {
        let store = UndoStore::new();
        assert!(!store.can_undo());
        assert!(!store.can_redo());

        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.add_history_entry(a);
        store.add_history_entry(b);
        assert_eq!(store.undo_levels(), 2);
        assert_eq!(store.redo_levels(), 0);
    }

    #[test]
    fn re_adding_same_entry_does_not_duplicate() {
        let store = UndoStore::new();
        let a = Uuid::new_v4();
        store.add_history_entry(a);
        store.add_history_entry(a);
        assert_eq!(store.history(), vec![a]);
        assert_eq!(store.undo_levels(), 1);
    }

    #[test]
    fn new_entry_discards_redo_tail() {
        let store = UndoStore::new();
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.add_history_entry(a);
        store.add_history_entry(b);
        store.add_history_entry(c);

        // Simulate two undos, then a fresh action.
        store.state.lock().undo_idx = 1;
        store.add_history_entry(d);
        assert_eq!(store.history(), vec![a, d]);
        assert_eq!(store.undo_levels(), 2);
        assert!(!store.can_redo());
    }
}
