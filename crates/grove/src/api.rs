//! The asynchronous contracts between trees and the container.
//!
//! Every method returns a future that resolves when the step is durably
//! registered, not necessarily when all downstream effects finish. The
//! contracts must hold whether a peer lives in-process (futures resolve
//! synchronously) or behind message passing with arbitrary latency; the
//! only transport requirement is call/response ordering per tree.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::TreeError;
use crate::history::PatchRecord;
use crate::json_patch::Op;
use crate::shared_model::SharedModelSnapshot;

/// Implemented by every tree; consumed by the container.
#[async_trait]
pub trait TreeApi: Send + Sync {
    /// Called before the container applies patches for an undo, redo, or
    /// replay. The tree suppresses its shared-model resync side effects
    /// until the paired `finish_applying_container_patches`.
    async fn start_applying_container_patches(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
    ) -> Result<(), TreeError>;

    /// Applies a forward sequence of structural patches directly to the
    /// tree's own substate. May be called multiple times between the
    /// start/finish pair. The patches only cover the tree's private state;
    /// shared-model content arrives separately via snapshots.
    async fn apply_container_patches(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
        patches: Vec<Op>,
    ) -> Result<(), TreeError>;

    /// Clears the suppression gate, then runs the shared-model
    /// reconciliation pass exactly once: the resync skipped while the gate
    /// was up must happen at the end.
    async fn finish_applying_container_patches(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
    ) -> Result<(), TreeError>;

    /// Overwrites the matching mounted view wholesale. Ignored when no
    /// view with the snapshot's shared model id is mounted. Never triggers
    /// reconciliation directly; the tree's own monitoring of the resulting
    /// patches drives that separately.
    async fn apply_shared_model_snapshot_from_container(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
        snapshot: SharedModelSnapshot,
    ) -> Result<(), TreeError>;
}

/// Implemented by the container; consumed by every tree.
///
/// The history methods are thin, synchronous forwarding into the document
/// store, exposed as asynchronous to keep the interface uniform whether a
/// tree is local or remote.
#[async_trait]
pub trait ContainerApi: Send + Sync {
    /// Propagate shared model content to every tree except the source,
    /// opening one fresh call per receiving tree under `history_entry_id`.
    /// Resolves only once all receiving trees have confirmed the snapshot
    /// landed in their mounted view — not once they have finished updating
    /// their own objects from it.
    ///
    /// `call_id` identifies the caller's currently-open call.
    async fn update_shared_model(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
        source_tree_id: &str,
        snapshot: SharedModelSnapshot,
    ) -> Result<(), TreeError>;

    /// Register a history entry (idempotent) and open `call_id` against it.
    async fn add_history_entry(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
        tree_id: &str,
        action_name: &str,
        undoable: bool,
    ) -> Result<(), TreeError>;

    /// Report the one patch record that closes `call_id`. Sent even with
    /// zero patches: this is the sole signal that the call is finished.
    async fn add_tree_patch_record(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
        record: PatchRecord,
    ) -> Result<(), TreeError>;

    /// Open an additional call against an existing history entry.
    async fn start_history_entry_call(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
    ) -> Result<(), TreeError>;
}
