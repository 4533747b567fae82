//! Trees: the units of state ownership.
//!
//! A tree owns one document of private state, runs every top-level action
//! through the monitor middleware, and exposes the fixed asynchronous
//! contract the container drives. Shared model views are mounted subtrees
//! of the document; the `applying_container_patches` gate suppresses
//! resync side effects while the container replays patches.

pub mod monitor;
pub mod scope;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::api::{ContainerApi, TreeApi};
use crate::error::TreeError;
use crate::history::TreeId;
use crate::json_patch::{Op, Path};
use crate::shared_model::SharedModelSnapshot;

use monitor::{CallIds, ProtocolAction};
pub use scope::ActionScope;

// ── Mounts ────────────────────────────────────────────────────────────────

/// A shared model mounted into a tree's document.
///
/// View mounts divert their patches to the owning shared model; an owner
/// mount (the canonical copy mounted into its own tree) keeps them, since
/// that tree is the one recording the shared content's history.
#[derive(Debug, Clone)]
pub struct SharedModelMount {
    pub shared_model_id: String,
    pub path: Path,
    pub owner: bool,
}

impl SharedModelMount {
    /// A consuming tree's view of a shared model.
    pub fn view(shared_model_id: impl Into<String>, path: Path) -> Self {
        Self { shared_model_id: shared_model_id.into(), path, owner: false }
    }
}

// ── Delegate ──────────────────────────────────────────────────────────────

/// Per-tree-type reconciliation: bring the tree's own objects back in sync
/// with its mounted views. Must destroy objects whose referenced shared
/// item vanished before creating objects for unreferenced items, and must
/// be idempotent: a second pass with no intervening view change performs
/// zero additional mutation.
pub trait TreeDelegate: Send + Sync {
    fn update_tree_after_shared_model_changes(
        &self,
        scope: &mut ActionScope<'_>,
    ) -> Result<(), TreeError>;
}

// ── Tree ──────────────────────────────────────────────────────────────────

pub(crate) struct TreeState {
    pub(crate) doc: Value,
    pub(crate) mounts: Vec<SharedModelMount>,
    pub(crate) applying_container_patches: bool,
}

pub struct Tree {
    pub(crate) id: TreeId,
    pub(crate) container: Arc<dyn ContainerApi>,
    pub(crate) delegate: Box<dyn TreeDelegate>,
    pub(crate) state: Mutex<TreeState>,
}

impl Tree {
    pub fn new(
        id: impl Into<TreeId>,
        initial_state: Value,
        mounts: Vec<SharedModelMount>,
        delegate: Box<dyn TreeDelegate>,
        container: Arc<dyn ContainerApi>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            container,
            delegate,
            state: Mutex::new(TreeState {
                doc: initial_state,
                mounts,
                applying_container_patches: false,
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// A snapshot of the tree's current document.
    pub fn state(&self) -> Value {
        self.state.lock().doc.clone()
    }

    pub fn is_applying_container_patches(&self) -> bool {
        self.state.lock().applying_container_patches
    }

    /// Mount an additional shared model view.
    pub fn mount_shared_model(&self, mount: SharedModelMount) {
        self.state.lock().mounts.push(mount);
    }
}

#[async_trait]
impl TreeApi for Tree {
    async fn start_applying_container_patches(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
    ) -> Result<(), TreeError> {
        self.run_protocol(
            CallIds { entry: history_entry_id, call: call_id },
            ProtocolAction::StartApplyingContainerPatches,
        )
        .await
    }

    async fn apply_container_patches(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
        patches: Vec<Op>,
    ) -> Result<(), TreeError> {
        self.run_protocol(
            CallIds { entry: history_entry_id, call: call_id },
            ProtocolAction::ApplyContainerPatches(patches),
        )
        .await
    }

    async fn finish_applying_container_patches(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
    ) -> Result<(), TreeError> {
        self.run_protocol(
            CallIds { entry: history_entry_id, call: call_id },
            ProtocolAction::FinishApplyingContainerPatches,
        )
        .await
    }

    async fn apply_shared_model_snapshot_from_container(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
        snapshot: SharedModelSnapshot,
    ) -> Result<(), TreeError> {
        self.run_protocol(
            CallIds { entry: history_entry_id, call: call_id },
            ProtocolAction::ApplySharedModelSnapshot(snapshot),
        )
        .await
    }
}
