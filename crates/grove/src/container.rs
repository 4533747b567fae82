//! The container: the single point trees call into.
//!
//! Owns nothing but the document context; tree creation happens outside
//! and trees are registered here. The history methods forward into the
//! document store; `update_shared_model` is the fan-out/fan-in barrier
//! that makes "the shared model has been propagated everywhere" knowable.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;
use uuid::Uuid;

use crate::api::{ContainerApi, TreeApi};
use crate::context::DocumentContext;
use crate::error::TreeError;
use crate::history::PatchRecord;
use crate::shared_model::SharedModelSnapshot;

pub struct Container {
    ctx: Arc<DocumentContext>,
}

impl Container {
    pub fn new(ctx: Arc<DocumentContext>) -> Arc<Self> {
        Arc::new(Self { ctx })
    }

    pub fn context(&self) -> &Arc<DocumentContext> {
        &self.ctx
    }

    pub fn add_tree(&self, id: &str, tree: Arc<dyn TreeApi>) {
        self.ctx.registry.register(id, tree);
    }

    // ── Conveniences over the stores ──────────────────────────────────────

    pub async fn undo(&self) -> Result<(), TreeError> {
        self.ctx.undo.undo(&self.ctx).await
    }

    pub async fn redo(&self) -> Result<(), TreeError> {
        self.ctx.undo.redo(&self.ctx).await
    }

    pub async fn replay_history_to_trees(&self) -> Result<(), TreeError> {
        self.ctx.document.replay_history_to_trees(&self.ctx.registry).await
    }
}

#[async_trait]
impl ContainerApi for Container {
    async fn update_shared_model(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
        source_tree_id: &str,
        snapshot: SharedModelSnapshot,
    ) -> Result<(), TreeError> {
        debug!(
            entry = %history_entry_id,
            call = %call_id,
            source = source_tree_id,
            shared_model = snapshot.id().unwrap_or("?"),
            "relaying shared model update"
        );
        let trees = self.ctx.registry.snapshot();
        let mut deliveries = Vec::with_capacity(trees.len());
        for (tree_id, tree) in &trees {
            if tree_id == source_tree_id {
                continue;
            }
            // Open the receiving tree's call before invoking it, so the
            // entry cannot complete while the delivery is in flight.
            let destination_call = Uuid::new_v4();
            self.ctx
                .document
                .start_history_entry_call(history_entry_id, destination_call)?;
            deliveries.push(tree.apply_shared_model_snapshot_from_container(
                history_entry_id,
                destination_call,
                snapshot.clone(),
            ));
        }
        try_join_all(deliveries).await?;
        Ok(())
    }

    async fn add_history_entry(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
        tree_id: &str,
        action_name: &str,
        undoable: bool,
    ) -> Result<(), TreeError> {
        self.ctx
            .document
            .create_or_update_history_entry(history_entry_id, call_id, action_name, tree_id, undoable)
            .map_err(Into::into)
    }

    async fn add_tree_patch_record(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
        record: PatchRecord,
    ) -> Result<(), TreeError> {
        self.ctx
            .document
            .add_patches_to_history_entry(history_entry_id, call_id, record)
            .map_err(Into::into)
    }

    async fn start_history_entry_call(
        &self,
        history_entry_id: Uuid,
        call_id: Uuid,
    ) -> Result<(), TreeError> {
        self.ctx
            .document
            .start_history_entry_call(history_entry_id, call_id)
            .map_err(Into::into)
    }
}
