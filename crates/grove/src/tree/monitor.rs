//! The tree monitor: middleware wrapped around every top-level action.
//!
//! Captures the action's structural patches, diverts patches landing
//! inside mounted shared model views (the owning shared model records
//! those independently), forwards modified view content to the container,
//! triggers the reconciliation pass as its own monitored action, and
//! always closes the action's call with exactly one patch record — the
//! sole signal the container gets that the call is finished. A failing
//! action is rolled back locally and reported nowhere.

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::TreeError;
use crate::history::PatchRecord;
use crate::json_patch::pointer::is_prefix;
use crate::json_patch::{apply_op, diff, Op, Path};
use crate::shared_model::SharedModelSnapshot;
use crate::tree::{ActionScope, SharedModelMount, Tree};

// ── Action identity ───────────────────────────────────────────────────────

/// The (history entry, call) pair one monitored action reports under.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallIds {
    pub entry: Uuid,
    pub call: Uuid,
}

impl CallIds {
    pub(crate) fn fresh() -> Self {
        Self { entry: Uuid::new_v4(), call: Uuid::new_v4() }
    }
}

/// A container-driven action, carried as an explicit variant rather than
/// inferred from an action-name string. Protocol actions reuse the
/// (entry, call) ids handed to them instead of minting new ones, and never
/// register a history entry of their own.
pub(crate) enum ProtocolAction {
    ApplySharedModelSnapshot(SharedModelSnapshot),
    ApplyContainerPatches(Vec<Op>),
    StartApplyingContainerPatches,
    FinishApplyingContainerPatches,
    UpdateTreeAfterSharedModelChanges,
}

impl ProtocolAction {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            ProtocolAction::ApplySharedModelSnapshot(_) => "applySharedModelSnapshotFromContainer",
            ProtocolAction::ApplyContainerPatches(_) => "applyContainerPatches",
            ProtocolAction::StartApplyingContainerPatches => "startApplyingContainerPatches",
            ProtocolAction::FinishApplyingContainerPatches => "finishApplyingContainerPatches",
            ProtocolAction::UpdateTreeAfterSharedModelChanges => {
                "updateTreeAfterSharedModelChangesInternal"
            }
        }
    }

    /// Applying a snapshot that came from the container must not be echoed
    /// back to the container; everything else that touches a mount is.
    fn forwards_shared_model_updates(&self) -> bool {
        !matches!(self, ProtocolAction::ApplySharedModelSnapshot(_))
    }
}

// ── Captured outcome of one action body ───────────────────────────────────

struct ActionOutcome {
    /// Patches belonging to this tree's own record (view patches removed).
    patches: Vec<Op>,
    inverse_patches: Vec<Op>,
    /// Mounts whose content the action touched, with their new content.
    modified_mounts: Vec<(SharedModelMount, SharedModelSnapshot)>,
}

fn prefix_op(op: Op, base: &Path) -> Op {
    let prefix = |path: Path| -> Path {
        let mut full = base.clone();
        full.extend(path);
        full
    };
    match op {
        Op::Add { path, value } => Op::Add { path: prefix(path), value },
        Op::Remove { path, old_value } => Op::Remove { path: prefix(path), old_value },
        Op::Replace { path, value, old_value } => {
            Op::Replace { path: prefix(path), value, old_value }
        }
    }
}

// ── Monitor ───────────────────────────────────────────────────────────────

impl Tree {
    /// Run a top-level domain action. Mints a fresh history entry and call
    /// id, registers the entry with the container, and drives the full
    /// capture/forward/reconcile/report sequence.
    pub async fn run_action<F>(&self, name: &str, undoable: bool, f: F) -> Result<(), TreeError>
    where
        F: FnOnce(&mut ActionScope<'_>) -> Result<(), TreeError> + Send,
    {
        let ids = CallIds::fresh();
        debug!(tree = %self.id, action = name, entry = %ids.entry, "user action");
        let outcome = self.with_recording_scope(f)?;
        self.complete_action(name, ids, Some(undoable), true, outcome).await
    }

    /// Run a container-driven protocol action under the ids it was handed.
    /// Boxed because the reconciliation pass it may spawn is itself a
    /// monitored action on the same tree.
    pub(crate) fn run_protocol(
        &self,
        ids: CallIds,
        action: ProtocolAction,
    ) -> BoxFuture<'_, Result<(), TreeError>> {
        async move {
            debug!(
                tree = %self.id,
                action = action.name(),
                entry = %ids.entry,
                call = %ids.call,
                "protocol action"
            );
            let forwards = action.forwards_shared_model_updates();
            let outcome = self.execute_protocol_body(&action)?;
            self.complete_action(action.name(), ids, None, forwards, outcome).await
        }
        .boxed()
    }

    // ── Phase 1: synchronous capture ──────────────────────────────────────

    fn execute_protocol_body(&self, action: &ProtocolAction) -> Result<ActionOutcome, TreeError> {
        match action {
            ProtocolAction::StartApplyingContainerPatches => {
                self.state.lock().applying_container_patches = true;
                self.with_recording_scope(|_| Ok(()))
            }
            ProtocolAction::FinishApplyingContainerPatches => {
                // Clear the gate first, then run the skipped resync exactly
                // once, inside this same monitored action.
                self.state.lock().applying_container_patches = false;
                self.with_recording_scope(|scope| {
                    self.delegate.update_tree_after_shared_model_changes(scope)
                })
            }
            ProtocolAction::UpdateTreeAfterSharedModelChanges => {
                // While container patches are applying the resync is
                // suppressed; the call still closes with an empty record.
                if self.state.lock().applying_container_patches {
                    self.with_recording_scope(|_| Ok(()))
                } else {
                    self.with_recording_scope(|scope| {
                        self.delegate.update_tree_after_shared_model_changes(scope)
                    })
                }
            }
            ProtocolAction::ApplyContainerPatches(patches) => {
                self.with_recording_scope(|scope| {
                    for op in patches {
                        scope.apply_op(op)?;
                    }
                    Ok(())
                })
            }
            ProtocolAction::ApplySharedModelSnapshot(snapshot) => {
                let mount = {
                    let st = self.state.lock();
                    snapshot
                        .id()
                        .and_then(|sid| st.mounts.iter().find(|m| m.shared_model_id == sid))
                        .cloned()
                };
                let Some(mount) = mount else {
                    // Not every tree uses every shared model.
                    warn!(
                        tree = %self.id,
                        shared_model = snapshot.id().unwrap_or("?"),
                        "ignoring snapshot for unmounted shared model"
                    );
                    return self.with_recording_scope(|_| Ok(()));
                };
                self.with_recording_scope(|scope| {
                    // Wholesale overwrite, expressed as a structural diff so
                    // the captured patches stay granular and invertible.
                    match scope.get_path(&mount.path).cloned() {
                        Some(current) => {
                            for op in diff(&current, &snapshot.0) {
                                scope.apply_op(&prefix_op(op, &mount.path))?;
                            }
                            Ok(())
                        }
                        None => {
                            scope.add_path(mount.path.clone(), snapshot.0.clone())?;
                            Ok(())
                        }
                    }
                })
            }
        }
    }

    /// Run `f` against a recording scope under the state lock. On failure
    /// the captured patches are rolled back in place and nothing is
    /// reported. On success the captured patches are split: patches under
    /// a view mount are diverted into that mount's modification count,
    /// patches under an owner mount are counted and kept.
    fn with_recording_scope<F>(&self, f: F) -> Result<ActionOutcome, TreeError>
    where
        F: FnOnce(&mut ActionScope<'_>) -> Result<(), TreeError>,
    {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mounts = state.mounts.clone();
        let mut scope = ActionScope::new(&mut state.doc);
        match f(&mut scope) {
            Ok(()) => {
                let (patches, inverse_patches) = scope.into_parts();
                let mut outcome = ActionOutcome {
                    patches: Vec::new(),
                    inverse_patches: Vec::new(),
                    modified_mounts: Vec::new(),
                };
                let mut counts = vec![0usize; mounts.len()];
                for (patch, inverse) in patches.into_iter().zip(inverse_patches) {
                    let mount_idx = mounts.iter().position(|m| is_prefix(&m.path, patch.path()));
                    match mount_idx {
                        Some(i) => {
                            counts[i] += 1;
                            if mounts[i].owner {
                                // The canonical copy records its own patches.
                                outcome.patches.push(patch);
                                outcome.inverse_patches.push(inverse);
                            }
                        }
                        None => {
                            outcome.patches.push(patch);
                            outcome.inverse_patches.push(inverse);
                        }
                    }
                }
                for (mount, count) in mounts.into_iter().zip(counts) {
                    if count == 0 {
                        continue;
                    }
                    match crate::json_patch::pointer::get(&state.doc, &mount.path) {
                        Some(content) => {
                            let snapshot = SharedModelSnapshot(content.clone());
                            outcome.modified_mounts.push((mount, snapshot));
                        }
                        None => warn!(
                            tree = %self.id,
                            shared_model = %mount.shared_model_id,
                            "modified mount has no content"
                        ),
                    }
                }
                Ok(outcome)
            }
            Err(err) => {
                let (_, inverse_patches) = scope.into_parts();
                for op in inverse_patches.iter().rev() {
                    if let Err(rollback_err) = apply_op(&mut state.doc, op) {
                        error!(tree = %self.id, error = %rollback_err, "rollback patch failed");
                    }
                }
                warn!(tree = %self.id, error = %err, "action failed, rolled back");
                Err(err)
            }
        }
    }

    // ── Phase 2: the completion protocol ──────────────────────────────────

    /// `register` carries the undoable flag for user actions; protocol
    /// actions pass `None` because the entry already exists. Ends by
    /// sending exactly one patch record for the current call, even with
    /// zero patches.
    async fn complete_action(
        &self,
        name: &str,
        ids: CallIds,
        register: Option<bool>,
        forward_updates: bool,
        outcome: ActionOutcome,
    ) -> Result<(), TreeError> {
        if let Some(undoable) = register {
            self.container
                .add_history_entry(ids.entry, ids.call, &self.id, name, undoable)
                .await?;
        }

        for (mount, snapshot) in &outcome.modified_mounts {
            if forward_updates {
                // The container must know about this before the current
                // call closes, or the entry could complete too soon.
                self.container
                    .update_shared_model(ids.entry, ids.call, &self.id, snapshot.clone())
                    .await?;
            }
            debug!(
                tree = %self.id,
                shared_model = %mount.shared_model_id,
                "resyncing after shared model change"
            );
            let reconcile_call = Uuid::new_v4();
            self.container.start_history_entry_call(ids.entry, reconcile_call).await?;
            self.run_protocol(
                CallIds { entry: ids.entry, call: reconcile_call },
                ProtocolAction::UpdateTreeAfterSharedModelChanges,
            )
            .await?;
        }

        let record = PatchRecord {
            tree: self.id.clone(),
            action: name.to_string(),
            patches: outcome.patches,
            inverse_patches: outcome.inverse_patches,
        };
        self.container.add_tree_patch_record(ids.entry, ids.call, record).await
    }
}
