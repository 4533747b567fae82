//! Shared models: canonical id-addressable data shared across trees.
//!
//! A shared model is owned canonically by one designated tree, itself an
//! ordinary [`Tree`] so it reuses the monitoring and history machinery.
//! Every consuming tree holds a structurally identical view mounted in its
//! own state; views are only ever overwritten wholesale by the container,
//! while edits flow the other way through normal tree actions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::api::ContainerApi;
use crate::error::TreeError;
use crate::tree::{ActionScope, SharedModelMount, Tree, TreeDelegate};

// ── Snapshot ──────────────────────────────────────────────────────────────

/// The full content of a shared model (or of a mounted view of one), as
/// relayed between trees. Carries its shared model `id` for routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharedModelSnapshot(pub Value);

impl SharedModelSnapshot {
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

// ── Items ─────────────────────────────────────────────────────────────────

/// One entry in a shared model's item map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedItem {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Allocate the next item id: one past the highest numeric id in the map.
pub fn next_item_id(items: &Value) -> String {
    let mut max_id = 0u64;
    if let Value::Object(map) = items {
        for key in map.keys() {
            if let Ok(id) = key.parse::<u64>() {
                max_id = max_id.max(id);
            }
        }
    }
    (max_id + 1).to_string()
}

/// The ids present in an item map, in map order.
pub fn item_ids(items: Option<&Value>) -> Vec<String> {
    match items {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => vec![],
    }
}

// ── Shared model tree ─────────────────────────────────────────────────────

/// The canonical copy never needs to resync anything else in its tree.
struct SharedModelDelegate;

impl TreeDelegate for SharedModelDelegate {
    fn update_tree_after_shared_model_changes(
        &self,
        _scope: &mut ActionScope<'_>,
    ) -> Result<(), TreeError> {
        Ok(())
    }
}

/// The designated owner tree of one shared model. Its whole state is the
/// shared model content, mounted as an owner mount so its patches are
/// recorded canonically while consuming trees' view patches are diverted.
pub struct SharedModelTree {
    tree: Arc<Tree>,
}

impl SharedModelTree {
    /// `tree_id` identifies the tree toward the container; `model_id` is
    /// the shared model id that snapshots are routed by.
    pub fn new(
        tree_id: &str,
        model_id: &str,
        initial_items: Map<String, Value>,
        container: Arc<dyn ContainerApi>,
    ) -> Self {
        let state = json!({ "id": model_id, "items": initial_items });
        let mounts = vec![SharedModelMount {
            shared_model_id: model_id.to_string(),
            path: vec![],
            owner: true,
        }];
        let tree = Tree::new(tree_id, state, mounts, Box::new(SharedModelDelegate), container);
        Self { tree }
    }

    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    /// Current snapshot of the canonical content.
    pub fn snapshot(&self) -> SharedModelSnapshot {
        SharedModelSnapshot(self.tree.state())
    }

    /// Add an item directly to the canonical copy. Returns the new id.
    pub async fn add_item(&self, name: &str) -> Result<String, TreeError> {
        let mut new_id = String::new();
        self.tree
            .run_action("addItem", true, |scope| {
                let id = next_item_id(scope.get("/items").unwrap_or(&Value::Null));
                scope.add(
                    &format!("/items/{id}"),
                    json!({ "id": id, "name": name }),
                )?;
                new_id = id;
                Ok(())
            })
            .await?;
        Ok(new_id)
    }

    /// Remove an item from the canonical copy.
    pub async fn remove_item(&self, item_id: &str) -> Result<(), TreeError> {
        let pointer = format!("/items/{item_id}");
        self.tree
            .run_action("removeItem", true, |scope| {
                scope.remove(&pointer)?;
                Ok(())
            })
            .await
    }

    /// Rename an item in the canonical copy.
    pub async fn set_item_name(&self, item_id: &str, name: Option<&str>) -> Result<(), TreeError> {
        let pointer = format!("/items/{item_id}/name");
        let value = match name {
            Some(n) => json!(n),
            None => Value::Null,
        };
        self.tree
            .run_action("setItemName", true, |scope| {
                scope.replace(&pointer, value.clone())?;
                Ok(())
            })
            .await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
