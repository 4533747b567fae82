//! The diagram tile: positioned nodes referencing shared items.
//!
//! Document shape:
//!
//! ```json
//! {
//!   "sharedModel": { "id": "...", "items": { "1": { "id": "1", "name": "A" } } },
//!   "nodes": { "1": { "id": "1", "itemId": "1", "x": 0, "y": 0 } }
//! }
//! ```
//!
//! Every node must reference a currently existing item in the mounted
//! view; the delegate destroys dangling nodes and creates nodes (at the
//! default position) for items that have none.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::api::ContainerApi;
use crate::error::TreeError;
use crate::shared_model::{item_ids, next_item_id};
use crate::tree::{ActionScope, SharedModelMount, Tree, TreeDelegate};

use super::{next_numeric_id, object_keys};

const ITEMS_PTR: &str = "/sharedModel/items";

pub struct DiagramTree {
    tree: Arc<Tree>,
}

impl DiagramTree {
    pub fn new(tree_id: &str, shared_model_id: &str, container: Arc<dyn ContainerApi>) -> Self {
        let state = json!({
            "sharedModel": { "id": shared_model_id, "items": {} },
            "nodes": {}
        });
        Self::with_state(tree_id, shared_model_id, state, container)
    }

    /// Construct over an existing document, e.g. when loading a session.
    pub fn with_state(
        tree_id: &str,
        shared_model_id: &str,
        state: Value,
        container: Arc<dyn ContainerApi>,
    ) -> Self {
        let mounts = vec![SharedModelMount::view(
            shared_model_id,
            vec!["sharedModel".to_string()],
        )];
        let tree = Tree::new(tree_id, state, mounts, Box::new(DiagramDelegate), container);
        Self { tree }
    }

    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    pub fn state(&self) -> Value {
        self.tree.state()
    }

    // ── Actions ───────────────────────────────────────────────────────────

    /// Create a shared item and a node referencing it. Returns the node id.
    pub async fn add_node(&self, name: &str, x: i64, y: i64) -> Result<String, TreeError> {
        let mut node_id_out = String::new();
        self.tree
            .run_action("addNode", true, |scope| {
                let item_id = next_item_id(scope.get(ITEMS_PTR).unwrap_or(&Value::Null));
                scope.add(
                    &format!("{ITEMS_PTR}/{item_id}"),
                    json!({ "id": item_id, "name": name }),
                )?;
                let node_id =
                    next_numeric_id(object_keys(scope.get("/nodes")).iter().map(String::as_str))
                        .to_string();
                scope.add(
                    &format!("/nodes/{node_id}"),
                    json!({ "id": node_id, "itemId": item_id, "x": x, "y": y }),
                )?;
                node_id_out = node_id;
                Ok(())
            })
            .await?;
        Ok(node_id_out)
    }

    /// Remove a node and the shared item it references. The node dies
    /// synchronously inside this action; other trees' objects follow once
    /// the propagated snapshot reaches them.
    pub async fn remove_node(&self, node_id: &str) -> Result<(), TreeError> {
        let node_id = node_id.to_string();
        self.tree
            .run_action("removeNode", true, |scope| {
                let item_id = scope
                    .get(&format!("/nodes/{node_id}/itemId"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| TreeError::Action(format!("no node {node_id}")))?;
                scope.remove(&format!("/nodes/{node_id}"))?;
                scope.remove(&format!("{ITEMS_PTR}/{item_id}"))?;
                Ok(())
            })
            .await
    }

    /// Reposition a node. Touches only this tree's private state.
    pub async fn move_node(&self, node_id: &str, x: i64, y: i64) -> Result<(), TreeError> {
        let node_id = node_id.to_string();
        self.tree
            .run_action("moveNode", true, |scope| {
                scope.replace(&format!("/nodes/{node_id}/x"), json!(x))?;
                scope.replace(&format!("/nodes/{node_id}/y"), json!(y))?;
                Ok(())
            })
            .await
    }

    /// Rename the shared item a node references. Writes through the
    /// mounted view; the tree's own record stays empty.
    pub async fn set_node_name(&self, node_id: &str, name: &str) -> Result<(), TreeError> {
        let node_id = node_id.to_string();
        self.tree
            .run_action("setNodeName", true, |scope| {
                let item_id = scope
                    .get(&format!("/nodes/{node_id}/itemId"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| TreeError::Action(format!("no node {node_id}")))?;
                scope.replace(&format!("{ITEMS_PTR}/{item_id}/name"), json!(name))?;
                Ok(())
            })
            .await
    }
}

// ── Reconciliation ────────────────────────────────────────────────────────

struct DiagramDelegate;

impl TreeDelegate for DiagramDelegate {
    fn update_tree_after_shared_model_changes(
        &self,
        scope: &mut ActionScope<'_>,
    ) -> Result<(), TreeError> {
        let items = item_ids(scope.get(ITEMS_PTR));
        let item_set: BTreeSet<&str> = items.iter().map(String::as_str).collect();

        // Queue dangling nodes first, flush the queue, then create missing
        // nodes: never act on a node whose reference target vanished and
        // was immediately replaced under a new id.
        let mut doomed: Vec<String> = Vec::new();
        let mut referenced: BTreeSet<String> = BTreeSet::new();
        if let Some(Value::Object(nodes)) = scope.get("/nodes") {
            for (node_id, node) in nodes {
                match node.get("itemId").and_then(Value::as_str) {
                    Some(item_id) if item_set.contains(item_id) => {
                        referenced.insert(item_id.to_string());
                    }
                    _ => doomed.push(node_id.clone()),
                }
            }
        }
        for node_id in &doomed {
            scope.remove(&format!("/nodes/{node_id}"))?;
        }

        let mut next_id =
            next_numeric_id(object_keys(scope.get("/nodes")).iter().map(String::as_str));
        for item_id in &items {
            if referenced.contains(item_id) {
                continue;
            }
            scope.add(
                &format!("/nodes/{next_id}"),
                json!({ "id": next_id.to_string(), "itemId": item_id, "x": 0, "y": 0 }),
            )?;
            next_id += 1;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
