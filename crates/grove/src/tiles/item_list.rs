//! The item list tile: an ordered list of entries referencing shared items.
//!
//! Document shape:
//!
//! ```json
//! {
//!   "sharedModel": { "id": "...", "items": { "1": { "id": "1", "name": "A" } } },
//!   "items": [ { "id": "1", "itemId": "1" } ]
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::api::ContainerApi;
use crate::error::TreeError;
use crate::shared_model::{item_ids, next_item_id};
use crate::tree::{ActionScope, SharedModelMount, Tree, TreeDelegate};

use super::next_numeric_id;

const ITEMS_PTR: &str = "/sharedModel/items";

pub struct ItemListTree {
    tree: Arc<Tree>,
}

impl ItemListTree {
    pub fn new(tree_id: &str, shared_model_id: &str, container: Arc<dyn ContainerApi>) -> Self {
        let state = json!({
            "sharedModel": { "id": shared_model_id, "items": {} },
            "items": []
        });
        Self::with_state(tree_id, shared_model_id, state, container)
    }

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
        let tree = Tree::new(tree_id, state, mounts, Box::new(ItemListDelegate), container);
        Self { tree }
    }

    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }

    pub fn state(&self) -> Value {
        self.tree.state()
    }

    fn entries(&self) -> Vec<Value> {
        match self.tree.state().get("items") {
            Some(Value::Array(entries)) => entries.clone(),
            _ => vec![],
        }
    }

    fn entry_index(entries: &[Value], entry_id: &str) -> Option<usize> {
        entries
            .iter()
            .position(|e| e.get("id").and_then(Value::as_str) == Some(entry_id))
    }

    // ── Actions ───────────────────────────────────────────────────────────

    /// Create a shared item and append a list entry referencing it.
    /// Returns the entry id.
    pub async fn add_item(&self, name: &str) -> Result<String, TreeError> {
        let mut entry_id_out = String::new();
        self.tree
            .run_action("addItem", true, |scope| {
                let item_id = next_item_id(scope.get(ITEMS_PTR).unwrap_or(&Value::Null));
                scope.add(
                    &format!("{ITEMS_PTR}/{item_id}"),
                    json!({ "id": item_id, "name": name }),
                )?;
                let entries = scope.get("/items").and_then(Value::as_array).cloned().unwrap_or_default();
                let entry_id = next_numeric_id(
                    entries.iter().filter_map(|e| e.get("id").and_then(Value::as_str)),
                )
                .to_string();
                scope.add("/items/-", json!({ "id": entry_id, "itemId": item_id }))?;
                entry_id_out = entry_id;
                Ok(())
            })
            .await?;
        Ok(entry_id_out)
    }

    /// Remove a list entry and the shared item it references.
    pub async fn remove_item(&self, entry_id: &str) -> Result<(), TreeError> {
        let entry_id = entry_id.to_string();
        self.tree
            .run_action("removeItem", true, |scope| {
                let entries = scope.get("/items").and_then(Value::as_array).cloned().unwrap_or_default();
                let index = Self::entry_index(&entries, &entry_id)
                    .ok_or_else(|| TreeError::Action(format!("no list entry {entry_id}")))?;
                let item_id = entries[index]
                    .get("itemId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| TreeError::Action(format!("entry {entry_id} has no item")))?;
                scope.remove(&format!("/items/{index}"))?;
                scope.remove(&format!("{ITEMS_PTR}/{item_id}"))?;
                Ok(())
            })
            .await
    }

    /// Rename the shared item an entry references, through the view.
    pub async fn set_item_name(&self, entry_id: &str, name: &str) -> Result<(), TreeError> {
        let entry_id = entry_id.to_string();
        self.tree
            .run_action("setItemName", true, |scope| {
                let entries = scope.get("/items").and_then(Value::as_array).cloned().unwrap_or_default();
                let index = Self::entry_index(&entries, &entry_id)
                    .ok_or_else(|| TreeError::Action(format!("no list entry {entry_id}")))?;
                let item_id = entries[index]
                    .get("itemId")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| TreeError::Action(format!("entry {entry_id} has no item")))?;
                scope.replace(&format!("{ITEMS_PTR}/{item_id}/name"), json!(name))?;
                Ok(())
            })
            .await
    }

    /// Display names in list order, resolved through the view.
    pub fn names(&self) -> Vec<String> {
        let state = self.tree.state();
        self.entries()
            .iter()
            .filter_map(|entry| {
                let item_id = entry.get("itemId").and_then(Value::as_str)?;
                state
                    .pointer(&format!("{ITEMS_PTR}/{item_id}/name"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .collect()
    }
}

// ── Reconciliation ────────────────────────────────────────────────────────

struct ItemListDelegate;

impl TreeDelegate for ItemListDelegate {
    fn update_tree_after_shared_model_changes(
        &self,
        scope: &mut ActionScope<'_>,
    ) -> Result<(), TreeError> {
        let items = item_ids(scope.get(ITEMS_PTR));
        let item_set: BTreeSet<&str> = items.iter().map(String::as_str).collect();
        let entries = scope.get("/items").and_then(Value::as_array).cloned().unwrap_or_default();

        let mut doomed: Vec<usize> = Vec::new();
        let mut referenced: BTreeSet<String> = BTreeSet::new();
        for (index, entry) in entries.iter().enumerate() {
            match entry.get("itemId").and_then(Value::as_str) {
                Some(item_id) if item_set.contains(item_id) => {
                    referenced.insert(item_id.to_string());
                }
                _ => doomed.push(index),
            }
        }
        // Remove highest index first so the queued indices stay valid.
        for index in doomed.iter().rev() {
            scope.remove(&format!("/items/{index}"))?;
        }

        let mut next_id = next_numeric_id(
            entries
                .iter()
                .enumerate()
                .filter(|(i, _)| !doomed.contains(i))
                .filter_map(|(_, e)| e.get("id").and_then(Value::as_str)),
        );
        for item_id in &items {
            if referenced.contains(item_id) {
                continue;
            }
            scope.add(
                "/items/-",
                json!({ "id": next_id.to_string(), "itemId": item_id }),
            )?;
            next_id += 1;
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn reconcile(doc: &mut Value) -> (Vec<crate::json_patch::Op>, Vec<crate::json_patch::Op>) {
        let mut scope = ActionScope::new(doc);
        ItemListDelegate.update_tree_after_shared_model_changes(&mut scope).unwrap();
        scope.into_parts()
    }

    #[test]
    fn removes_dangling_entries_and_appends_missing() {
        let mut doc = json!({
            "sharedModel": { "id": "items", "items": {
                "1": { "id": "1", "name": "A" },
                "3": { "id": "3", "name": "C" }
            }},
            "items": [
                { "id": "1", "itemId": "1" },
                { "id": "2", "itemId": "2" }
            ]
        });
        reconcile(&mut doc);
        let entries = doc["items"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["itemId"], json!("1"));
        assert_eq!(entries[1]["itemId"], json!("3"));
    }

    #[test]
    fn multiple_dangling_entries_remove_cleanly() {
        let mut doc = json!({
            "sharedModel": { "id": "items", "items": { "2": { "id": "2", "name": "B" } }},
            "items": [
                { "id": "1", "itemId": "1" },
                { "id": "2", "itemId": "2" },
                { "id": "3", "itemId": "3" }
            ]
        });
        reconcile(&mut doc);
        let entries = doc["items"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["itemId"], json!("2"));
    }

    #[test]
    fn second_pass_is_idempotent() {
        let mut doc = json!({
            "sharedModel": { "id": "items", "items": { "1": { "id": "1", "name": "A" } }},
            "items": []
        });
        reconcile(&mut doc);
        let after_first = doc.clone();
        let (patches, inverse) = reconcile(&mut doc);
        assert!(patches.is_empty());
        assert!(inverse.is_empty());
        assert_eq!(doc, after_first);
    }
}
