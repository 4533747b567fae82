#![allow(dead_code)]

//! Shared fixture: a document session with one shared model tree, a
//! diagram tile, and an item list tile, all registered with a container.

use std::sync::Arc;

use serde_json::{Map, Value};

use grove::tiles::{DiagramTree, ItemListTree};
use grove::{Container, DocumentContext, SharedModelTree};

pub const SHARED_MODEL_ID: &str = "items";

pub struct Fixture {
    pub container: Arc<Container>,
    pub shared: SharedModelTree,
    pub diagram: DiagramTree,
    pub list: ItemListTree,
}

pub fn build_document() -> Fixture {
    let ctx = DocumentContext::new();
    let container = Container::new(ctx);
    let shared = SharedModelTree::new(
        "sharedModel",
        SHARED_MODEL_ID,
        Map::new(),
        container.clone(),
    );
    let diagram = DiagramTree::new("diagram", SHARED_MODEL_ID, container.clone());
    let list = ItemListTree::new("itemList", SHARED_MODEL_ID, container.clone());
    container.add_tree("sharedModel", shared.tree().clone());
    container.add_tree("diagram", diagram.tree().clone());
    container.add_tree("itemList", list.tree().clone());
    Fixture { container, shared, diagram, list }
}

pub fn nodes(state: &Value) -> &Map<String, Value> {
    state["nodes"].as_object().expect("diagram state has nodes")
}

pub fn find_node_by_item<'a>(state: &'a Value, item_id: &str) -> Option<&'a Value> {
    nodes(state)
        .values()
        .find(|n| n.get("itemId").and_then(Value::as_str) == Some(item_id))
}

pub fn list_entries(state: &Value) -> Vec<Value> {
    state["items"].as_array().expect("list state has items").clone()
}

pub fn shared_items(state: &Value) -> &Map<String, Value> {
    state["items"].as_object().expect("shared model state has items")
}

pub fn all_entries_complete(fixture: &Fixture) -> bool {
    fixture
        .container
        .context()
        .document
        .entries()
        .iter()
        .all(|e| e.is_complete())
}
