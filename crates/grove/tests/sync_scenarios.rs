//! Live multi-tree synchronization scenarios: fan-out propagation,
//! cross-tree deletion, write-through renames, and rollback on failure.

mod common;

use common::*;
use serde_json::json;
use grove::TreeError;

#[tokio::test]
async fn fan_out_creates_exactly_one_object_per_tree() {
    let fixture = build_document();
    fixture.shared.add_item("A").await.unwrap();

    // Both tiles reconciled an object for item 1.
    assert!(find_node_by_item(&fixture.diagram.state(), "1").is_some());
    assert_eq!(list_entries(&fixture.list.state()).len(), 1);

    // A tile edit to the shared data propagates everywhere else.
    let entry_id = fixture.list.add_item("B").await.unwrap();
    assert_eq!(entry_id, "2");

    let shared_state = fixture.shared.tree().state();
    assert_eq!(shared_state["items"]["2"]["name"], json!("B"));

    // The diagram received the snapshot and created exactly one new node
    // referencing item 2, at the default position.
    let diagram_state = fixture.diagram.state();
    let node = find_node_by_item(&diagram_state, "2").expect("node for item 2");
    assert_eq!(node["x"], json!(0));
    assert_eq!(
        nodes(&diagram_state)
            .values()
            .filter(|n| n["itemId"] == json!("2"))
            .count(),
        1
    );

    // The multi-tree edit converged on completed history entries.
    assert!(all_entries_complete(&fixture));
}

#[tokio::test]
async fn add_item_entry_aggregates_all_trees() {
    let fixture = build_document();
    fixture.list.add_item("B").await.unwrap();

    let entries = fixture.container.context().document.entries();
    let entry = entries
        .iter()
        .find(|e| e.action == "addItem" && e.tree == "itemList")
        .expect("addItem entry");
    assert!(entry.undoable);
    assert!(entry.is_complete());

    // The originating tile's own record, the shared model's canonical
    // record, and the diagram's reconciliation all converge on this entry.
    let record_trees: Vec<&str> = entry.records.iter().map(|r| r.tree.as_str()).collect();
    assert!(record_trees.contains(&"itemList"));
    assert!(record_trees.contains(&"sharedModel"));
    assert!(record_trees.contains(&"diagram"));

    let shared_record = entry
        .records
        .iter()
        .find(|r| r.tree == "sharedModel")
        .expect("shared model record");
    assert!(!shared_record.patches.is_empty());
}

#[tokio::test]
async fn cross_tree_deletion_destroys_remote_objects_via_reconciliation() {
    let fixture = build_document();
    let node_id = fixture.diagram.add_node("A", 10, 10).await.unwrap();
    assert_eq!(list_entries(&fixture.list.state()).len(), 1);

    fixture.diagram.remove_node(&node_id).await.unwrap();

    // The whole document settled: no node, no list entry, no shared item.
    assert!(nodes(&fixture.diagram.state()).is_empty());
    assert!(list_entries(&fixture.list.state()).is_empty());
    assert!(shared_items(&fixture.shared.tree().state()).is_empty());

    // The list's object died in its own reconciliation pass, after the
    // snapshot reached it — inside the same history entry, not the
    // originating action.
    let entries = fixture.container.context().document.entries();
    let entry = entries.iter().find(|e| e.action == "removeNode").expect("removeNode entry");
    let list_reconcile = entry
        .records
        .iter()
        .find(|r| r.tree == "itemList" && !r.patches.is_empty())
        .expect("list reconciliation record");
    assert_eq!(list_reconcile.action, "updateTreeAfterSharedModelChangesInternal");
    assert!(list_reconcile.patches.iter().any(|op| op.op_name() == "remove"));
}

#[tokio::test]
async fn rename_writes_through_the_view() {
    let fixture = build_document();
    let node_id = fixture.diagram.add_node("draft", 0, 0).await.unwrap();

    fixture.diagram.set_node_name(&node_id, "final").await.unwrap();

    assert_eq!(fixture.shared.tree().state()["items"]["1"]["name"], json!("final"));
    assert_eq!(fixture.list.names(), vec!["final".to_string()]);

    // The rename only touched shared content: the diagram's own record
    // for it is empty, the canonical record carries the change.
    let entries = fixture.container.context().document.entries();
    let entry = entries.iter().find(|e| e.action == "setNodeName").expect("entry");
    let own = entry
        .records
        .iter()
        .find(|r| r.tree == "diagram" && r.action == "setNodeName")
        .expect("diagram record");
    assert!(own.patches.is_empty());
    assert!(entry.records.iter().any(|r| r.tree == "sharedModel" && !r.patches.is_empty()));
}

#[tokio::test]
async fn failed_action_rolls_back_and_reports_nothing() {
    let fixture = build_document();
    fixture.diagram.add_node("A", 0, 0).await.unwrap();
    let before_state = fixture.diagram.state();
    let before_entries = fixture.container.context().document.len();

    let result = fixture
        .diagram
        .tree()
        .run_action("explode", true, |scope| {
            scope.add("/nodes/99", json!({"id": "99", "itemId": "1", "x": 0, "y": 0}))?;
            Err(TreeError::Action("boom".into()))
        })
        .await;

    assert_eq!(result, Err(TreeError::Action("boom".into())));
    assert_eq!(fixture.diagram.state(), before_state);
    assert_eq!(fixture.container.context().document.len(), before_entries);
}

#[tokio::test]
async fn snapshot_for_unmounted_model_is_ignored_but_closes_its_call() {
    let fixture = build_document();
    // A second shared model nobody mounts a view of except its owner.
    let orphan = grove::SharedModelTree::new(
        "orphanModel",
        "orphans",
        serde_json::Map::new(),
        fixture.container.clone(),
    );
    fixture.container.add_tree("orphanModel", orphan.tree().clone());

    orphan.add_item("X").await.unwrap();

    // Every other tree ignored the snapshot; the entry still completed.
    assert!(nodes(&fixture.diagram.state()).is_empty());
    assert!(list_entries(&fixture.list.state()).is_empty());
    assert!(all_entries_complete(&fixture));
}
