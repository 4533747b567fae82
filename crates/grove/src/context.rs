//! Per-document context: the stores and the live tree registry.
//!
//! Constructed once per document session and passed by reference into
//! every component that needs it. Ownership questions ("which tree does
//! this id belong to right now") resolve through the registry at the
//! moment of use instead of through owner pointers.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::api::TreeApi;
use crate::document_store::DocumentStore;
use crate::history::TreeId;
use crate::undo_store::UndoStore;

// ── Registry ──────────────────────────────────────────────────────────────

/// The live set of trees in a document, keyed by tree id.
#[derive(Default)]
pub struct TreeRegistry {
    trees: RwLock<BTreeMap<TreeId, Arc<dyn TreeApi>>>,
}

impl TreeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: impl Into<TreeId>, tree: Arc<dyn TreeApi>) {
        self.trees.write().insert(id.into(), tree);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn TreeApi>> {
        self.trees.read().get(id).cloned()
    }

    /// Stable snapshot of the registry, taken under a short lock so
    /// callers can fan out without holding it.
    pub fn snapshot(&self) -> Vec<(TreeId, Arc<dyn TreeApi>)> {
        self.trees
            .read()
            .iter()
            .map(|(id, tree)| (id.clone(), tree.clone()))
            .collect()
    }

    pub fn ids(&self) -> Vec<TreeId> {
        self.trees.read().keys().cloned().collect()
    }
}

// ── Context ───────────────────────────────────────────────────────────────

/// Everything a document session shares: the append-only history ledger,
/// the undo cursor over it, and the live tree registry.
pub struct DocumentContext {
    pub document: Arc<DocumentStore>,
    pub undo: Arc<UndoStore>,
    pub registry: Arc<TreeRegistry>,
}

impl DocumentContext {
    pub fn new() -> Arc<Self> {
        let undo = Arc::new(UndoStore::new());
        let document = Arc::new(DocumentStore::new(undo.clone()));
        Arc::new(Self {
            document,
            undo,
            registry: Arc::new(TreeRegistry::new()),
        })
    }
}
