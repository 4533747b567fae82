//! grove — synchronization and history engine for independent state trees
//! sharing data.
//!
//! Several independently-owned trees (a diagram, a list, …) share pieces
//! of data through shared models while keeping their own private
//! structure referencing them. When one tree edits shared data, every
//! other tree mounting a view of it is brought back to a consistent,
//! reference-safe state, and the whole multi-tree edit is recorded as a
//! single completable history entry — undoable, and replayable later to
//! rebuild the document from scratch.

// Leaf utilities (no internal deps)
pub mod json_patch;

pub mod error;
pub mod history;

// Contracts and context
pub mod api;
pub mod context;
pub mod shared_model;

// Stores
pub mod document_store;
pub mod undo_store;

// The engine
pub mod container;
pub mod tree;

// Example tile trees
pub mod tiles;

pub use api::{ContainerApi, TreeApi};
pub use container::Container;
pub use context::{DocumentContext, TreeRegistry};
pub use document_store::DocumentStore;
pub use error::TreeError;
pub use history::{
    DocumentSnapshot, EntryState, HistoryEntry, HistoryEntrySnapshot, HistoryOperation,
    PatchRecord, ProtocolError, TreeId, CONTAINER_TREE_ID,
};
pub use shared_model::{SharedItem, SharedModelSnapshot, SharedModelTree};
pub use tree::{ActionScope, SharedModelMount, Tree, TreeDelegate};
pub use undo_store::UndoStore;
