//! Crate-wide error umbrella.

use thiserror::Error;

use crate::history::ProtocolError;
use crate::json_patch::PatchError;

#[derive(Debug, Error, PartialEq)]
pub enum TreeError {
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// A domain action failed mid-execution. The tree rolls back its
    /// captured patches locally; nothing is reported to the container.
    #[error("action failed: {0}")]
    Action(String),
}
