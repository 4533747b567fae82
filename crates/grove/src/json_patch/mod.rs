//! JSON Patch implementation (RFC 6902 subset).
//!
//! This is the wire format for everything the history ledger records and
//! for patches crossing a process boundary: `add`, `remove`, `replace`
//! with a slash-delimited path and value.

pub mod apply;
pub mod codec;
pub mod diff;
pub mod pointer;
pub mod types;

pub use apply::{apply_op, apply_ops};
pub use codec::{from_json, from_json_patch, to_json, to_json_patch};
pub use diff::diff;
pub use pointer::{format_json_pointer, parse_json_pointer, Path};
pub use types::{Op, PatchError};
