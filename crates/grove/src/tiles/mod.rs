//! Example tile trees.
//!
//! Two concrete tree types that mount a shared model view and keep their
//! own objects reconciled against it: a diagram (nodes with positions)
//! and an ordered item list. The rendering surfaces that would sit on top
//! of these are out of scope; everything here is the state machinery the
//! scenario tests drive.

pub mod diagram;
pub mod item_list;

pub use diagram::DiagramTree;
pub use item_list::ItemListTree;

use serde_json::Value;

/// Next id one past the highest numeric id seen.
pub(crate) fn next_numeric_id<'a>(ids: impl IntoIterator<Item = &'a str>) -> u64 {
    let mut max_id = 0u64;
    for id in ids {
        if let Ok(n) = id.parse::<u64>() {
            max_id = max_id.max(n);
        }
    }
    max_id + 1
}

pub(crate) fn object_keys(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        _ => vec![],
    }
}
