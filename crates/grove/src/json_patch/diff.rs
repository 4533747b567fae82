//! Structural diff: generate a patch that transforms one value into another.
//!
//! Used to turn a wholesale snapshot overwrite into granular operations, so
//! a recorded snapshot application stays invertible at the same granularity
//! as a direct edit. Strings and other scalars diff as a single `replace`.

use serde_json::{Map, Value};

use super::types::Op;

/// Generate a patch (list of operations) that transforms `src` into `dst`.
pub fn diff(src: &Value, dst: &Value) -> Vec<Op> {
    let mut ops = Vec::new();
    diff_at_path(&mut ops, &[], src, dst);
    ops
}

// ── Core recursive differ ─────────────────────────────────────────────────

fn diff_at_path(ops: &mut Vec<Op>, path: &[String], src: &Value, dst: &Value) {
    if src == dst {
        return;
    }
    match (src, dst) {
        (Value::Object(s), Value::Object(d)) => diff_obj(ops, path, s, d),
        (Value::Array(s), Value::Array(d)) => diff_arr(ops, path, s, d),
        _ => ops.push(Op::Replace {
            path: path.to_vec(),
            value: dst.clone(),
            old_value: None,
        }),
    }
}

fn diff_obj(
    ops: &mut Vec<Op>,
    path: &[String],
    src: &Map<String, Value>,
    dst: &Map<String, Value>,
) {
    // Remove keys in src that are not in dst
    for key in src.keys() {
        if !dst.contains_key(key) {
            let mut p = path.to_vec();
            p.push(key.clone());
            ops.push(Op::Remove { path: p, old_value: None });
        }
    }
    // Add new keys, recurse into shared ones
    for (key, dst_val) in dst {
        let mut p = path.to_vec();
        p.push(key.clone());
        match src.get(key) {
            None => ops.push(Op::Add { path: p, value: dst_val.clone() }),
            Some(src_val) => diff_at_path(ops, &p, src_val, dst_val),
        }
    }
}

fn diff_arr(ops: &mut Vec<Op>, path: &[String], src: &[Value], dst: &[Value]) {
    let shared = src.len().min(dst.len());
    for i in 0..shared {
        let mut p = path.to_vec();
        p.push(i.to_string());
        diff_at_path(ops, &p, &src[i], &dst[i]);
    }
    // Trailing removals run highest-index-first so earlier indices stay valid
    for i in (shared..src.len()).rev() {
        let mut p = path.to_vec();
        p.push(i.to_string());
        ops.push(Op::Remove { path: p, old_value: None });
    }
    for (i, v) in dst.iter().enumerate().skip(shared) {
        let mut p = path.to_vec();
        p.push(i.to_string());
        ops.push(Op::Add { path: p, value: v.clone() });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
