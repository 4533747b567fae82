//! JSON Pointer (RFC 6901) helpers.
//!
//! Paths are component lists; the string form is only used at the wire
//! boundary and in log output.

use serde_json::Value;

/// A parsed JSON Pointer: one component per level.
pub type Path = Vec<String>;

/// Unescapes a JSON Pointer path component.
///
/// Per RFC 6901, `~1` is replaced with `/` and `~0` is replaced with `~`.
pub fn unescape_component(component: &str) -> String {
    if !component.contains('~') {
        return component.to_string();
    }
    // Order matters: ~1 must be replaced before ~0
    component.replace("~1", "/").replace("~0", "~")
}

/// Escapes a JSON Pointer path component.
///
/// Per RFC 6901, `/` is replaced with `~1` and `~` is replaced with `~0`.
pub fn escape_component(component: &str) -> String {
    if !component.contains('/') && !component.contains('~') {
        return component.to_string();
    }
    // Order matters: ~ must be escaped before /
    component.replace('~', "~0").replace('/', "~1")
}

/// Parse a JSON Pointer string into path components.
///
/// The empty string is the root path (no components).
pub fn parse_json_pointer(pointer: &str) -> Path {
    if pointer.is_empty() {
        return vec![];
    }
    pointer
        .split('/')
        .skip(1)
        .map(unescape_component)
        .collect()
}

/// Format path components back into a JSON Pointer string.
pub fn format_json_pointer(path: &[String]) -> String {
    if path.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(path.len() * 8);
    for component in path {
        out.push('/');
        out.push_str(&escape_component(component));
    }
    out
}

/// Immutable lookup of the value at `path`.
pub fn get<'a>(doc: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = doc;
    for component in path {
        current = match current {
            Value::Object(map) => map.get(component)?,
            Value::Array(arr) => arr.get(component.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Mutable lookup of the value at `path`.
pub fn get_mut<'a>(doc: &'a mut Value, path: &[String]) -> Option<&'a mut Value> {
    let mut current = doc;
    for component in path {
        current = match current {
            Value::Object(map) => map.get_mut(component)?,
            Value::Array(arr) => arr.get_mut(component.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Returns true if `prefix` is a (non-strict) prefix of `path`.
pub fn is_prefix(prefix: &[String], path: &[String]) -> bool {
    path.len() >= prefix.len() && path[..prefix.len()] == prefix[..]
}

// ── Tests ─────────────────────────────────────────────────────────────────
