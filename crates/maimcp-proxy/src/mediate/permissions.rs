//! In-memory permission cache.
//!
//! Keys are a tool-or-prompt name, or `name#canonical-arguments-json`. The
//! reserved key `y` means "all approved". Arguments are canonicalized
//! (recursively sorted keys, no whitespace) so `{a:1,b:2}` and `{b:2,a:1}`
//! collide on the same key. Entries live for the process lifetime.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

/// Reserved wildcard key: every gated call is approved.
pub const ALLOW_ALL_KEY: &str = "y";

/// Canonical JSON encoding of an argument value: object keys sorted
/// recursively, no whitespace.
pub fn canonical_arguments(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Key serialization cannot fail for a string.
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar).unwrap_or_default()),
    }
}

/// Approved/denied decisions accumulated over the process lifetime.
#[derive(Default)]
pub struct PermissionCache {
    map: RwLock<HashMap<String, bool>>,
}

impl PermissionCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a gated call. Three keys are consulted in order: the
    /// wildcard, the `name#arguments` composite, the bare name; the first
    /// hit wins.
    pub fn lookup(&self, name: &str, arguments: &Value) -> Option<bool> {
        let map = self.map.read();
        if let Some(v) = map.get(ALLOW_ALL_KEY) {
            return Some(*v);
        }
        let composite = format!("{name}#{}", canonical_arguments(arguments));
        if let Some(v) = map.get(&composite) {
            return Some(*v);
        }
        map.get(name).copied()
    }

    /// Record a forever-decision for a bare name.
    pub fn set_name(&self, name: &str, approved: bool) {
        self.map.write().insert(name.to_owned(), approved);
    }

    /// Record a forever-decision for a name with these exact arguments.
    pub fn set_with_args(&self, name: &str, arguments: &Value, approved: bool) {
        let key = format!("{name}#{}", canonical_arguments(arguments));
        self.map.write().insert(key, approved);
    }

    /// Approve everything from now on.
    pub fn allow_all(&self) {
        self.map.write().insert(ALLOW_ALL_KEY.to_owned(), true);
    }
}
