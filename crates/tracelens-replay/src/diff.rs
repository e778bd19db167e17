//! Structural comparison of JSON values.
//!
//! Objects are compared key by key, arrays as multisets (element order is
//! ignored), numbers by numeric value. Paths are dotted (`a.b`, `items[2]`);
//! a difference at the top level is reported under `root`.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const ROOT: &str = "root";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub old: Value,
    pub new: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeChange {
    pub old_type: String,
    pub new_type: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// Differences between two values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub has_changes: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: BTreeMap<String, ValueChange>,
    pub type_changes: BTreeMap<String, TypeChange>,
    pub summary: String,
}

/// Compares `old` against `new`.
pub fn diff(old: &Value, new: &Value) -> Diff {
    let mut out = Diff::default();
    compare(old, new, "", &mut out);
    out.has_changes = !(out.added.is_empty()
        && out.removed.is_empty()
        && out.changed.is_empty()
        && out.type_changes.is_empty());
    out.summary = out.describe();
    out
}

impl Diff {
    fn describe(&self) -> String {
        if !self.has_changes {
            return "No changes detected".to_string();
        }

        let (list_added, fields_added): (Vec<_>, Vec<_>) =
            self.added.iter().partition(|p| p.ends_with(']'));
        let (list_removed, fields_removed): (Vec<_>, Vec<_>) =
            self.removed.iter().partition(|p| p.ends_with(']'));

        let mut parts = Vec::new();
        if !fields_added.is_empty() {
            parts.push(plural(fields_added.len(), "field", "added"));
        }
        if !fields_removed.is_empty() {
            parts.push(plural(fields_removed.len(), "field", "removed"));
        }
        if !self.changed.is_empty() {
            parts.push(plural(self.changed.len(), "value", "changed"));
        }
        if !self.type_changes.is_empty() {
            let n = self.type_changes.len();
            parts.push(format!("{n} type change{}", if n == 1 { "" } else { "s" }));
        }
        let list_items = list_added.len() + list_removed.len();
        if list_items > 0 {
            parts.push(plural(list_items, "list item", "modified"));
        }

        parts.join(", ")
    }

    /// Multi-line text rendering for logs and terminals.
    pub fn format_for_display(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Summary: {}", self.summary);
        out.push('\n');

        if !self.added.is_empty() {
            out.push_str("Added:\n");
            for path in &self.added {
                let _ = writeln!(out, "  + {path}");
            }
            out.push('\n');
        }
        if !self.removed.is_empty() {
            out.push_str("Removed:\n");
            for path in &self.removed {
                let _ = writeln!(out, "  - {path}");
            }
            out.push('\n');
        }
        if !self.changed.is_empty() {
            out.push_str("Changed values:\n");
            for (path, change) in &self.changed {
                let _ = writeln!(out, "  ~ {path}");
                let _ = writeln!(out, "    old: {}", change.old);
                let _ = writeln!(out, "    new: {}", change.new);
            }
            out.push('\n');
        }
        if !self.type_changes.is_empty() {
            out.push_str("Type changes:\n");
            for (path, change) in &self.type_changes {
                let _ = writeln!(out, "  ! {path}");
                let _ = writeln!(out, "    {} -> {}", change.old_type, change.new_type);
            }
            out.push('\n');
        }

        out
    }
}

fn plural(count: usize, noun: &str, verb: &str) -> String {
    format!("{count} {noun}{} {verb}", if count == 1 { "" } else { "s" })
}

fn compare(old: &Value, new: &Value, path: &str, out: &mut Diff) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => compare_objects(a, b, path, out),
        (Value::Array(a), Value::Array(b)) => compare_arrays(a, b, path, out),
        _ if type_name(old) != type_name(new) => {
            out.type_changes.insert(
                display_path(path),
                TypeChange {
                    old_type: type_name(old).to_string(),
                    new_type: type_name(new).to_string(),
                    old_value: old.clone(),
                    new_value: new.clone(),
                },
            );
        }
        _ if !values_equal(old, new) => {
            out.changed
                .insert(display_path(path), ValueChange { old: old.clone(), new: new.clone() });
        }
        _ => {}
    }
}

fn compare_objects(a: &Map<String, Value>, b: &Map<String, Value>, path: &str, out: &mut Diff) {
    for (key, old) in a {
        match b.get(key) {
            Some(new) => compare(old, new, &key_path(path, key), out),
            None => out.removed.push(key_path(path, key)),
        }
    }
    for key in b.keys().filter(|k| !a.contains_key(*k)) {
        out.added.push(key_path(path, key));
    }
}

/// Multiset comparison: each old element consumes one equal new element.
fn compare_arrays(a: &[Value], b: &[Value], path: &str, out: &mut Diff) {
    let mut matched = vec![false; b.len()];

    for (i, old) in a.iter().enumerate() {
        let hit = b
            .iter()
            .enumerate()
            .find(|(j, new)| !matched[*j] && values_equal(old, new))
            .map(|(j, _)| j);
        match hit {
            Some(j) => matched[j] = true,
            None => out.removed.push(index_path(path, i)),
        }
    }
    for (j, _) in matched.iter().enumerate().filter(|(_, m)| !**m) {
        out.added.push(index_path(path, j));
    }
}

/// Structural equality with numeric comparison and order-free arrays.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        (Value::Array(x), Value::Array(y)) => {
            if x.len() != y.len() {
                return false;
            }
            let mut used = vec![false; y.len()];
            x.iter().all(|item| {
                let slot = y
                    .iter()
                    .enumerate()
                    .position(|(j, other)| !used[j] && values_equal(item, other));
                match slot {
                    Some(j) => {
                        used[j] = true;
                        true
                    }
                    None => false,
                }
            })
        }
        _ => a == b,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        ROOT.to_string()
    } else {
        path.to_string()
    }
}

fn key_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn index_path(parent: &str, index: usize) -> String {
    format!("{}[{index}]", display_path(parent))
}
