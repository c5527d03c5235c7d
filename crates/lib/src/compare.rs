//! Structural differences between entries.
//!
//! Entries are compared field by field on their serialized form. Each
//! difference is reported as a [`DiffItem`] carrying the path to the field
//! and the values on either side.

use std::fmt;

use serde_json::Value;

use crate::{Result, entry::Entry};

/// One step on the way from an entry to a differing value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Field(name) => write!(f, ".{name}"),
            PathSegment::Index(idx) => write!(f, "[{idx}]"),
        }
    }
}

/// A single difference. `None` on one side means the value is absent there.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffItem {
    pub original: Option<Value>,
    pub new: Option<Value>,
    pub path: Vec<PathSegment>,
}

impl DiffItem {
    /// The path rendered as `.children[0].data`.
    pub fn path_string(&self) -> String {
        self.path.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for DiffItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<Value>| match v {
            None | Some(Value::Null) => "(None)".to_string(),
            Some(Value::Object(map)) => match map.get("entry_type") {
                Some(Value::String(kind)) => kind.clone(),
                _ => Value::Object(map.clone()).to_string(),
            },
            Some(other) => other.to_string(),
        };
        let path = self.path_string();
        let path = if path.is_empty() { "()" } else { path.as_str() };
        write!(f, "{path}: ({}->{})", show(&self.original), show(&self.new))
    }
}

/// All differences between two entries.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDiff {
    pub original_entry: Entry,
    pub new_entry: Entry,
    pub diffs: Vec<DiffItem>,
}

impl EntryDiff {
    /// Compares two entries as given. Id references are compared as ids.
    pub fn between(original: &Entry, new: &Entry) -> Result<Self> {
        let diffs = if original.entry_type() != new.entry_type() {
            vec![DiffItem {
                original: Some(serde_json::to_value(original)?),
                new: Some(serde_json::to_value(new)?),
                path: Vec::new(),
            }]
        } else {
            let mut diffs = Vec::new();
            walk_find_diff(
                &serde_json::to_value(original)?,
                &serde_json::to_value(new)?,
                &mut Vec::new(),
                &mut diffs,
            );
            diffs
        };
        Ok(Self {
            original_entry: original.clone(),
            new_entry: new.clone(),
            diffs,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }
}

impl fmt::Display for EntryDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Diff: {{")?;
        for diff in &self.diffs {
            writeln!(f, "    {diff}")?;
        }
        write!(f, "}}")
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Null, Value::Null)
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Array(_), Value::Array(_))
            | (Value::Object(_), Value::Object(_))
    )
}

fn push(out: &mut Vec<DiffItem>, path: &[PathSegment], original: Option<&Value>, new: Option<&Value>) {
    out.push(DiffItem {
        original: original.cloned(),
        new: new.cloned(),
        path: path.to_vec(),
    });
}

/// Appends every difference between `orig` and `new` below `path` to `out`.
pub fn walk_find_diff(
    orig: &Value,
    new: &Value,
    path: &mut Vec<PathSegment>,
    out: &mut Vec<DiffItem>,
) {
    if !same_kind(orig, new) {
        push(out, path, Some(orig), Some(new));
        return;
    }
    match (orig, new) {
        (Value::Object(a), Value::Object(b)) => {
            // Embedded entries of different kinds are one difference
            if a.get("entry_type") != b.get("entry_type") {
                push(out, path, Some(orig), Some(new));
                return;
            }
            for (key, value) in a {
                path.push(PathSegment::Field(key.clone()));
                match b.get(key) {
                    Some(other) => walk_find_diff(value, other, path, out),
                    None => push(out, path, Some(value), None),
                }
                path.pop();
            }
            for (key, value) in b.iter().filter(|(k, _)| !a.contains_key(*k)) {
                path.push(PathSegment::Field(key.clone()));
                push(out, path, None, Some(value));
                path.pop();
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for (idx, (x, y)) in a.iter().zip(b).enumerate() {
                path.push(PathSegment::Index(idx));
                walk_find_diff(x, y, path, out);
                path.pop();
            }
            for (idx, value) in a.iter().enumerate().skip(b.len()) {
                path.push(PathSegment::Index(idx));
                push(out, path, Some(value), None);
                path.pop();
            }
            for (idx, value) in b.iter().enumerate().skip(a.len()) {
                path.push(PathSegment::Index(idx));
                push(out, path, None, Some(value));
                path.pop();
            }
        }
        _ => {
            if orig != new {
                push(out, path, Some(orig), Some(new));
            }
        }
    }
}
