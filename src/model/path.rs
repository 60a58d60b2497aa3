//! Dot-delimited key paths over nested JSON objects.

use serde_json::{Map, Value};

pub const SEPARATOR: char = '.';
pub const WILDCARD: &str = "*";

/// A key path split once into its segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    raw: String,
    segments: Vec<String>,
}

impl KeyPath {
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            segments: raw.split(SEPARATOR).map(str::to_string).collect(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Ancestor paths from the nearest parent up to the root segment.
    ///
    /// `a.b.c` yields `a.b`, then `a`.
    pub fn ancestors(&self) -> impl Iterator<Item = &[String]> + '_ {
        (1..self.segments.len()).rev().map(move |n| &self.segments[..n])
    }

    /// Each ancestor paired with its `<ancestor>.*` wildcard name, nearest first.
    pub fn wildcard_ancestors(&self) -> impl Iterator<Item = (&[String], String)> + '_ {
        self.ancestors().map(|parent| {
            let wildcard = format!("{}{}{}", join(parent), SEPARATOR, WILDCARD);
            (parent, wildcard)
        })
    }
}

fn join(segments: &[String]) -> String {
    segments.join(&SEPARATOR.to_string())
}

pub fn get<'a>(map: &'a Map<String, Value>, segments: &[String]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let value = map.get(first)?;
    if rest.is_empty() {
        return Some(value);
    }
    match value {
        Value::Object(child) => get(child, rest),
        _ => None,
    }
}

/// Assign `value` at `segments`, replacing non-object intermediates with
/// empty objects.
pub fn set(map: &mut Map<String, Value>, segments: &[String], value: Value) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert(first.clone(), value);
        return;
    }
    let child = map
        .entry(first.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    if let Value::Object(child) = child {
        set(child, rest, value);
    }
}

/// Delete the leaf at `segments`. With `prune`, parents left empty by the
/// deletion are removed as well.
pub fn remove(map: &mut Map<String, Value>, segments: &[String], prune: bool) -> Option<Value> {
    let (first, rest) = segments.split_first()?;
    if rest.is_empty() {
        return map.shift_remove(first);
    }
    let (removed, emptied) = match map.get_mut(first) {
        Some(Value::Object(child)) => {
            let removed = remove(child, rest, prune);
            (removed, child.is_empty())
        }
        _ => (None, false),
    };
    if prune && emptied {
        map.shift_remove(first);
    }
    removed
}

/// Flatten nested objects into a path-keyed map.
///
/// Non-empty objects are descended into; arrays, scalars and empty objects
/// are leaves.
pub fn flatten(map: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(map, None, &mut out);
    out
}

fn flatten_into(map: &Map<String, Value>, prefix: Option<&str>, out: &mut Map<String, Value>) {
    for (key, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{}{}{}", prefix, SEPARATOR, key),
            None => key.clone(),
        };
        match value {
            Value::Object(child) if !child.is_empty() => flatten_into(child, Some(&path), out),
            leaf => {
                out.insert(path, leaf.clone());
            }
        }
    }
}

/// Recursive merge of `source` into `target`; objects merge, anything else
/// overwrites.
pub fn deep_merge(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
