//! Path-addressed edits over dynamic YAML/JSON documents.
//!
//! Workload files, override files and provisioner params are all loaded as
//! untyped [`serde_json::Value`] trees (with `preserve_order`, so mappings keep
//! their authored order). This module provides the small set of operations the
//! generate pipeline needs on those trees:
//!
//! - [`parse_dot_path`] splits `containers.main.image` into its parts
//!   (`\.` escapes a literal dot)
//! - [`apply_path_override`] sets or deletes the value at a path
//! - [`merge_override`] deep-merges an override document with override-wins
//!   semantics
//! - [`parse_override_property`] parses a `PATH=VALUE` command-line entry

use anyhow::{anyhow, bail, Context};
use serde_json::{Map, Value};

/// Edit applied at a dot path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathOverride {
    /// Set the path to the value, creating intermediate mappings as needed.
    Set(Value),
    /// Remove the path. Removing a path that does not exist is a no-op.
    Delete,
}

/// Split a dot path into its parts. A backslash escapes the following dot.
pub fn parse_dot_path(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                current.push('.');
                chars.next();
            }
            '.' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

/// Parse a `PATH=VALUE` override entry.
///
/// An empty value means "delete the path". Anything else is decoded as a YAML
/// scalar or document so `foo=5` sets the number 5 and `foo=[a, b]` a sequence.
pub fn parse_override_property(entry: &str) -> anyhow::Result<(Vec<String>, PathOverride)> {
    let (path, raw_value) = entry
        .split_once('=')
        .ok_or_else(|| anyhow!("'{entry}' is invalid, expected a =-separated path and value"))?;
    if path.is_empty() {
        bail!("'{entry}' is invalid, the path is empty");
    }
    let op = if raw_value.is_empty() {
        PathOverride::Delete
    } else {
        let value: Value = serde_yaml::from_str(raw_value)
            .with_context(|| format!("'{entry}' is invalid, failed to decode the value as yaml"))?;
        PathOverride::Set(value)
    };
    Ok((parse_dot_path(path), op))
}

/// Apply a set or delete at `parts` inside `doc`.
///
/// Sequence items are addressed by their index; setting index `len` appends.
pub fn apply_path_override(doc: &mut Value, parts: &[String], op: PathOverride) -> anyhow::Result<()> {
    let Some((last, parents)) = parts.split_last() else {
        bail!("cannot override an empty path");
    };

    let mut node = doc;
    for (depth, part) in parents.iter().enumerate() {
        let here = parts[..=depth].join(".");
        node = match node {
            Value::Object(map) => {
                if !map.contains_key(part.as_str()) {
                    if matches!(op, PathOverride::Delete) {
                        return Ok(());
                    }
                    map.insert(part.clone(), Value::Object(Map::new()));
                }
                map.get_mut(part.as_str())
                    .ok_or_else(|| anyhow!("path '{here}' vanished during override"))?
            }
            Value::Array(items) => {
                let index = sequence_index(part, &here)?;
                let len = items.len();
                items
                    .get_mut(index)
                    .ok_or_else(|| anyhow!("index {index} at '{here}' is out of range (length {len})"))?
            }
            _ => bail!("cannot override '{here}': parent is not a mapping or sequence"),
        };
    }

    let full = parts.join(".");
    match (node, op) {
        (Value::Object(map), PathOverride::Set(value)) => {
            map.insert(last.clone(), value);
        }
        (Value::Object(map), PathOverride::Delete) => {
            map.shift_remove(last.as_str());
        }
        (Value::Array(items), PathOverride::Set(value)) => {
            let index = sequence_index(last, &full)?;
            match index.cmp(&items.len()) {
                std::cmp::Ordering::Less => items[index] = value,
                std::cmp::Ordering::Equal => items.push(value),
                std::cmp::Ordering::Greater => {
                    bail!("index {index} at '{full}' is out of range (length {})", items.len())
                }
            }
        }
        (Value::Array(items), PathOverride::Delete) => {
            let index = sequence_index(last, &full)?;
            if index >= items.len() {
                bail!("index {index} at '{full}' is out of range (length {})", items.len());
            }
            items.remove(index);
        }
        (Value::Null, PathOverride::Delete) => {}
        _ => bail!("cannot override '{full}': parent is not a mapping or sequence"),
    }
    Ok(())
}

fn sequence_index(part: &str, at: &str) -> anyhow::Result<usize> {
    part.parse::<usize>()
        .map_err(|_| anyhow!("'{part}' at '{at}' is not a valid sequence index"))
}

/// Deep-merge `patch` into `base`. Mappings merge key by key; for every other
/// value the patch wins. Null patch values leave the base untouched.
pub fn merge_override(base: &mut Value, patch: Value) {
    match (base, patch) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_override(existing, value),
                    None => {
                        if !value.is_null() {
                            base_map.insert(key, value);
                        }
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}
