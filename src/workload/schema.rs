use anyhow::{anyhow, bail, Context};
use once_cell::sync::Lazy;
use serde_json::{Map, Value};

use super::Workload;

const SCORE_V1B1_SCHEMA: &str = include_str!("score-v1b1.schema.json");

static SCHEMA: Lazy<Result<jsonschema::Validator, String>> = Lazy::new(|| {
    let schema: Value = serde_json::from_str(SCORE_V1B1_SCHEMA).map_err(|e| e.to_string())?;
    jsonschema::validator_for(&schema).map_err(|e| e.to_string())
});

/// Validate a raw workload document against the bundled Score schema.
///
/// All violations are reported together, one per line.
pub fn validate_workload(raw: &Value) -> anyhow::Result<()> {
    let validator = SCHEMA
        .as_ref()
        .map_err(|e| anyhow!("bundled score schema is invalid: {e}"))?;
    let issues: Vec<String> = validator
        .iter_errors(raw)
        .map(|err| err.to_string())
        .collect();
    if !issues.is_empty() {
        bail!("workload does not match the score schema:\n  {}", issues.join("\n  "));
    }
    Ok(())
}

/// Decode a validated workload document into the typed model.
pub fn decode_workload(raw: Value) -> anyhow::Result<Workload> {
    serde_json::from_value(raw).context("failed to decode workload")
}

/// Rewrite legacy but unambiguous shapes into the current schema and report
/// each change that was made.
///
/// - `containers.*.files` given as a sequence of `{target, ...}` becomes a
///   mapping keyed by target
/// - `containers.*.volumes` given as a sequence likewise
pub fn apply_upgrade_transforms(raw: &mut Value) -> anyhow::Result<Vec<String>> {
    let mut changes = Vec::new();
    let Some(containers) = raw.get_mut("containers").and_then(Value::as_object_mut) else {
        return Ok(changes);
    };
    for (name, container) in containers.iter_mut() {
        let Some(container) = container.as_object_mut() else {
            continue;
        };
        for field in ["files", "volumes"] {
            let keyed = match container.get(field) {
                Some(Value::Array(items)) => key_by_target(items)
                    .with_context(|| format!("containers.{name}.{field}: cannot upgrade sequence form"))?,
                _ => continue,
            };
            container.insert(field.to_string(), Value::Object(keyed));
            changes.push(format!("containers.{name}.{field}: converted sequence to mapping"));
        }
    }
    Ok(changes)
}

fn key_by_target(items: &[Value]) -> anyhow::Result<Map<String, Value>> {
    let mut out = Map::new();
    for (i, item) in items.iter().enumerate() {
        let mut entry = item
            .as_object()
            .cloned()
            .ok_or_else(|| anyhow!("item {i} is not a mapping"))?;
        let target = match entry.shift_remove("target") {
            Some(Value::String(target)) => target,
            _ => bail!("item {i} has no string 'target'"),
        };
        if out.contains_key(&target) {
            bail!("item {i} repeats target '{target}'");
        }
        out.insert(target, Value::Object(entry));
    }
    Ok(out)
}
