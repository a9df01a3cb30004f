use anyhow::{anyhow, bail};
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::document::parse_dot_path;
use crate::project::{ResourceState, State};

/// Resolves `${...}` references inside one workload.
///
/// - `${metadata.<path>}` reads the workload metadata
/// - `${resources.<name>.<path>}` reads the outputs of the workload's resource
/// - `$${` is a literal `${`
pub struct Substituter<'a> {
    metadata: &'a Map<String, Value>,
    resources: IndexMap<&'a str, &'a ResourceState>,
}

impl<'a> Substituter<'a> {
    pub fn new(state: &'a State, workload: &str) -> anyhow::Result<Self> {
        let ws = state
            .workloads
            .get(workload)
            .ok_or_else(|| anyhow!("workload '{workload}' is not in the project"))?;
        let mut resources = IndexMap::new();
        for name in ws.spec.resources.keys() {
            let uid = state
                .resource_uid(workload, name)
                .ok_or_else(|| anyhow!("resource '{name}' has no uid"))?;
            let record = state
                .resources
                .get(&uid)
                .ok_or_else(|| anyhow!("resource '{uid}' has not been primed"))?;
            resources.insert(name.as_str(), record);
        }
        Ok(Self {
            metadata: &ws.spec.metadata,
            resources,
        })
    }

    /// The outputs of resource `name`.
    pub fn resource_outputs(&self, name: &str) -> anyhow::Result<&'a Map<String, Value>> {
        self.resources
            .get(name)
            .map(|record| &record.outputs)
            .ok_or_else(|| anyhow!("resource '{name}' is not declared by the workload"))
    }

    /// Resolve a reference such as `resources.db.host`.
    pub fn lookup(&self, reference: &str) -> anyhow::Result<Value> {
        let parts = parse_dot_path(reference);
        let (root, rest): (&Map<String, Value>, &[String]) = match parts.as_slice() {
            [first, rest @ ..] if first == "metadata" => (self.metadata, rest),
            [first, name, rest @ ..] if first == "resources" => (self.resource_outputs(name)?, rest),
            _ => bail!("invalid ref '{reference}': unknown reference root"),
        };
        let Some((first, path)) = rest.split_first() else {
            return Ok(Value::Object(root.clone()));
        };
        let mut node = root.get(first.as_str());
        for part in path {
            node = match node {
                Some(Value::Object(map)) => map.get(part.as_str()),
                Some(Value::Array(items)) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
        }
        node.cloned()
            .ok_or_else(|| anyhow!("invalid ref '{reference}': key not found"))
    }

    /// Replace every placeholder in `input`.
    pub fn substitute(&self, input: &str) -> anyhow::Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix("$${") {
                out.push_str("${");
                rest = after;
            } else if let Some(after) = tail.strip_prefix("${") {
                let end = after
                    .find('}')
                    .ok_or_else(|| anyhow!("unterminated placeholder in '{input}'"))?;
                out.push_str(&render_scalar(self.lookup(&after[..end])?));
                rest = &after[end + 1..];
            } else {
                out.push('$');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn render_scalar(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
