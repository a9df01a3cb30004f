//! Reading provisioner descriptors from the project directory.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use serde_json::Value;
use tracing::{debug, info};

use super::cmdprov::CmdProvisioner;
use super::templateprov::TemplateProvisioner;
use super::{Provisioner, DEFAULT_PROVISIONERS, DEFAULT_PROVISIONERS_FILE};

/// Suffix of descriptor files in the project directory.
pub const DEFAULT_SUFFIX: &str = ".provisioners.yaml";

/// Parse one descriptor, dispatching on its uri scheme.
pub fn parse_provisioner(raw: &Value) -> anyhow::Result<Box<dyn Provisioner>> {
    let uri = raw
        .get("uri")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("provisioner has no string 'uri'"))?;
    let (scheme, _) = uri
        .split_once("://")
        .ok_or_else(|| anyhow!("provisioner uri '{uri}' has no scheme"))?;
    match scheme {
        "cmd" => Ok(Box::new(CmdProvisioner::parse(raw)?)),
        "template" => Ok(Box::new(TemplateProvisioner::parse(raw)?)),
        other => bail!("unsupported provisioner scheme '{other}' in uri '{uri}'"),
    }
}

/// Parse a YAML document holding a sequence of descriptors.
pub fn load_provisioners(raw: &str) -> anyhow::Result<Vec<Box<dyn Provisioner>>> {
    let doc: Value = serde_yaml::from_str(raw).context("failed to decode yaml")?;
    let items = match doc {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => bail!("expected a sequence of provisioners"),
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_provisioner(item).with_context(|| format!("provisioner {i}")))
        .collect()
}

/// Load every `*<suffix>` file in `dir`, in file-name order.
///
/// The bundled defaults are appended when the directory does not carry its
/// own copy of them. A missing directory yields just the defaults.
pub fn load_provisioners_from_directory(
    dir: &Path,
    suffix: &str,
) -> anyhow::Result<Vec<Box<dyn Provisioner>>> {
    let mut names: Vec<String> = match fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(suffix))
            .collect(),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "no provisioner directory");
            Vec::new()
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to list provisioner directory '{}'", dir.display()))
        }
    };
    names.sort();

    let mut out = Vec::new();
    for name in &names {
        let path = dir.join(name);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read provisioner file '{}'", path.display()))?;
        let loaded = load_provisioners(&raw)
            .with_context(|| format!("invalid provisioner file '{}'", path.display()))?;
        debug!(file = %path.display(), count = loaded.len(), "loaded provisioner file");
        out.extend(loaded);
    }

    if !names.iter().any(|name| name == DEFAULT_PROVISIONERS_FILE) {
        let defaults =
            load_provisioners(DEFAULT_PROVISIONERS).context("invalid bundled provisioners")?;
        debug!(count = defaults.len(), "appending bundled default provisioners");
        out.extend(defaults);
    }

    info!(count = out.len(), "loaded provisioners");
    Ok(out)
}
