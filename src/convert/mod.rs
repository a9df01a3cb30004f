//! # Convert Module
//!
//! Turns one workload of the project into Kubernetes manifests:
//!
//! - a `ConfigMap` per container that declares files
//! - a `Deployment` running every container
//! - a `Service` when the workload declares ports
//!
//! Container commands, args, variables and file contents may reference
//! workload metadata and resource outputs through `${...}` placeholders. A
//! variable whose value is exactly one secret reference becomes a
//! `secretKeyRef` instead of a literal value.

mod placeholders;

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::project::State;
use crate::secrets::decode_secret_ref;
use crate::workload::{Container, ContainerFile, Probe, Workload};

pub use placeholders::Substituter;

/// Label and `managed-by` value stamped on every generated object.
pub const MANAGED_BY: &str = "score-k8s";

/// Convert workload `name` into manifests, in emission order.
///
/// File sources are read relative to the workload file, which is itself
/// relative to `root`.
pub fn convert_workload(state: &State, name: &str, root: &Path) -> anyhow::Result<Vec<Value>> {
    let ws = state
        .workloads
        .get(name)
        .ok_or_else(|| anyhow!("workload '{name}' is not in the project"))?;
    let workload = &ws.spec;
    let subst = Substituter::new(state, name)?;
    let base_dir = match ws.file.as_deref().and_then(Path::parent) {
        Some(parent) => root.join(parent),
        None => root.to_path_buf(),
    };
    let base_dir = base_dir.as_path();
    let labels = labels(name);

    let mut manifests = Vec::new();
    let mut containers = Vec::new();
    let mut volumes = Vec::new();

    for (container_name, container) in &workload.containers {
        let mut mounts = Vec::new();

        if !container.files.is_empty() {
            let config_map = format!("{name}-{container_name}-files");
            let volume_name = format!("files-{container_name}");
            let mut data = Map::new();
            let mut items = Vec::new();
            for (i, (target, file)) in container.files.iter().enumerate() {
                let key = format!("file-{i}");
                let content = file_content(file, base_dir, &subst)
                    .with_context(|| format!("containers.{container_name}.files.{target}"))?;
                data.insert(key.clone(), Value::String(content));
                let mut item = json!({"key": key, "path": key});
                if let Some(mode) = &file.mode {
                    let mode = u32::from_str_radix(mode, 8).with_context(|| {
                        format!("containers.{container_name}.files.{target}: invalid mode '{mode}'")
                    })?;
                    item["mode"] = json!(mode);
                }
                items.push(item);
                mounts.push(json!({
                    "name": volume_name,
                    "mountPath": target,
                    "subPath": key,
                    "readOnly": true
                }));
            }
            manifests.push(json!({
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"name": config_map, "labels": labels},
                "data": data
            }));
            volumes.push(json!({
                "name": volume_name,
                "configMap": {"name": config_map, "items": items}
            }));
        }

        for (target, volume) in &container.volumes {
            let at = format!("containers.{container_name}.volumes.{target}");
            let resource = volume
                .source
                .strip_prefix("${resources.")
                .and_then(|s| s.strip_suffix('}'))
                .filter(|s| !s.contains('.'))
                .ok_or_else(|| {
                    anyhow!("{at}: source must be a resource reference like '${{resources.<name>}}'")
                })?;
            let source = match subst.resource_outputs(resource)?.get("source") {
                Some(Value::Object(source)) => source.clone(),
                _ => bail!("{at}: resource '{resource}' does not output a volume 'source' mapping"),
            };
            let volume_name = format!("vol-{}", volumes.len());
            let mut spec = source;
            spec.insert("name".into(), Value::String(volume_name.clone()));
            volumes.push(Value::Object(spec));

            let mut mount = json!({"name": volume_name, "mountPath": target});
            if let Some(path) = &volume.path {
                mount["subPath"] = json!(path);
            }
            if volume.read_only == Some(true) {
                mount["readOnly"] = json!(true);
            }
            mounts.push(mount);
        }

        containers.push(
            container_spec(container_name, container, &subst, mounts)
                .with_context(|| format!("containers.{container_name}"))?,
        );
    }

    let mut pod_spec = json!({"containers": containers});
    if !volumes.is_empty() {
        pod_spec["volumes"] = Value::Array(volumes);
    }
    let mut object_meta = json!({"name": name, "labels": labels});
    if let Some(annotations) = workload.metadata.get("annotations") {
        object_meta["annotations"] = annotations.clone();
    }
    manifests.push(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": object_meta,
        "spec": {
            "selector": {"matchLabels": selector(name)},
            "template": {
                "metadata": {"labels": labels},
                "spec": pod_spec
            }
        }
    }));

    if let Some(service) = service(name, workload) {
        manifests.push(service);
    }

    debug!(workload = name, count = manifests.len(), "converted workload");
    Ok(manifests)
}

fn labels(name: &str) -> Value {
    json!({
        "app.kubernetes.io/name": name,
        "app.kubernetes.io/instance": name,
        "app.kubernetes.io/managed-by": MANAGED_BY
    })
}

fn selector(name: &str) -> Value {
    json!({"app.kubernetes.io/instance": name})
}

fn file_content(file: &ContainerFile, base_dir: &Path, subst: &Substituter) -> anyhow::Result<String> {
    let raw = match (&file.content, &file.source) {
        (Some(content), _) => content.clone(),
        (None, Some(source)) => {
            let path = base_dir.join(source);
            fs::read_to_string(&path)
                .with_context(|| format!("failed to read file source '{}'", path.display()))?
        }
        (None, None) => bail!("file has neither content nor source"),
    };
    if file.no_expand {
        Ok(raw)
    } else {
        subst.substitute(&raw)
    }
}

fn container_spec(
    name: &str,
    container: &Container,
    subst: &Substituter,
    mounts: Vec<Value>,
) -> anyhow::Result<Value> {
    let mut spec = json!({"name": name, "image": container.image});
    if !container.command.is_empty() {
        spec["command"] = json!(substitute_all(&container.command, subst)?);
    }
    if !container.args.is_empty() {
        spec["args"] = json!(substitute_all(&container.args, subst)?);
    }
    if !container.variables.is_empty() {
        let mut env = Vec::new();
        for (key, value) in &container.variables {
            let value = subst
                .substitute(value)
                .with_context(|| format!("variables.{key}"))?;
            env.push(match decode_secret_ref(&value) {
                Some((secret, secret_key)) => json!({
                    "name": key,
                    "valueFrom": {"secretKeyRef": {"name": secret, "key": secret_key}}
                }),
                None => json!({"name": key, "value": value}),
            });
        }
        spec["env"] = Value::Array(env);
    }
    if let Some(resources) = &container.resources {
        spec["resources"] = serde_json::to_value(resources)?;
    }
    if let Some(probe) = &container.liveness_probe {
        spec["livenessProbe"] = probe_spec(probe);
    }
    if let Some(probe) = &container.readiness_probe {
        spec["readinessProbe"] = probe_spec(probe);
    }
    if !mounts.is_empty() {
        spec["volumeMounts"] = Value::Array(mounts);
    }
    Ok(spec)
}

fn substitute_all(items: &[String], subst: &Substituter) -> anyhow::Result<Vec<String>> {
    items.iter().map(|item| subst.substitute(item)).collect()
}

fn probe_spec(probe: &Probe) -> Value {
    let mut out = Map::new();
    if let Some(http) = &probe.http_get {
        let mut get = json!({"port": http.port});
        if let Some(path) = &http.path {
            get["path"] = json!(path);
        }
        if let Some(host) = &http.host {
            get["host"] = json!(host);
        }
        if let Some(scheme) = &http.scheme {
            get["scheme"] = json!(scheme);
        }
        if !http.http_headers.is_empty() {
            get["httpHeaders"] = json!(http.http_headers);
        }
        out.insert("httpGet".into(), get);
    }
    if let Some(exec) = &probe.exec {
        out.insert("exec".into(), json!({"command": exec.command}));
    }
    Value::Object(out)
}

fn service(name: &str, workload: &Workload) -> Option<Value> {
    let ports: Vec<Value> = workload
        .service_ports()
        .map(|(port_name, port)| {
            json!({
                "name": port_name,
                "port": port.port,
                "targetPort": port.target_port(),
                "protocol": port.protocol()
            })
        })
        .collect();
    if ports.is_empty() {
        return None;
    }
    Some(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {"name": name, "labels": labels(name)},
        "spec": {"selector": selector(name), "ports": ports}
    }))
}

#[cfg(test)]
mod tests;
