use super::*;
use crate::project::{prime_resources, ResourceUid};
use crate::secrets::encode_secret_ref;
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn state_for(raw: Value, file: Option<PathBuf>) -> State {
    let workload: Workload = serde_json::from_value(raw).unwrap();
    let mut state = State::default();
    state.add_workload(workload, file).unwrap();
    prime_resources(&mut state).unwrap();
    state
}

fn set_outputs(state: &mut State, uid: &str, outputs: Value) {
    let uid: ResourceUid = uid.parse().unwrap();
    state.resources.get_mut(&uid).unwrap().outputs = outputs.as_object().cloned().unwrap();
}

fn kinds(manifests: &[Value]) -> Vec<&str> {
    manifests.iter().map(|m| m["kind"].as_str().unwrap()).collect()
}

#[test]
fn test_deployment_and_service() {
    let state = state_for(
        json!({
            "apiVersion": "score.dev/v1b1",
            "metadata": {"name": "web", "annotations": {"team": "core"}},
            "containers": {
                "main": {
                    "image": "nginx",
                    "args": ["--port", "8080"],
                    "livenessProbe": {"httpGet": {"port": 8080, "path": "/healthz"}},
                    "resources": {"limits": {"cpu": "500m"}}
                }
            },
            "service": {"ports": {"http": {"port": 80, "targetPort": 8080}}}
        }),
        None,
    );
    let manifests = convert_workload(&state, "web", Path::new(".")).unwrap();
    assert_eq!(kinds(&manifests), vec!["Deployment", "Service"]);

    let deployment = &manifests[0];
    assert_eq!(deployment["metadata"]["annotations"]["team"], json!("core"));
    assert_eq!(
        deployment["spec"]["selector"]["matchLabels"]["app.kubernetes.io/instance"],
        json!("web")
    );
    let container = &deployment["spec"]["template"]["spec"]["containers"][0];
    assert_eq!(container["name"], json!("main"));
    assert_eq!(container["args"], json!(["--port", "8080"]));
    assert_eq!(container["livenessProbe"]["httpGet"]["path"], json!("/healthz"));
    assert_eq!(container["resources"]["limits"]["cpu"], json!("500m"));

    let service = &manifests[1];
    assert_eq!(
        service["spec"]["ports"][0],
        json!({"name": "http", "port": 80, "targetPort": 8080, "protocol": "TCP"})
    );
}

#[test]
fn test_variables_substitute_outputs_and_secret_refs() {
    let mut state = state_for(
        json!({
            "apiVersion": "score.dev/v1b1",
            "metadata": {"name": "web"},
            "containers": {
                "main": {
                    "image": "nginx",
                    "variables": {
                        "DB_HOST": "${resources.db.host}",
                        "DB_PASSWORD": "${resources.db.password}",
                        "LITERAL": "$${NOT_EXPANDED}"
                    }
                }
            },
            "resources": {"db": {"type": "postgres"}}
        }),
        None,
    );
    set_outputs(
        &mut state,
        "postgres.default#web.db",
        json!({"host": "pg", "password": encode_secret_ref("pg-creds", "password")}),
    );
    let manifests = convert_workload(&state, "web", Path::new(".")).unwrap();
    let env = &manifests[0]["spec"]["template"]["spec"]["containers"][0]["env"];
    assert_eq!(env[0], json!({"name": "DB_HOST", "value": "pg"}));
    assert_eq!(
        env[1],
        json!({
            "name": "DB_PASSWORD",
            "valueFrom": {"secretKeyRef": {"name": "pg-creds", "key": "password"}}
        })
    );
    assert_eq!(env[2], json!({"name": "LITERAL", "value": "${NOT_EXPANDED}"}));
}

#[test]
fn test_files_become_config_map() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("app.conf"), "name=${metadata.name}").unwrap();
    let state = state_for(
        json!({
            "apiVersion": "score.dev/v1b1",
            "metadata": {"name": "web"},
            "containers": {
                "main": {
                    "image": "nginx",
                    "files": {
                        "/etc/app.conf": {"source": "app.conf", "mode": "0644"},
                        "/etc/raw.txt": {"content": "${keep}", "noExpand": true}
                    }
                }
            }
        }),
        Some(dir.path().join("score.yaml")),
    );
    let manifests = convert_workload(&state, "web", Path::new(".")).unwrap();
    assert_eq!(kinds(&manifests), vec!["ConfigMap", "Deployment"]);
    assert_eq!(manifests[0]["metadata"]["name"], json!("web-main-files"));
    assert_eq!(manifests[0]["data"]["file-0"], json!("name=web"));
    assert_eq!(manifests[0]["data"]["file-1"], json!("${keep}"));

    let pod = &manifests[1]["spec"]["template"]["spec"];
    assert_eq!(pod["volumes"][0]["configMap"]["items"][0]["mode"], json!(0o644));
    let mounts = &pod["containers"][0]["volumeMounts"];
    assert_eq!(mounts[0]["mountPath"], json!("/etc/app.conf"));
    assert_eq!(mounts[0]["subPath"], json!("file-0"));
}

#[test]
fn test_volume_from_resource_source() {
    let mut state = state_for(
        json!({
            "apiVersion": "score.dev/v1b1",
            "metadata": {"name": "web"},
            "containers": {
                "main": {
                    "image": "nginx",
                    "volumes": {"/data": {"source": "${resources.data}", "readOnly": true}}
                }
            },
            "resources": {"data": {"type": "volume"}}
        }),
        None,
    );
    set_outputs(
        &mut state,
        "volume.default#web.data",
        json!({"source": {"emptyDir": {}}}),
    );
    let manifests = convert_workload(&state, "web", Path::new(".")).unwrap();
    let pod = &manifests[0]["spec"]["template"]["spec"];
    assert_eq!(pod["volumes"][0], json!({"emptyDir": {}, "name": "vol-0"}));
    assert_eq!(
        pod["containers"][0]["volumeMounts"][0],
        json!({"name": "vol-0", "mountPath": "/data", "readOnly": true})
    );
}

#[test]
fn test_volume_requires_resource_reference() {
    let state = state_for(
        json!({
            "apiVersion": "score.dev/v1b1",
            "metadata": {"name": "web"},
            "containers": {
                "main": {"image": "nginx", "volumes": {"/data": {"source": "hostpath"}}}
            }
        }),
        None,
    );
    let err = format!("{:#}", convert_workload(&state, "web", Path::new(".")).unwrap_err());
    assert!(err.contains("containers.main.volumes./data"), "{err}");
}

#[test]
fn test_unknown_placeholder_fails_with_location() {
    let state = state_for(
        json!({
            "apiVersion": "score.dev/v1b1",
            "metadata": {"name": "web"},
            "containers": {"main": {"image": "nginx", "variables": {"X": "${metadata.nope}"}}}
        }),
        None,
    );
    let err = format!("{:#}", convert_workload(&state, "web", Path::new(".")).unwrap_err());
    assert!(err.contains("variables.X"), "{err}");
}
