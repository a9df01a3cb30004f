use std::collections::HashMap;

use anyhow::bail;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::state::{ProvisionStatus, ResourceState, ResourceUid, State};

/// The parts of a resource record that, when changed, force re-provisioning.
#[derive(PartialEq)]
struct Definition {
    params: Map<String, Value>,
    metadata: Map<String, Value>,
    source_workload: String,
}

impl Definition {
    fn of(record: &ResourceState) -> Self {
        Self {
            params: record.params.clone(),
            metadata: record.metadata.clone(),
            source_workload: record.source_workload.clone(),
        }
    }
}

/// Discover every resource the project's workloads declare and reconcile it
/// with the records already in state.
///
/// - resources are ordered by workload order, then declaration order
/// - an existing record keeps its guid, state, outputs and status unless its
///   definition changed, in which case it goes back to `unprovisioned`
/// - a shared resource declared by several workloads must agree on params;
///   metadata is merged, first declaration wins per key
/// - records no longer declared by any workload are dropped together with
///   their materialised manifests
pub fn prime_resources(state: &mut State) -> anyhow::Result<()> {
    let mut primed: IndexMap<ResourceUid, ResourceState> = IndexMap::new();
    let mut previous: HashMap<ResourceUid, Definition> = HashMap::new();

    for (workload_name, ws) in &state.workloads {
        for (res_name, spec) in &ws.spec.resources {
            let uid = ResourceUid::for_workload(workload_name, res_name, spec);

            if let Some(existing) = primed.get_mut(&uid) {
                if !spec.params.is_empty() {
                    if existing.params.is_empty() {
                        existing.params = spec.params.clone();
                    } else if existing.params != spec.params {
                        bail!(
                            "resource '{uid}': workloads '{}' and '{workload_name}' declare it with different params",
                            existing.source_workload
                        );
                    }
                }
                for (key, value) in &spec.metadata {
                    existing
                        .metadata
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
                continue;
            }

            let fresh = ResourceState::new(&uid, spec, workload_name);
            let record = match state.resources.get(&uid) {
                Some(known) => {
                    previous.insert(uid.clone(), Definition::of(known));
                    ResourceState {
                        guid: known.guid.clone(),
                        provisioner: known.provisioner.clone(),
                        status: known.status,
                        state: known.state.clone(),
                        outputs: known.outputs.clone(),
                        ..fresh
                    }
                }
                None => {
                    debug!(uid = %uid, workload = %workload_name, "new resource");
                    fresh
                }
            };
            primed.insert(uid, record);
        }
    }

    for (uid, record) in primed.iter_mut() {
        let unchanged = previous
            .get(uid)
            .is_some_and(|before| *before == Definition::of(record));
        if record.status != ProvisionStatus::Provisioned || !unchanged {
            record.status = ProvisionStatus::Unprovisioned;
        }
    }

    for uid in state.resources.keys().filter(|uid| !primed.contains_key(*uid)) {
        info!(uid = %uid, "dropping resource no longer declared by any workload");
    }
    state
        .extras
        .manifests
        .retain(|uid, _| primed.contains_key(uid));
    state.resources = primed;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::Workload;
    use serde_json::json;

    fn workload(name: &str, resources: Value) -> Workload {
        serde_json::from_value(json!({
            "apiVersion": "score.dev/v1b1",
            "metadata": {"name": name},
            "containers": {"main": {"image": "nginx"}},
            "resources": resources
        }))
        .unwrap()
    }

    fn state_with(workloads: Vec<Workload>) -> State {
        let mut state = State::default();
        for w in workloads {
            state.add_workload(w, None).unwrap();
        }
        state
    }

    #[test]
    fn test_primes_in_workload_then_declaration_order() {
        let mut state = state_with(vec![
            workload("web", json!({"db": {"type": "postgres"}, "cache": {"type": "redis"}})),
            workload("api", json!({"dns": {"type": "dns"}})),
        ]);
        prime_resources(&mut state).unwrap();
        let uids: Vec<String> = state.resources.keys().map(|u| u.to_string()).collect();
        assert_eq!(
            uids,
            vec![
                "postgres.default#web.db",
                "redis.default#web.cache",
                "dns.default#api.dns"
            ]
        );
        assert!(state
            .resources
            .values()
            .all(|r| r.status == ProvisionStatus::Unprovisioned));
    }

    #[test]
    fn test_shared_resource_is_primed_once() {
        let mut state = state_with(vec![
            workload("web", json!({"db": {"type": "postgres", "id": "main"}})),
            workload("api", json!({"database": {"type": "postgres", "id": "main"}})),
        ]);
        prime_resources(&mut state).unwrap();
        assert_eq!(state.resources.len(), 1);
        let record = state.resources.values().next().unwrap();
        assert_eq!(record.source_workload, "web");
    }

    #[test]
    fn test_shared_resource_conflicting_params_fails() {
        let mut state = state_with(vec![
            workload("web", json!({"db": {"type": "postgres", "id": "main", "params": {"v": 1}}})),
            workload("api", json!({"db": {"type": "postgres", "id": "main", "params": {"v": 2}}})),
        ]);
        let err = prime_resources(&mut state).unwrap_err().to_string();
        assert!(err.contains("postgres.default#main"), "{err}");
    }

    #[test]
    fn test_existing_provisioned_record_is_kept() {
        let mut state = state_with(vec![workload("web", json!({"db": {"type": "postgres"}}))]);
        prime_resources(&mut state).unwrap();
        let uid = state.resources.keys().next().unwrap().clone();
        {
            let record = state.resources.get_mut(&uid).unwrap();
            record.status = ProvisionStatus::Provisioned;
            record.outputs.insert("host".into(), json!("db.local"));
        }
        let guid = state.resources[&uid].guid.clone();

        prime_resources(&mut state).unwrap();
        let record = &state.resources[&uid];
        assert_eq!(record.guid, guid);
        assert_eq!(record.status, ProvisionStatus::Provisioned);
        assert_eq!(record.outputs["host"], json!("db.local"));
    }

    #[test]
    fn test_changed_params_force_reprovision() {
        let mut state = state_with(vec![workload("web", json!({"db": {"type": "postgres"}}))]);
        prime_resources(&mut state).unwrap();
        let uid = state.resources.keys().next().unwrap().clone();
        state.resources.get_mut(&uid).unwrap().status = ProvisionStatus::Provisioned;

        state
            .add_workload(
                workload("web", json!({"db": {"type": "postgres", "params": {"size": "large"}}})),
                None,
            )
            .unwrap();
        prime_resources(&mut state).unwrap();
        assert_eq!(state.resources[&uid].status, ProvisionStatus::Unprovisioned);
    }

    #[test]
    fn test_interrupted_provisioning_is_retried() {
        let mut state = state_with(vec![workload("web", json!({"db": {"type": "postgres"}}))]);
        prime_resources(&mut state).unwrap();
        let uid = state.resources.keys().next().unwrap().clone();
        state.resources.get_mut(&uid).unwrap().status = ProvisionStatus::Provisioning;
        prime_resources(&mut state).unwrap();
        assert_eq!(state.resources[&uid].status, ProvisionStatus::Unprovisioned);
    }

    #[test]
    fn test_undeclared_resources_and_manifests_dropped() {
        let mut state = state_with(vec![workload("web", json!({"db": {"type": "postgres"}}))]);
        prime_resources(&mut state).unwrap();
        let uid = state.resources.keys().next().unwrap().clone();
        state
            .extras
            .manifests
            .insert(uid.clone(), vec![json!({"kind": "Secret"})]);

        state
            .add_workload(workload("web", json!({})), None)
            .unwrap();
        prime_resources(&mut state).unwrap();
        assert!(state.resources.is_empty());
        assert!(state.extras.manifests.is_empty());
    }
}
