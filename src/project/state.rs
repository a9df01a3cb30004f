use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::anyhow;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::provisioners::{NetworkService, ServicePortInfo};
use crate::workload::{ResourceSpec, Workload};

/// Class used when a resource does not name one.
pub const DEFAULT_CLASS: &str = "default";

/// Matchable identity of a resource: `type.class#id`.
///
/// Resources without an explicit id are private to their workload and get the
/// id `<workload>.<resource-name>`. An explicit id makes the resource shared by
/// every workload that declares the same type, class and id.
#[derive(Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
pub struct ResourceUid {
    resource_type: String,
    class: String,
    id: String,
}

impl ResourceUid {
    pub fn new(resource_type: impl Into<String>, class: Option<&str>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            class: class.unwrap_or(DEFAULT_CLASS).to_string(),
            id: id.into(),
        }
    }

    /// Uid of resource `name` as declared by `workload`.
    pub fn for_workload(workload: &str, name: &str, spec: &ResourceSpec) -> Self {
        let id = spec
            .id
            .clone()
            .unwrap_or_else(|| format!("{workload}.{name}"));
        Self::new(spec.resource_type.clone(), spec.class.as_deref(), id)
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Display for ResourceUid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}#{}", self.resource_type, self.class, self.id)
    }
}

impl FromStr for ResourceUid {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (type_and_class, id) = s
            .split_once('#')
            .ok_or_else(|| anyhow!("resource uid '{s}' has no '#'"))?;
        let (resource_type, class) = type_and_class
            .split_once('.')
            .ok_or_else(|| anyhow!("resource uid '{s}' has no '.' between type and class"))?;
        if resource_type.is_empty() || class.is_empty() || id.is_empty() {
            return Err(anyhow!("resource uid '{s}' has an empty type, class or id"));
        }
        Ok(Self::new(resource_type, Some(class), id))
    }
}

impl Serialize for ResourceUid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ResourceUid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<ResourceUid>()
            .map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

/// Where a resource record is in its provisioning lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStatus {
    #[default]
    Unprovisioned,
    Provisioning,
    Provisioned,
}

/// A workload merged into the project, with the file it was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadState {
    pub spec: Workload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// Durable record of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub guid: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub class: String,
    pub id: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub params: Map<String, Value>,
    pub source_workload: String,
    /// Uri of the provisioner that last provisioned this resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioner: Option<String>,
    #[serde(default)]
    pub status: ProvisionStatus,
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub outputs: Map<String, Value>,
}

impl ResourceState {
    pub fn new(uid: &ResourceUid, spec: &ResourceSpec, source_workload: &str) -> Self {
        Self {
            guid: ulid::Ulid::new().to_string(),
            resource_type: uid.resource_type().to_string(),
            class: uid.class().to_string(),
            id: uid.id().to_string(),
            metadata: spec.metadata.clone(),
            params: spec.params.clone(),
            source_workload: source_workload.to_string(),
            provisioner: None,
            status: ProvisionStatus::Unprovisioned,
            state: Map::new(),
            outputs: Map::new(),
        }
    }
}

/// Manifests materialised by provisioners, kept per resource so a resource
/// that is not re-provisioned keeps emitting what it produced last time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateExtras {
    #[serde(default)]
    pub manifests: IndexMap<ResourceUid, Vec<Value>>,
}

/// The project state persisted in `.score-k8s/state.yaml`.
///
/// Unknown top-level fields are ignored on load so older binaries can read
/// state written by newer ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub workloads: IndexMap<String, WorkloadState>,
    #[serde(default)]
    pub resources: IndexMap<ResourceUid, ResourceState>,
    #[serde(default)]
    pub shared_state: Map<String, Value>,
    #[serde(default)]
    pub extras: StateExtras,
}

impl State {
    /// Merge a workload into the project under its `metadata.name`.
    ///
    /// A workload seen before keeps its position; a new one is appended.
    pub fn add_workload(&mut self, workload: Workload, file: Option<PathBuf>) -> anyhow::Result<()> {
        let name = workload
            .name()
            .ok_or_else(|| anyhow!("workload has no metadata.name"))?
            .to_string();
        self.workloads.insert(name, WorkloadState { spec: workload, file });
        Ok(())
    }

    /// Network services exposed by every workload that declares service ports,
    /// keyed by workload name.
    pub fn workload_services(&self) -> IndexMap<String, NetworkService> {
        self.workloads
            .iter()
            .filter_map(|(name, ws)| {
                let ports: IndexMap<String, ServicePortInfo> = ws
                    .spec
                    .service_ports()
                    .map(|(port_name, port)| {
                        (
                            port_name.clone(),
                            ServicePortInfo {
                                name: port_name.clone(),
                                port: port.port,
                                target_port: port.target_port(),
                                protocol: port.protocol().to_string(),
                            },
                        )
                    })
                    .collect();
                if ports.is_empty() {
                    return None;
                }
                Some((
                    name.clone(),
                    NetworkService {
                        service_name: name.clone(),
                        ports,
                    },
                ))
            })
            .collect()
    }

    /// Resource uid for the resource `name` declared by `workload`.
    pub fn resource_uid(&self, workload: &str, name: &str) -> Option<ResourceUid> {
        let spec = self.workloads.get(workload)?.spec.resources.get(name)?;
        Some(ResourceUid::for_workload(workload, name, spec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(value: Value) -> ResourceSpec {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_uid_for_private_and_shared_resources() {
        let private = ResourceUid::for_workload("web", "db", &spec(json!({"type": "postgres"})));
        assert_eq!(private.to_string(), "postgres.default#web.db");

        let shared = ResourceUid::for_workload(
            "web",
            "db",
            &spec(json!({"type": "postgres", "class": "large", "id": "main-db"})),
        );
        assert_eq!(shared.to_string(), "postgres.large#main-db");
        assert_eq!(shared.resource_type(), "postgres");
        assert_eq!(shared.class(), "large");
        assert_eq!(shared.id(), "main-db");
    }

    #[test]
    fn test_uid_round_trips_through_string() {
        let uid: ResourceUid = "redis.cache#web.queue".parse().unwrap();
        assert_eq!(uid.resource_type(), "redis");
        assert_eq!(uid.class(), "cache");
        assert_eq!(uid.id(), "web.queue");
        assert!("no-hash".parse::<ResourceUid>().is_err());
        assert!("nodot#id".parse::<ResourceUid>().is_err());
    }

    #[test]
    fn test_state_yaml_round_trip_keeps_order() {
        let mut state = State::default();
        for name in ["zeta", "alpha"] {
            let workload: Workload = serde_json::from_value(json!({
                "apiVersion": "score.dev/v1b1",
                "metadata": {"name": name},
                "containers": {"main": {"image": "nginx"}}
            }))
            .unwrap();
            state.add_workload(workload, None).unwrap();
        }
        let encoded = serde_yaml::to_string(&state).unwrap();
        let decoded: State = serde_yaml::from_str(&encoded).unwrap();
        assert_eq!(decoded, state);
        assert_eq!(
            decoded.workloads.keys().collect::<Vec<_>>(),
            vec!["zeta", "alpha"]
        );
    }

    #[test]
    fn test_unknown_top_level_fields_ignored() {
        let decoded: State =
            serde_yaml::from_str("workloads: {}\nfuture_field: [1, 2]\n").unwrap();
        assert!(decoded.workloads.is_empty());
    }

    #[test]
    fn test_workload_services() {
        let mut state = State::default();
        let workload: Workload = serde_json::from_value(json!({
            "apiVersion": "score.dev/v1b1",
            "metadata": {"name": "web"},
            "containers": {"main": {"image": "nginx"}},
            "service": {"ports": {"http": {"port": 80, "targetPort": 8080}}}
        }))
        .unwrap();
        state.add_workload(workload, None).unwrap();
        let services = state.workload_services();
        let web = &services["web"];
        assert_eq!(web.service_name, "web");
        assert_eq!(web.ports["http"].port, 80);
        assert_eq!(web.ports["http"].target_port, 8080);
        assert_eq!(web.ports["http"].protocol, "TCP");
    }
}
