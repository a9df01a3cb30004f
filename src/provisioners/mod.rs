//! # Provisioners Module
//!
//! A provisioner creates or describes the backing resource behind a workload
//! dependency. Each one is selected by resource type, and optionally class and
//! id, and exchanges a [`ProvisionInput`] for a [`ProvisionOutput`].
//!
//! ## Variants
//!
//! - **`cmd://`** ([`cmdprov::CmdProvisioner`]) - resolves an executable from
//!   the uri, renders its argument list, writes the input as JSON on stdin and
//!   decodes a strict JSON object from stdout
//! - **`template://`** ([`templateprov::TemplateProvisioner`]) - renders
//!   state, outputs and manifests in-process from templates
//!
//! Descriptors are read from `*.provisioners.yaml` files in the project
//! directory by [`loader`] and driven in sequence by [`orchestrate`].
//!
//! ## Wire format
//!
//! The JSON written to a command provisioner's stdin:
//!
//! ```json
//! {
//!   "resource_guid": "01J...",
//!   "resource_uid": "postgres.default#web.db",
//!   "resource_type": "postgres",
//!   "resource_class": "default",
//!   "resource_id": "web.db",
//!   "resource_params": {},
//!   "resource_metadata": {},
//!   "resource_state": {},
//!   "shared_state": {},
//!   "source_workload": "web",
//!   "workload_services": {"web": {"service_name": "web", "ports": {}}}
//! }
//! ```
//!
//! The object read back may only contain `resource_state`,
//! `resource_outputs`, `shared_state` and `manifests`.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::project::{ResourceState, ResourceUid};

pub mod cmdprov;
pub mod loader;
pub mod orchestrate;
pub mod process;
pub mod template;
pub mod templateprov;

pub use cmdprov::uri::ResolveError;
pub use loader::{load_provisioners, load_provisioners_from_directory, DEFAULT_SUFFIX};
pub use orchestrate::provision_resources;

/// Descriptors written by `init` as `zz-default.provisioners.yaml`.
pub const DEFAULT_PROVISIONERS: &str = include_str!("default.provisioners.yaml");

/// File name the bundled defaults are written to; sorts after user files.
pub const DEFAULT_PROVISIONERS_FILE: &str = "zz-default.provisioners.yaml";

/// A unit that can provision resources matching its selector.
#[async_trait]
pub trait Provisioner: Send + Sync + fmt::Debug {
    /// The uri the provisioner was declared with.
    fn uri(&self) -> &str;

    /// Whether this provisioner handles the resource.
    fn matches(&self, uid: &ResourceUid) -> bool;

    async fn provision(
        &self,
        input: &ProvisionInput,
        ctx: &ProvisionContext,
    ) -> Result<ProvisionOutput, ProvisionError>;
}

/// Type must be equal; class and id must be equal when the selector names
/// them.
pub(crate) fn selector_matches(
    resource_type: &str,
    class: Option<&str>,
    id: Option<&str>,
    uid: &ResourceUid,
) -> bool {
    resource_type == uid.resource_type()
        && class.is_none_or(|c| c == uid.class())
        && id.is_none_or(|i| i == uid.id())
}

/// Cancellation and deadline for provisioner calls.
#[derive(Debug, Clone, Default)]
pub struct ProvisionContext {
    pub cancel: CancellationToken,
    pub timeout: Option<Duration>,
}

impl ProvisionContext {
    pub fn new(cancel: CancellationToken, timeout: Option<Duration>) -> Self {
        Self { cancel, timeout }
    }
}

/// One port of a workload service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePortInfo {
    pub name: String,
    pub port: u16,
    pub target_port: u16,
    pub protocol: String,
}

/// How other workloads reach a workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkService {
    pub service_name: String,
    pub ports: IndexMap<String, ServicePortInfo>,
}

/// Snapshot of one resource handed to a provisioner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionInput {
    pub resource_guid: String,
    pub resource_uid: String,
    pub resource_type: String,
    pub resource_class: String,
    pub resource_id: String,
    pub resource_params: Map<String, Value>,
    pub resource_metadata: Map<String, Value>,
    pub resource_state: Map<String, Value>,
    pub shared_state: Map<String, Value>,
    pub source_workload: String,
    pub workload_services: IndexMap<String, NetworkService>,
}

impl ProvisionInput {
    pub fn new(
        uid: &ResourceUid,
        record: &ResourceState,
        shared_state: &Map<String, Value>,
        workload_services: &IndexMap<String, NetworkService>,
    ) -> Self {
        Self {
            resource_guid: record.guid.clone(),
            resource_uid: uid.to_string(),
            resource_type: uid.resource_type().to_string(),
            resource_class: uid.class().to_string(),
            resource_id: uid.id().to_string(),
            resource_params: record.params.clone(),
            resource_metadata: record.metadata.clone(),
            resource_state: record.state.clone(),
            shared_state: shared_state.clone(),
            source_workload: record.source_workload.clone(),
            workload_services: workload_services.clone(),
        }
    }
}

/// What a provisioner hands back. Any other field is a decode error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionOutput {
    /// Replaces the resource's stored state when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_state: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_outputs: Option<Map<String, Value>>,
    /// Merged into the shared state; a null value deletes the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_state: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifests: Option<Vec<Value>>,
}

/// Failure of a single provisioner call.
#[derive(Debug)]
pub enum ProvisionError {
    /// The uri could not be turned into an executable path
    Resolve(ResolveError),
    /// An argument or template failed to render
    Template { template: String, message: String },
    /// The input could not be encoded as JSON
    EncodeInput(serde_json::Error),
    /// The process could not be started
    Spawn {
        binary: PathBuf,
        source: std::io::Error,
    },
    /// Reading or writing the process pipes failed
    Io {
        binary: PathBuf,
        source: std::io::Error,
    },
    NonZeroExit { binary: PathBuf, status: ExitStatus },
    /// Stdout was not a valid output object
    BadOutput {
        binary: PathBuf,
        source: serde_json::Error,
    },
    /// A rendered template was not the YAML shape its field requires
    InvalidTemplateOutput { field: String, message: String },
    Cancelled { binary: PathBuf },
    TimedOut { binary: PathBuf, after: Duration },
}

impl fmt::Display for ProvisionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionError::Resolve(err) => write!(f, "failed to resolve provisioner binary: {err}"),
            ProvisionError::Template { template, message } => {
                write!(f, "failed to render template '{template}': {message}")
            }
            ProvisionError::EncodeInput(err) => write!(f, "failed to encode json input: {err}"),
            ProvisionError::Spawn { binary, source } => {
                write!(f, "failed to start '{}': {source}", binary.display())
            }
            ProvisionError::Io { binary, source } => {
                write!(f, "i/o error talking to '{}': {source}", binary.display())
            }
            ProvisionError::NonZeroExit { binary, status } => {
                write!(f, "provisioner '{}' exited unsuccessfully: {status}", binary.display())
            }
            ProvisionError::BadOutput { binary, source } => write!(
                f,
                "bad provisioner output from '{}': {source}",
                binary.display()
            ),
            ProvisionError::InvalidTemplateOutput { field, message } => {
                write!(f, "template '{field}' did not render valid yaml: {message}")
            }
            ProvisionError::Cancelled { binary } => {
                write!(f, "provisioner '{}' was cancelled", binary.display())
            }
            ProvisionError::TimedOut { binary, after } => write!(
                f,
                "provisioner '{}' timed out after {}s",
                binary.display(),
                after.as_secs_f64()
            ),
        }
    }
}

impl std::error::Error for ProvisionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProvisionError::Resolve(err) => Some(err),
            ProvisionError::EncodeInput(err) => Some(err),
            ProvisionError::Spawn { source, .. } | ProvisionError::Io { source, .. } => Some(source),
            ProvisionError::BadOutput { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ResolveError> for ProvisionError {
    fn from(err: ResolveError) -> Self {
        ProvisionError::Resolve(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_selector_wildcards() {
        let uid: ResourceUid = "postgres.large#main".parse().unwrap();
        assert!(selector_matches("postgres", None, None, &uid));
        assert!(selector_matches("postgres", Some("large"), None, &uid));
        assert!(selector_matches("postgres", Some("large"), Some("main"), &uid));
        assert!(!selector_matches("postgres", Some("small"), None, &uid));
        assert!(!selector_matches("postgres", None, Some("other"), &uid));
        assert!(!selector_matches("redis", None, None, &uid));
    }

    #[test]
    fn test_output_rejects_unknown_field() {
        let ok: ProvisionOutput = serde_json::from_value(json!({
            "resource_outputs": {"host": "db"},
            "manifests": []
        }))
        .unwrap();
        assert_eq!(ok.resource_outputs.unwrap()["host"], json!("db"));

        let err = serde_json::from_value::<ProvisionOutput>(json!({
            "resource_outputs": {"host": "db"},
            "resource_state": {},
            "shared_state": {},
            "manifests": [],
            "extra": true
        }))
        .unwrap_err();
        assert!(err.to_string().contains("extra"), "{err}");
    }

    #[test]
    fn test_input_serialises_snake_case_fields() {
        let uid: ResourceUid = "postgres.default#web.db".parse().unwrap();
        let record = ResourceState {
            guid: "g".into(),
            resource_type: "postgres".into(),
            class: "default".into(),
            id: "web.db".into(),
            metadata: Map::new(),
            params: Map::new(),
            source_workload: "web".into(),
            provisioner: None,
            status: Default::default(),
            state: Map::new(),
            outputs: Map::new(),
        };
        let input = ProvisionInput::new(&uid, &record, &Map::new(), &IndexMap::new());
        let encoded = serde_json::to_value(&input).unwrap();
        assert_eq!(encoded["resource_uid"], json!("postgres.default#web.db"));
        assert_eq!(encoded["source_workload"], json!("web"));
        assert!(encoded["workload_services"].as_object().unwrap().is_empty());
    }
}
