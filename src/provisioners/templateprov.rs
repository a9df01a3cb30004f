//! `template://` provisioners: resources described entirely by templates.
//!
//! Each field is a template that renders to YAML. They are rendered in order
//! and each result is visible to the ones after it:
//!
//! 1. `init` - scratch values, exposed as `init`
//! 2. `state` - replaces the resource state, exposed as `state`
//! 3. `shared` - merged into the shared state, exposed as `shared`
//! 4. `outputs` - the resource outputs
//! 5. `manifests` - a sequence of manifests

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::orchestrate::apply_shared_delta;
use super::{
    selector_matches, template, ProvisionContext, ProvisionError, ProvisionInput,
    ProvisionOutput, Provisioner,
};
use crate::project::ResourceUid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateProvisioner {
    uri: String,
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    init: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    shared: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outputs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    manifests: Option<String>,
}

impl TemplateProvisioner {
    pub fn parse(raw: &Value) -> anyhow::Result<Self> {
        let provisioner: TemplateProvisioner =
            serde_json::from_value(raw.clone()).context("invalid template provisioner")?;
        if provisioner.uri.is_empty() {
            bail!("uri not set");
        }
        if provisioner.resource_type.is_empty() {
            bail!("type not set");
        }
        Ok(provisioner)
    }

}

fn render_yaml(
    field: &str,
    source: &str,
    data: &Map<String, Value>,
) -> Result<Value, ProvisionError> {
    let rendered = template::render(source, data)?;
    if rendered.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_yaml::from_str(&rendered).map_err(|err| ProvisionError::InvalidTemplateOutput {
        field: field.to_string(),
        message: err.to_string(),
    })
}

fn render_mapping(
    field: &str,
    source: Option<&str>,
    data: &Map<String, Value>,
) -> Result<Option<Map<String, Value>>, ProvisionError> {
    let Some(source) = source else {
        return Ok(None);
    };
    match render_yaml(field, source, data)? {
        Value::Null => Ok(Some(Map::new())),
        Value::Object(map) => Ok(Some(map)),
        other => Err(ProvisionError::InvalidTemplateOutput {
            field: field.to_string(),
            message: format!("expected a mapping, got {other}"),
        }),
    }
}

#[async_trait]
impl Provisioner for TemplateProvisioner {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn matches(&self, uid: &ResourceUid) -> bool {
        selector_matches(
            &self.resource_type,
            self.class.as_deref(),
            self.id.as_deref(),
            uid,
        )
    }

    async fn provision(
        &self,
        input: &ProvisionInput,
        _ctx: &ProvisionContext,
    ) -> Result<ProvisionOutput, ProvisionError> {
        debug!(
            uri = %self.uri,
            description = self.description.as_deref().unwrap_or_default(),
            "rendering template provisioner"
        );
        let mut data = template::template_data(input);

        let init = render_mapping("init", self.init.as_deref(), &data)?.unwrap_or_default();
        data.insert("init".into(), Value::Object(init));

        let state = render_mapping("state", self.state.as_deref(), &data)?;
        if let Some(state) = &state {
            data.insert("state".into(), Value::Object(state.clone()));
        }

        let shared = render_mapping("shared", self.shared.as_deref(), &data)?;
        if let Some(delta) = &shared {
            if let Some(Value::Object(current)) = data.get_mut("shared") {
                apply_shared_delta(current, delta.clone());
            }
        }

        let outputs = render_mapping("outputs", self.outputs.as_deref(), &data)?;

        let manifests = match self.manifests.as_deref() {
            None => None,
            Some(source) => match render_yaml("manifests", source, &data)? {
                Value::Null => Some(Vec::new()),
                Value::Array(items) => Some(items),
                other => {
                    return Err(ProvisionError::InvalidTemplateOutput {
                        field: "manifests".into(),
                        message: format!("expected a sequence, got {other}"),
                    })
                }
            },
        };

        Ok(ProvisionOutput {
            resource_state: state,
            resource_outputs: outputs,
            shared_state: shared,
            manifests,
        })
    }
}
