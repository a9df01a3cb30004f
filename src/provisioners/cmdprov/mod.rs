//! `cmd://` provisioners: an external executable invoked once per resource.
//!
//! ```yaml
//! - uri: cmd://python3
//!   type: postgres
//!   class: large
//!   args: ["./provisioners/postgres.py", "<mode>", "{{ guid }}"]
//! ```
//!
//! The uri names the binary (see [`uri::resolve`]); `args` are rendered as
//! templates, except for a whole `<mode>` argument which always becomes
//! `provision`.

pub mod uri;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{
    process, selector_matches, template, ProvisionContext, ProvisionError, ProvisionInput,
    ProvisionOutput, Provisioner,
};
use crate::project::ResourceUid;

/// Whole-argument token replaced with the provisioning mode.
pub const MODE_TOKEN: &str = "<mode>";
pub const PROVISION_MODE: &str = "provision";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CmdProvisioner {
    uri: String,
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default)]
    args: Vec<String>,
}

impl CmdProvisioner {
    /// Parse a descriptor, rejecting unknown fields and unsafe uris.
    pub fn parse(raw: &Value) -> anyhow::Result<Self> {
        let provisioner: CmdProvisioner =
            serde_json::from_value(raw.clone()).context("invalid cmd provisioner")?;
        if provisioner.uri.is_empty() {
            bail!("uri not set");
        }
        if provisioner.resource_type.is_empty() {
            bail!("type not set");
        }
        let parsed = Url::parse(&provisioner.uri)
            .with_context(|| format!("failed to parse uri '{}'", provisioner.uri))?;
        if !parsed.username().is_empty() || parsed.password().is_some() {
            bail!("cmd provisioner uri cannot contain user info");
        }
        if parsed.query().is_some() {
            bail!("cmd provisioner uri cannot contain query params");
        }
        if parsed.port().is_some() {
            bail!("cmd provisioner uri cannot contain a port");
        }
        Ok(provisioner)
    }

    /// Render every argument; the first failure aborts the whole list.
    pub fn render_args(&self, input: &ProvisionInput) -> Result<Vec<String>, ProvisionError> {
        let data = template::template_data(input);
        self.args
            .iter()
            .map(|arg| {
                if arg == MODE_TOKEN {
                    Ok(PROVISION_MODE.to_string())
                } else {
                    template::render(arg, &data)
                }
            })
            .collect()
    }
}

#[async_trait]
impl Provisioner for CmdProvisioner {
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
        ctx: &ProvisionContext,
    ) -> Result<ProvisionOutput, ProvisionError> {
        let binary = uri::resolve(&self.uri)?;
        let stdin = serde_json::to_vec(input).map_err(ProvisionError::EncodeInput)?;
        let args = self.render_args(input)?;
        debug!(binary = %binary.display(), ?args, "executing command provisioner");
        process::invoke(&binary, &args, &stdin, ctx).await
    }
}
