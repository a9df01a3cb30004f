//! Drives every unprovisioned resource through its provisioner.

use anyhow::{anyhow, bail, Context};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{ProvisionContext, ProvisionInput, ProvisionOutput, Provisioner};
use crate::project::{ProvisionStatus, ResourceUid, State};

/// Provision every resource in `state` that is not yet provisioned.
///
/// Resources are visited in state order, one at a time. A provisioner is
/// picked for every pending resource before any of them runs, so a resource
/// no provisioner handles fails the pass without side effects. When several
/// provisioners match, the first one loaded wins.
pub async fn provision_resources(
    state: &mut State,
    provisioners: &[Box<dyn Provisioner>],
    ctx: &ProvisionContext,
) -> anyhow::Result<()> {
    let mut plan: Vec<(ResourceUid, &dyn Provisioner)> = Vec::new();
    for (uid, record) in &state.resources {
        if record.status == ProvisionStatus::Provisioned {
            debug!(uid = %uid, "resource already provisioned");
            continue;
        }
        plan.push((uid.clone(), select(provisioners, uid)?));
    }
    if plan.is_empty() {
        info!("all resources already provisioned");
        return Ok(());
    }

    let services = state.workload_services();
    for (uid, provisioner) in plan {
        if ctx.cancel.is_cancelled() {
            bail!("provisioning cancelled before resource '{uid}'");
        }
        let record = state
            .resources
            .get_mut(&uid)
            .ok_or_else(|| anyhow!("resource '{uid}' disappeared from state"))?;
        record.status = ProvisionStatus::Provisioning;
        let input = ProvisionInput::new(&uid, record, &state.shared_state, &services);

        info!(uid = %uid, provisioner = provisioner.uri(), "provisioning resource");
        let output = provisioner.provision(&input, ctx).await.with_context(|| {
            format!(
                "resource '{uid}': failed to provision using '{}'",
                provisioner.uri()
            )
        })?;
        apply_output(state, &uid, provisioner.uri(), output);
    }
    Ok(())
}

fn select<'a>(
    provisioners: &'a [Box<dyn Provisioner>],
    uid: &ResourceUid,
) -> anyhow::Result<&'a dyn Provisioner> {
    let mut matching = provisioners.iter().filter(|p| p.matches(uid));
    let chosen = matching
        .next()
        .ok_or_else(|| anyhow!("resource '{uid}' is not supported by any provisioner"))?;
    let ignored: Vec<&str> = matching.map(|p| p.uri()).collect();
    if !ignored.is_empty() {
        debug!(
            uid = %uid,
            selected = chosen.uri(),
            ?ignored,
            "multiple provisioners match, using the first"
        );
    }
    Ok(chosen.as_ref())
}

fn apply_output(state: &mut State, uid: &ResourceUid, uri: &str, output: ProvisionOutput) {
    if let Some(delta) = output.shared_state {
        apply_shared_delta(&mut state.shared_state, delta);
    }
    match output.manifests {
        Some(manifests) if !manifests.is_empty() => {
            state.extras.manifests.insert(uid.clone(), manifests);
        }
        _ => {
            state.extras.manifests.shift_remove(uid);
        }
    }
    if let Some(record) = state.resources.get_mut(uid) {
        if let Some(resource_state) = output.resource_state {
            record.state = resource_state;
        }
        record.outputs = output.resource_outputs.unwrap_or_default();
        record.provisioner = Some(uri.to_string());
        record.status = ProvisionStatus::Provisioned;
    }
}

/// Deep-merge `delta` into `shared`; a null value removes the key.
pub(crate) fn apply_shared_delta(shared: &mut Map<String, Value>, delta: Map<String, Value>) {
    for (key, value) in delta {
        match value {
            Value::Null => {
                shared.shift_remove(&key);
            }
            Value::Object(nested) => match shared.get_mut(&key) {
                Some(Value::Object(existing)) => apply_shared_delta(existing, nested),
                _ => {
                    let mut fresh = Map::new();
                    apply_shared_delta(&mut fresh, nested);
                    shared.insert(key, Value::Object(fresh));
                }
            },
            other => {
                shared.insert(key, other);
            }
        }
    }
}
