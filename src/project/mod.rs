//! # Project Module
//!
//! Durable project state kept in `.score-k8s/state.yaml` across invocations:
//! the workloads merged so far, one record per resource, shared provisioner
//! state and the manifests provisioners materialised.
//!
//! The state is loaded once per `generate`, mutated in memory by the pipeline
//! stages in sequence, and written back with [`persist_state`], which goes
//! through a temporary file and a rename so a crash never leaves a partially
//! written state file behind.

mod prime;
mod state;
mod store;

pub use prime::prime_resources;
pub use state::{
    ProvisionStatus, ResourceState, ResourceUid, State, StateExtras, WorkloadState, DEFAULT_CLASS,
};
pub use store::{
    load_state, persist_state, project_dir, stage_atomic, state_file_path, write_atomic,
    StagedWrite, PROJECT_DIRECTORY, STATE_FILE_NAME,
};
