//! # score-k8s
//!
//! **score-k8s** turns [Score](https://score.dev) workload specifications into Kubernetes
//! manifests. Resources a workload depends on (databases, volumes, routes to other workloads)
//! are provisioned by pluggable provisioners, and their outputs are substituted into the
//! generated manifests.
//!
//! ## Overview
//!
//! A project lives in a directory containing `.score-k8s/`:
//!
//! ```text
//! .score-k8s/
//! ├── state.yaml                       # workloads, resources and shared state
//! ├── zz-default.provisioners.yaml     # bundled provisioners, written by `init`
//! └── *.provisioners.yaml              # user provisioners, loaded in name order
//! ```
//!
//! Every `generate` run loads the state, merges in the workload files it was given, decides
//! which resources need provisioning, runs the provisioners, saves the state and finally
//! renders the manifest stream.
//!
//! ## Architecture
//!
//! - **[`cli`]** - clap command surface (`init`, `generate`)
//! - **[`config`]** - validated per-command configuration and environment settings
//! - **[`logging`]** - tracing subscriber setup
//! - **[`workload`]** - typed Score workload, schema validation and upgrade transforms
//! - **[`document`]** - dot-path overrides and deep merge over untyped documents
//! - **[`secrets`]** - in-band secret reference encoding and leak detection
//! - **[`project`]** - persisted state, resource identity and priming
//! - **[`provisioners`]** - provisioner descriptors, template and command execution
//! - **[`convert`]** - workload to Kubernetes manifest conversion
//! - **[`generator`]** - the `init` and `generate` pipelines
//!
//! ### Generate Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant User
//!     participant CLI as cli
//!     participant Store as project::store
//!     participant Workload as workload
//!     participant Prime as project::prime
//!     participant Prov as provisioners
//!     participant Conv as convert
//!     participant Out as generator::output
//!
//!     User->>CLI: score-k8s generate score.yaml
//!     CLI->>Store: load_state(.score-k8s/state.yaml)
//!     CLI->>Workload: overrides, upgrade, validate, decode
//!     Workload-->>CLI: Workload
//!     CLI->>Prime: prime_resources(&mut state)
//!     Prime-->>CLI: pending resources marked
//!     CLI->>Prov: provision_resources(&mut state)
//!     Prov->>Prov: template render / cmd:// subprocess
//!     Prov-->>CLI: outputs, state, shared, manifests
//!     CLI->>Store: persist_state (atomic)
//!     CLI->>Conv: convert_workload(name)
//!     Conv-->>CLI: ConfigMap, Deployment, Service
//!     CLI->>Out: push (secret leak check), emit
//!     Out-->>User: manifests.yaml
//! ```
//!
//! ## Resource Identity
//!
//! Resources are identified by `<type>.<class>#<id>`. When a workload does not give a resource
//! an explicit `id`, the id is `<workload>.<resource-name>`, making the resource private to
//! that workload. Explicit ids let several workloads share one resource.
//!
//! ## Error Handling
//!
//! Library functions return [`anyhow::Result`] with context naming the file, workload or
//! resource involved. Provisioner execution uses the typed
//! [`provisioners::ProvisionError`] so cancellation and timeouts can be told apart.

pub mod cli;
pub mod config;
pub mod convert;
pub mod document;
pub mod generator;
pub mod logging;
pub mod project;
pub mod provisioners;
pub mod secrets;
pub mod workload;

pub use project::{ResourceUid, State};
pub use provisioners::{ProvisionError, Provisioner};
pub use workload::Workload;
