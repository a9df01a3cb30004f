//! # Workload Module
//!
//! Typed model of a Score workload plus the steps that turn a raw YAML
//! document into it:
//!
//! ```text
//! raw YAML → upgrade transforms → schema validation → typed decode
//! ```
//!
//! The schema is a trimmed `score.dev/v1b1` JSON schema bundled into the
//! binary, so validation never reaches the network.

mod schema;
mod types;

pub use schema::{apply_upgrade_transforms, decode_workload, validate_workload};
pub use types::*;
