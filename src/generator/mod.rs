//! # Generator Module
//!
//! The two user-facing operations of score-k8s.
//!
//! ## `init`
//!
//! Creates the project directory with an empty state file, the bundled
//! default provisioners and an example workload. Existing files are never
//! overwritten.
//!
//! ## `generate`
//!
//! Runs the full pipeline for a set of workload files:
//!
//! ```text
//! state.yaml ─┐
//! *.score ────┼─> merge ─> prime ─> provision ─> persist ─> convert ─> manifests.yaml
//! overrides ──┘
//! ```
//!
//! Any failure aborts the run. The state file is only replaced after every
//! resource provisioned, and the output is only written after every manifest
//! passed the secret leak check.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use score_k8s::config::{GenerateArgs, GenerateConfig, RuntimeConfig};
//! use score_k8s::generator::generate;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let args = GenerateArgs {
//!     files: vec!["score.yaml".into()],
//!     output: "manifests.yaml".into(),
//!     ..Default::default()
//! };
//! let config = GenerateConfig::new(".".as_ref(), args, RuntimeConfig::from_env())?;
//! let report = generate(&config, CancellationToken::new()).await?;
//! println!("{} manifests", report.manifests);
//! # Ok(())
//! # }
//! ```

mod init;
mod output;
mod pipeline;

pub use init::{init_project, InitReport, EXAMPLE_WORKLOAD_FILE};
pub use output::ManifestStream;
pub use pipeline::{generate, GenerateReport};
