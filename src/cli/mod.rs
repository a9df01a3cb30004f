//! # CLI Module
//!
//! Command-line surface of score-k8s.
//!
//! ## Commands
//!
//! ### `init`
//!
//! Prepare the current directory as a project:
//!
//! ```bash
//! score-k8s init
//! ```
//!
//! ### `generate`
//!
//! Merge workloads into the project, provision their resources and write the
//! manifests:
//!
//! ```bash
//! score-k8s generate score.yaml
//! ```
//!
//! Options:
//! - `--overrides-file <FILE>` - YAML merged into the workload (single file only)
//! - `--override-property <PATH=VALUE>` - set or delete one property (single file only)
//! - `--image <IMAGE>` - replacement for containers whose image is `.`
//! - `-o, --output <FILE>` - output file, `-` for stdout (default: `manifests.yaml`)
//!
//! The global `-v` flag raises the log level; `SCORE_K8S_LOG_LEVEL`,
//! `SCORE_K8S_LOG_FORMAT` and `RUST_LOG` are honoured as well.
//!
//! ## Usage from Code
//!
//! ```rust,ignore
//! use clap::Parser;
//! use score_k8s::cli::{run_cli, Cli};
//! use tokio_util::sync::CancellationToken;
//!
//! let cli = Cli::parse();
//! run_cli(cli, CancellationToken::new()).await?;
//! ```
//!
//! ## Examples
//!
//! ```bash
//! # Two workloads, written to stdout
//! score-k8s generate frontend.score.yaml backend.score.yaml -o -
//!
//! # Drop a property for a single workload
//! score-k8s generate score.yaml --override-property metadata.annotations=
//! ```

mod commands;


pub use commands::{run_cli, Cli, Commands};
