use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{GenerateArgs, GenerateConfig, InitConfig, RuntimeConfig};
use crate::generator::{generate, init_project};

/// Command-line interface for score-k8s
///
/// Converts Score workloads into Kubernetes manifests, provisioning the
/// resources they depend on along the way.
#[derive(Debug, Parser)]
#[command(name = "score-k8s", version)]
#[command(about = "Generate Kubernetes manifests from Score workloads", long_about = None)]
pub struct Cli {
    /// Increase log verbosity (repeat for more)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available score-k8s commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initialise a new project in the current directory
    ///
    /// Creates the `.score-k8s` directory with an empty state file and the
    /// default provisioners, plus an example `score.yaml`. Files that already
    /// exist are left alone.
    Init,
    /// Convert Score workloads into Kubernetes manifests
    ///
    /// Every file given is merged into the project state before resources are
    /// provisioned. Workloads already in the state are converted too.
    Generate {
        /// Score workload files to add to the project
        files: Vec<PathBuf>,

        /// YAML file merged into the workload before validation
        #[arg(long)]
        overrides_file: Option<PathBuf>,

        /// Set (`path=value`) or delete (`path=`) a single workload property
        #[arg(long = "override-property", value_name = "PATH=VALUE")]
        override_properties: Vec<String>,

        /// Image used for containers whose image is '.'
        #[arg(long)]
        image: Option<String>,

        /// Output file for the manifests, or '-' for stdout
        #[arg(short, long, default_value = "manifests.yaml")]
        output: String,
    },
}

/// Execute the parsed command against the current directory.
///
/// # Errors
///
/// Returns an error if:
/// - the current directory cannot be determined
/// - flag combinations are invalid
/// - any stage of `init` or `generate` fails
pub async fn run_cli(cli: Cli, cancel: CancellationToken) -> anyhow::Result<()> {
    let project_root =
        std::env::current_dir().context("failed to determine the current directory")?;
    match cli.command {
        Commands::Init => {
            let report = init_project(&InitConfig { project_root })?;
            info!(
                created = report.created.len(),
                skipped = report.skipped.len(),
                "project initialised"
            );
            Ok(())
        }
        Commands::Generate {
            files,
            overrides_file,
            override_properties,
            image,
            output,
        } => {
            let args = GenerateArgs {
                files,
                overrides_file,
                override_properties,
                image,
                output,
            };
            let config = GenerateConfig::new(&project_root, args, RuntimeConfig::from_env())?;
            let report = generate(&config, cancel).await?;
            info!(
                workloads = report.workloads,
                resources = report.resources,
                manifests = report.manifests,
                "generate complete"
            );
            Ok(())
        }
    }
}
