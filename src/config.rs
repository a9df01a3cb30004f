//! # Configuration Module
//!
//! Command-line flags and environment knobs are folded into explicit config
//! structs once at startup and passed down to the commands. Nothing below the
//! CLI layer reads flags or the environment on its own.
//!
//! ## Environment Variables
//!
//! ### `SCORE_K8S_PROVISIONER_TIMEOUT`
//!
//! Upper bound, in whole seconds, on a single provisioner call. When it
//! elapses the provisioner process is killed and generation fails. Unset or
//! `0` means no limit.
//!
//! ```bash
//! SCORE_K8S_PROVISIONER_TIMEOUT=120 score-k8s generate score.yaml
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::bail;
use tracing::warn;

pub const PROVISIONER_TIMEOUT_ENV: &str = "SCORE_K8S_PROVISIONER_TIMEOUT";

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub provisioner_timeout: Option<Duration>,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let provisioner_timeout = match lookup(PROVISIONER_TIMEOUT_ENV) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    warn!(value = %raw, "ignoring invalid {PROVISIONER_TIMEOUT_ENV}");
                    None
                }
            },
            None => None,
        };
        RuntimeConfig {
            provisioner_timeout,
        }
    }
}

/// Where the generated manifests go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl OutputTarget {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw {
            "" => bail!("no output file specified"),
            "-" => Ok(OutputTarget::Stdout),
            path => Ok(OutputTarget::File(PathBuf::from(path))),
        }
    }
}

/// Validated inputs of `score-k8s init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitConfig {
    /// Directory the project lives in; relative paths are resolved against it.
    pub project_root: PathBuf,
}

/// Validated inputs of `score-k8s generate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateConfig {
    pub project_root: PathBuf,
    /// Workload files, in the order they are merged (sorted by path).
    pub files: Vec<PathBuf>,
    pub overrides_file: Option<PathBuf>,
    /// `PATH=VALUE` entries, applied in the order given.
    pub override_properties: Vec<String>,
    /// Replacement for containers whose image is `.`.
    pub image: Option<String>,
    pub output: OutputTarget,
    pub runtime: RuntimeConfig,
}

/// Raw `generate` flags before validation.
#[derive(Debug, Clone, Default)]
pub struct GenerateArgs {
    pub files: Vec<PathBuf>,
    pub overrides_file: Option<PathBuf>,
    pub override_properties: Vec<String>,
    pub image: Option<String>,
    pub output: String,
}

impl GenerateConfig {
    /// Validate flag combinations before any file is touched.
    pub fn new(
        project_root: &Path,
        args: GenerateArgs,
        runtime: RuntimeConfig,
    ) -> anyhow::Result<Self> {
        let has_overrides = args.overrides_file.is_some() || !args.override_properties.is_empty();
        if has_overrides && args.files.len() != 1 {
            bail!(
                "cannot use --override-property or --overrides-file when 0 or more than 1 score files are provided"
            );
        }
        let mut files = args.files;
        files.sort();
        Ok(Self {
            project_root: project_root.to_path_buf(),
            files,
            overrides_file: args.overrides_file,
            override_properties: args.override_properties,
            image: args.image.filter(|image| !image.is_empty()),
            output: OutputTarget::parse(&args.output)?,
            runtime,
        })
    }

    /// Resolve a user-supplied path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.project_root.join(path)
    }
}
