use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::json;
use tracing::{info, warn};

use crate::config::InitConfig;
use crate::project::{project_dir, state_file_path, State};
use crate::provisioners::{DEFAULT_PROVISIONERS, DEFAULT_PROVISIONERS_FILE};

/// Example workload written by `init`.
pub const EXAMPLE_WORKLOAD_FILE: &str = "score.yaml";

/// What `init` did with each managed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub created: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Create the project directory and its managed files.
///
/// Files that already exist are left untouched, so running `init` again is a
/// no-op.
pub fn init_project(config: &InitConfig) -> anyhow::Result<InitReport> {
    let root = &config.project_root;
    let dir = project_dir(root);
    create_private_dir(&dir)
        .with_context(|| format!("failed to ensure state directory '{}'", dir.display()))?;

    let empty_state =
        serde_yaml::to_string(&State::default()).context("failed to encode empty project state")?;
    let example = serde_yaml::to_string(&json!({
        "apiVersion": "score.dev/v1b1",
        "metadata": {"name": "example"},
        "containers": {"main": {"image": "stefanprodan/podinfo"}}
    }))
    .context("failed to encode example workload")?;

    let files = [
        (state_file_path(root), empty_state.as_str(), 0o600),
        (dir.join(DEFAULT_PROVISIONERS_FILE), DEFAULT_PROVISIONERS, 0o600),
        (root.join(EXAMPLE_WORKLOAD_FILE), example.as_str(), 0o644),
    ];

    let mut report = InitReport {
        created: Vec::new(),
        skipped: Vec::new(),
    };
    for (path, content, mode) in files {
        if write_new(&path, content.as_bytes(), mode)
            .with_context(|| format!("failed to create '{}'", path.display()))?
        {
            info!(file = %path.display(), "created");
            report.created.push(path);
        } else {
            info!(file = %path.display(), "skipping creation since it already exists");
            report.skipped.push(path);
        }
    }
    Ok(report)
}

/// Write `content` to `path` only if nothing is there yet. Returns whether
/// the file was created.
fn write_new(path: &Path, content: &[u8], mode: u32) -> std::io::Result<bool> {
    create_new_with(path, mode, |file| {
        file.write_all(content)?;
        file.sync_all()
    })
}

/// Exclusively create `path` and fill it. A failed fill removes the file again
/// so the next `init` does not mistake it for a user's file.
fn create_new_with(
    path: &Path,
    mode: u32,
    fill: impl FnOnce(&mut File) -> std::io::Result<()>,
) -> std::io::Result<bool> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut file = match options.open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => return Err(err),
    };
    if let Err(err) = fill(&mut file) {
        drop(file);
        if let Err(cleanup) = fs::remove_file(path) {
            warn!(file = %path.display(), error = %cleanup, "failed to remove partially written file");
        }
        return Err(err);
    }
    Ok(true)
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}
