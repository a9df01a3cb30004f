use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tempfile::NamedTempFile;
use tracing::info;

use super::state::State;

/// Directory holding project state and provisioner descriptors.
pub const PROJECT_DIRECTORY: &str = ".score-k8s";
pub const STATE_FILE_NAME: &str = "state.yaml";

pub fn project_dir(root: &Path) -> PathBuf {
    root.join(PROJECT_DIRECTORY)
}

pub fn state_file_path(root: &Path) -> PathBuf {
    project_dir(root).join(STATE_FILE_NAME)
}

/// Read the project state file.
///
/// Structure is checked strictly; unknown top-level fields are ignored. An
/// empty file is an empty project.
pub fn load_state(path: &Path) -> anyhow::Result<State> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read existing state file '{}'", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(State::default());
    }
    let state: State = serde_yaml::from_str(&raw)
        .with_context(|| format!("failed to load existing state '{}'", path.display()))?;
    info!(
        file = %path.display(),
        workloads = state.workloads.len(),
        resources = state.resources.len(),
        "loaded project state"
    );
    Ok(state)
}

/// Encode the state canonically and replace `path` atomically.
pub fn persist_state(path: &Path, state: &State) -> anyhow::Result<()> {
    let encoded = serde_yaml::to_string(state).context("failed to encode project state")?;
    write_atomic(path, encoded.as_bytes(), 0o600)
        .with_context(|| format!("failed to persist state file '{}'", path.display()))?;
    info!(file = %path.display(), "persisted state file");
    Ok(())
}

/// A fully written and synced temporary file waiting to be renamed over its
/// target.
///
/// Dropping it without calling [`StagedWrite::commit`] removes the temporary
/// file and leaves the target untouched.
#[derive(Debug)]
pub struct StagedWrite {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    /// Path of the temporary file.
    pub fn temp_path(&self) -> &Path {
        self.file.path()
    }

    /// Atomically move the staged content over the target.
    pub fn commit(self) -> anyhow::Result<()> {
        let target = self.target;
        self.file
            .persist(&target)
            .map_err(|e| e.error)
            .with_context(|| format!("failed to move staged file over '{}'", target.display()))?;
        Ok(())
    }
}

/// Write `bytes` to a temporary file next to `target`, flush and sync it.
///
/// The temporary file lives in the target's directory so the final rename
/// never crosses a filesystem boundary.
pub fn stage_atomic(target: &Path, bytes: &[u8], mode: u32) -> anyhow::Result<StagedWrite> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in '{}'", dir.display()))?;
    file.write_all(bytes).context("failed to write temporary file")?;
    file.flush().context("failed to flush temporary file")?;
    set_mode(&file, mode)?;
    file.as_file()
        .sync_all()
        .context("failed to sync temporary file")?;
    Ok(StagedWrite {
        file,
        target: target.to_path_buf(),
    })
}

/// Stage and commit in one step.
pub fn write_atomic(target: &Path, bytes: &[u8], mode: u32) -> anyhow::Result<()> {
    stage_atomic(target, bytes, mode)?.commit()
}

#[cfg(unix)]
fn set_mode(file: &NamedTempFile, mode: u32) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.as_file()
        .set_permissions(fs::Permissions::from_mode(mode))
        .context("failed to set permissions on temporary file")
}

#[cfg(not(unix))]
fn set_mode(_file: &NamedTempFile, _mode: u32) -> anyhow::Result<()> {
    Ok(())
}
