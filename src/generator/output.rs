use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context};
use serde_json::Value;
use tracing::info;

use crate::config::OutputTarget;
use crate::project::write_atomic;
use crate::secrets::find_first_unresolved_secret_ref;

/// Multi-document YAML stream of manifests, checked for secret leaks as it is
/// built.
#[derive(Debug, Default)]
pub struct ManifestStream {
    buf: String,
    count: usize,
}

impl ManifestStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one manifest.
    ///
    /// Fails without appending if any string in it still carries a secret
    /// reference.
    pub fn push(&mut self, manifest: &Value) -> anyhow::Result<()> {
        if let Some(path) = find_first_unresolved_secret_ref("", manifest) {
            bail!("unresolved secret ref in manifest: {path}");
        }
        let encoded = serde_yaml::to_string(manifest).context("failed to encode manifest")?;
        self.buf.push_str("---\n");
        self.buf.push_str(&encoded);
        self.buf.push('\n');
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Write the stream to stdout or atomically replace the output file.
    pub fn emit(&self, target: &OutputTarget, root: &Path) -> anyhow::Result<()> {
        match target {
            OutputTarget::Stdout => {
                let mut stdout = std::io::stdout().lock();
                stdout
                    .write_all(self.buf.as_bytes())
                    .and_then(|_| stdout.flush())
                    .context("failed to write manifests to stdout")?;
            }
            OutputTarget::File(path) => {
                let path = root.join(path);
                write_atomic(&path, self.buf.as_bytes(), 0o644)
                    .with_context(|| format!("failed to write output file '{}'", path.display()))?;
                info!(file = %path.display(), count = self.count, "wrote manifests");
            }
        }
        Ok(())
    }
}
