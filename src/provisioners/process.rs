//! Runs a provisioner executable and speaks the JSON protocol with it.

use std::io::ErrorKind;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{ProvisionContext, ProvisionError, ProvisionOutput};

enum Outcome {
    Exited(std::io::Result<(ExitStatus, Vec<u8>)>),
    Cancelled,
    TimedOut(Duration),
}

/// Run `binary` with `args`, feed it `input` and decode its stdout.
///
/// Stdin is written in full and closed while stdout is drained. Stderr goes
/// straight to ours. If the context is cancelled or its timeout elapses first
/// the child is killed and reaped before returning.
pub async fn invoke(
    binary: &Path,
    args: &[String],
    input: &[u8],
    ctx: &ProvisionContext,
) -> Result<ProvisionOutput, ProvisionError> {
    let io_err = |source| ProvisionError::Io {
        binary: binary.to_path_buf(),
        source,
    };

    let mut child = Command::new(binary)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProvisionError::Spawn {
            binary: binary.to_path_buf(),
            source,
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| io_err(std::io::Error::other("child stdin was not captured")))?;
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| io_err(std::io::Error::other("child stdout was not captured")))?;

    let write_input = async move {
        match stdin.write_all(input).await {
            // The child is free to exit without reading its input.
            Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    };
    let read_output = async move {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await.map(|_| buf)
    };
    let child_ref = &mut child;
    let run = async move {
        let (written, output) = tokio::join!(write_input, read_output);
        written?;
        let output = output?;
        let status = child_ref.wait().await?;
        Ok::<_, std::io::Error>((status, output))
    };
    let deadline = async {
        match ctx.timeout {
            Some(after) => {
                tokio::time::sleep(after).await;
                after
            }
            None => std::future::pending().await,
        }
    };

    let outcome = tokio::select! {
        result = run => Outcome::Exited(result),
        _ = ctx.cancel.cancelled() => Outcome::Cancelled,
        after = deadline => Outcome::TimedOut(after),
    };

    let (status, output) = match outcome {
        Outcome::Exited(result) => result.map_err(io_err)?,
        Outcome::Cancelled => {
            terminate(&mut child, binary).await;
            return Err(ProvisionError::Cancelled {
                binary: binary.to_path_buf(),
            });
        }
        Outcome::TimedOut(after) => {
            terminate(&mut child, binary).await;
            return Err(ProvisionError::TimedOut {
                binary: binary.to_path_buf(),
                after,
            });
        }
    };

    if !status.success() {
        return Err(ProvisionError::NonZeroExit {
            binary: binary.to_path_buf(),
            status,
        });
    }

    serde_json::from_slice::<ProvisionOutput>(&output).map_err(|source| {
        debug!(
            binary = %binary.display(),
            output = %String::from_utf8_lossy(&output),
            "output from command provisioner"
        );
        ProvisionError::BadOutput {
            binary: binary.to_path_buf(),
            source,
        }
    })
}

async fn terminate(child: &mut Child, binary: &Path) {
    if let Err(err) = child.kill().await {
        warn!(binary = %binary.display(), error = %err, "failed to kill provisioner process");
    }
}
