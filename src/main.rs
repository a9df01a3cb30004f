use clap::Parser;
use score_k8s::cli::{run_cli, Cli};
use score_k8s::logging::{init_logging, LogConfig};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env().with_verbosity(cli.verbose);
    if let Err(err) = init_logging(&log_config) {
        eprintln!("Warning: {err:#}");
    }

    // Ctrl-C kills a running provisioner and fails the run before its next
    // write to the state file or the output.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    if let Err(err) = run_cli(cli, cancel).await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
