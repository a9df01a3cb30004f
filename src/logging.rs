//! Structured logging setup.
//!
//! All log output goes to stderr so that `generate -o -` can stream manifests
//! on stdout untouched.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `SCORE_K8S_LOG_LEVEL` | trace/debug/info/warn/error | `info` |
//! | `SCORE_K8S_LOG_FORMAT` | compact/pretty/json | `compact` |
//! | `RUST_LOG` | full filter directive, wins over the level | unset |
//!
//! Each `-v` on the command line raises the level by one step.

use std::env;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level: trace/debug/info/warn/error
    pub log_level: Level,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            format: LogFormat::Compact,
        }
    }
}

impl LogConfig {
    /// Parse configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            log_level: parse_level(
                &env::var("SCORE_K8S_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            ),
            format: LogFormat::parse(
                &env::var("SCORE_K8S_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
            ),
        }
    }

    /// Raise the level by `steps` (`info` + 1 = `debug`).
    pub fn with_verbosity(mut self, steps: u8) -> Self {
        for _ in 0..steps {
            self.log_level = match self.log_level {
                Level::ERROR => Level::WARN,
                Level::WARN => Level::INFO,
                Level::INFO => Level::DEBUG,
                _ => Level::TRACE,
            };
        }
        self
    }
}

fn parse_level(s: &str) -> Level {
    match s.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global subscriber.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(())
}
