//! Logger setup.
//!
//! Installs the global `tracing` subscriber. The configured level is the
//! default filter directive; `RUST_LOG` still wins when set.
//!
//! The server logs to stdout. The interactive client logs to stderr so that
//! log lines never interleave with the prompt and replies on stdout.

use crate::config::LoggerConfig;
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

/// Console stream that receives log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

/// Builds the filter for `level`, letting `RUST_LOG` override it.
pub fn env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    EnvFilter::builder()
        .with_default_directive(level.to_ascii_lowercase().parse()?)
        .from_env()
        .context("invalid RUST_LOG directive")
}

/// Writer for `target`, teed into `file` when one is configured.
fn make_writer(target: LogTarget, file: Option<File>) -> BoxMakeWriter {
    match (target, file) {
        (LogTarget::Stdout, None) => BoxMakeWriter::new(std::io::stdout),
        (LogTarget::Stderr, None) => BoxMakeWriter::new(std::io::stderr),
        (LogTarget::Stdout, Some(file)) => {
            BoxMakeWriter::new(std::io::stdout.and(Mutex::new(file)))
        }
        (LogTarget::Stderr, Some(file)) => {
            BoxMakeWriter::new(std::io::stderr.and(Mutex::new(file)))
        }
    }
}

/// Installs the subscriber. Call once, before anything else logs.
pub fn init_logging(config: &LoggerConfig, target: LogTarget) -> anyhow::Result<()> {
    let filter = env_filter(&config.level)
        .with_context(|| format!("invalid log level {:?}", config.level))?;

    let file = config
        .output_file_path
        .as_ref()
        .map(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))
        })
        .transpose()?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(file.is_none())
        .with_writer(make_writer(target, file))
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to install tracing subscriber")
}
