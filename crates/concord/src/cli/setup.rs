//! Process setup for the CLI

use anyhow::Result;

/// Install the tracing subscriber.
///
/// `RUST_LOG` selects levels (default `info`); output goes to stderr so JSON
/// on stdout stays clean.
pub fn init_tracing() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))
}
