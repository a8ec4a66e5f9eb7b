//! Structured logging bootstrap, shared by every binary in this workspace.

use tracing_subscriber::{EnvFilter, fmt};

use crate::error::ChatError;

/// Installs a global `tracing` subscriber driven by `RUST_LOG`, defaulting
/// to `info` when the environment variable is unset or unparsable.
pub fn init_logging() -> Result<(), ChatError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|e| ChatError::Logging(e.to_string()))
}
