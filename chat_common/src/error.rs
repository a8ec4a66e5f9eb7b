//! Startup-level error type.
//!
//! Per-connection faults (malformed JOIN, oversize message) are not modeled
//! here — they never escape the connection that caused them and are handled
//! entirely within `chat_server`. This enum covers only the faults that can
//! prevent the server from ever accepting a connection.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid port {0}: must be in 49512..=65535")]
    InvalidPort(u16),

    #[error("failed to bind listening socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to initialize logging: {0}")]
    Logging(String),
}
