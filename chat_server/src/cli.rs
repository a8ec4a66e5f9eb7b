//! Command-line arguments.

use clap::Parser;

/// Lowest port this server will bind to. Below this, a bind is almost
/// certainly a misconfiguration rather than an intentional choice.
pub const MIN_PORT: u16 = 49_512;

pub const DEFAULT_PORT: u16 = 1234;

#[derive(Debug, Parser)]
#[command(name = "chat_server", about = "Multi-room line-oriented chat server")]
pub struct Args {
    /// TCP port to listen on. Must be in 49512..=65535.
    #[arg(default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl Args {
    /// Validates the port range.
    pub fn validate(&self) -> Result<(), chat_common::ChatError> {
        if self.port < MIN_PORT {
            return Err(chat_common::ChatError::InvalidPort(self.port));
        }
        Ok(())
    }
}
