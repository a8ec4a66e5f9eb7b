pub mod cli;
pub mod client;
pub mod connection;
pub mod protocol;
pub mod registry;
pub mod room;

use tokio::net::TcpListener;
use tracing::{error, info};

use registry::Registry;

/// Runs the accept loop against an already-bound listener. Split out of
/// `main` so integration tests can bind an ephemeral port and drive a real
/// server instance in-process.
pub async fn serve(listener: TcpListener, registry: Registry) -> ! {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                info!(%peer, "accepted connection");
                let registry = registry.clone();
                tokio::spawn(connection::handle(socket, registry));
            }
            Err(e) => {
                error!(error = %e, "accept failed");
            }
        }
    }
}
