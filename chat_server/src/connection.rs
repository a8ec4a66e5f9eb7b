//! Per-connection handshake: bounds the JOIN exchange to a timeout window,
//! then hands the socket off to a room and spawns its reader task.

use std::time::Duration;

use chat_common::Identifier;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, warn};

use crate::protocol::{self, JOIN_BUFFER_SIZE, JOIN_TIMEOUT, ProtocolError};
use crate::registry::Registry;
use crate::room::Room;

/// Drives one accepted socket from JOIN to reader hand-off, allowing
/// [`JOIN_TIMEOUT`] for the handshake.
pub async fn handle(socket: TcpStream, registry: Registry) {
    handle_with_timeout(socket, registry, JOIN_TIMEOUT).await
}

/// As [`handle`], but with an explicit JOIN timeout — exercised directly by
/// tests so the timeout scenario doesn't have to wait out the real 30s.
///
/// Errors are terminal for this connection only: every variant is logged
/// and the socket closed, the accept loop is never affected.
pub async fn handle_with_timeout(mut socket: TcpStream, registry: Registry, join_timeout: Duration) {
    let peer = socket.peer_addr().ok();

    let (client_name, room_name) = match do_join(&mut socket, join_timeout).await {
        Ok(names) => names,
        Err(ProtocolError::JoinTimedOut) => {
            // Scenario F: silent close, no ERROR\n — the client never
            // finished identifying itself.
            warn!(?peer, "JOIN handshake timed out");
            let _ = socket.shutdown().await;
            return;
        }
        Err(err) => {
            warn!(?peer, error = %err, "JOIN handshake failed");
            let _ = socket.write_all(b"ERROR\n").await;
            let _ = socket.shutdown().await;
            return;
        }
    };

    let room = registry.find_or_create(&room_name);

    let (read_half, write_half) = socket.into_split();
    let admitted = Room::add_member(&room, write_half, client_name.clone()).await;

    info!(client = %client_name, room = %room_name, id = admitted.id, "client joined");

    tokio::spawn(crate::client::run(
        admitted.id,
        admitted.name,
        read_half,
        room,
        admitted.active,
        admitted.cancel,
    ));
}

/// Reads and parses the JOIN line within `join_timeout`.
async fn do_join(
    socket: &mut TcpStream,
    join_timeout: Duration,
) -> Result<(Identifier, Identifier), ProtocolError> {
    tokio::time::timeout(join_timeout, read_and_parse(socket))
        .await
        .map_err(|_| ProtocolError::JoinTimedOut)?
}

async fn read_and_parse(socket: &mut TcpStream) -> Result<(Identifier, Identifier), ProtocolError> {
    let mut buf = vec![0u8; JOIN_BUFFER_SIZE];
    let n = socket.read(&mut buf).await?;
    if n == 0 {
        return Err(ProtocolError::JoinTooShort);
    }
    protocol::parse_join(&buf[..n])
}
