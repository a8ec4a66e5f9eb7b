//! Client reader task: frames a byte stream into lines and submits each as
//! a broadcast. Never writes to the socket directly — all egress for this
//! client's own messages goes through the room's mailbox, and the
//! synthetic "has joined"/"has left" notices are likewise ordinary
//! broadcasts the fan-out worker delivers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chat_common::Identifier;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::protocol::{MAX_MSG_SIZE, split_lines};
use crate::room::RoomHandle;

/// Runs until the peer disconnects, a protocol violation is detected, or the
/// fan-out worker cancels this client after a failed send.
pub async fn run(
    id: u64,
    name: Identifier,
    mut read_half: OwnedReadHalf,
    room: RoomHandle,
    active: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let joined_msg = format!("{name} has joined\n");
    if room
        .broadcast_from(id, &name, joined_msg.as_bytes(), false)
        .await
        .is_err()
    {
        return;
    }

    let mut buf = vec![0u8; MAX_MSG_SIZE];
    let mut filled = 0usize;

    loop {
        if filled >= buf.len() {
            // A single line has already consumed the whole buffer with no
            // newline in sight: it can only grow past MAX_MSG_SIZE from here.
            let _ = room.error_to(id).await;
            break;
        }

        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(client = %name, "reader cancelled by fan-out worker");
                active.store(false, Ordering::Release);
                break;
            }
            result = read_half.read(&mut buf[filled..]) => result,
        };

        let n = match n {
            Ok(0) | Err(_) => {
                active.store(false, Ordering::Release);
                let _ = room.error_to(id).await;
                break;
            }
            Ok(n) => n,
        };

        filled += n;
        let (lines, leftover_len) = {
            let (lines, leftover) = split_lines(&buf[..filled]);
            let lines: Vec<Vec<u8>> = lines.into_iter().map(|l| l.to_vec()).collect();
            (lines, leftover.len())
        };

        let mut oversize = false;
        for line in &lines {
            let wire_len = line.len() + name.as_str().len() + 2; // ':' + '\n'
            if wire_len > MAX_MSG_SIZE {
                oversize = true;
                break;
            }
            if room.broadcast_from(id, &name, line, true).await.is_err() {
                return;
            }
        }

        if oversize {
            let _ = room.error_to(id).await;
            break;
        }

        // Shift the unconsumed tail to the front of the buffer for the next read.
        if leftover_len > 0 {
            buf.copy_within(filled - leftover_len..filled, 0);
        }
        filled = leftover_len;
    }

    info!(client = %name, "reader exiting");
}
