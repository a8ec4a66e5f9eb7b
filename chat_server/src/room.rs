//! Per-room membership, bounded mailbox, and fan-out worker.
//!
//! The mailbox is a Tokio bounded `mpsc` channel: the spec's
//! semaphore-guarded ring buffer of capacity 32 maps directly onto
//! `mpsc::channel(32)`, since a bounded channel already serializes
//! concurrent producers and blocks a single consumer on emptiness without a
//! hand-rolled insert-lock or semaphore pair (see `DESIGN.md`).
//!
//! Client sockets are addressed by a stable `u64` id rather than a raw
//! back-pointer, generalizing the source's `client_t* next/prev` list into
//! an owned, insertion-ordered `Vec<ClientSlot>` guarded by the room's
//! membership lock — the "arena" option from the spec's design notes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use bytes::Bytes;
use chat_common::Identifier;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::{MAX_MSG_SIZE, ProtocolError, SEND_BUFFER_CAPACITY, SendItem};
use crate::registry::Registry;

/// A single occupant of a room's membership list.
struct ClientSlot {
    id: u64,
    name: Identifier,
    write_half: OwnedWriteHalf,
    active: Arc<AtomicBool>,
    cancel: CancellationToken,
}

struct RoomInner {
    name: Identifier,
    sender: mpsc::Sender<SendItem>,
    membership: Mutex<Vec<ClientSlot>>,
    member_count: AtomicUsize,
    next_client_id: AtomicU64,
}

/// Shared handle to a room, addressable by the Registry and the connection
/// handler. Clone is cheap (an `Arc` bump).
pub type RoomHandle = Arc<RoomInner>;

/// A newly admitted client, returned by [`Room::add_member`].
pub struct AdmittedClient {
    pub id: u64,
    pub name: Identifier,
    pub active: Arc<AtomicBool>,
    pub cancel: CancellationToken,
}

pub struct Room;

impl Room {
    /// Allocates the mailbox, registers the room, and starts its fan-out
    /// worker. The worker begins with zero members — the room is *dormant*
    /// until the first `add_member` call.
    ///
    /// Callers racing to create a room under the same fresh name should go
    /// through `Registry::find_or_create` instead, which holds the registry
    /// lock across the lookup and the insert below.
    pub fn create(name: Identifier, registry: Registry) -> RoomHandle {
        let room = Self::build(name, registry.clone());
        registry.insert(Arc::clone(&room));
        room
    }

    /// Builds the room and starts its fan-out worker without touching the
    /// registry. Used by `Registry::find_or_create`, which performs its own
    /// insert while still holding its lock, so a room can never be built
    /// and then lost to a concurrent first-join of the same name.
    pub(crate) fn build(name: Identifier, registry: Registry) -> RoomHandle {
        let (sender, receiver) = mpsc::channel(SEND_BUFFER_CAPACITY);
        let inner = Arc::new(RoomInner {
            name,
            sender,
            membership: Mutex::new(Vec::new()),
            member_count: AtomicUsize::new(0),
            next_client_id: AtomicU64::new(0),
        });

        tokio::spawn(fan_out_worker(Arc::clone(&inner), receiver, registry));
        inner
    }

    /// Appends a new client to the membership list and returns the handles
    /// its reader task needs. The write half stays with the room; only the
    /// fan-out worker ever writes to a member's socket.
    pub async fn add_member(
        room: &RoomHandle,
        write_half: OwnedWriteHalf,
        name: Identifier,
    ) -> AdmittedClient {
        let id = room.next_client_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let slot = ClientSlot {
            id,
            name: name.clone(),
            write_half,
            active: Arc::clone(&active),
            cancel: cancel.clone(),
        };

        {
            let mut members = room.membership.lock().await;
            members.push(slot);
            // Incremented while still holding the lock so a concurrent
            // `is_active` check can never observe the pushed member without
            // also observing the updated count.
            room.member_count.fetch_add(1, Ordering::Release);
        }

        AdmittedClient {
            id,
            name,
            active,
            cancel,
        }
    }
}

impl RoomInner {
    pub fn name(&self) -> &Identifier {
        &self.name
    }

    /// Non-empty membership, checked without touching the membership lock —
    /// the Registry consults this on every lookup.
    pub fn is_active(&self) -> bool {
        self.member_count.load(Ordering::Acquire) > 0
    }

    /// Producer call from a reader: enqueues a broadcast. Blocks (the
    /// system's sole backpressure mechanism) when the mailbox is full.
    /// `origin` is the enqueuing client's id, excluded from delivery —
    /// a client never receives its own line or its own join announcement.
    pub async fn broadcast_from(
        &self,
        origin: u64,
        sender_name: &Identifier,
        bytes: &[u8],
        include_name_prefix: bool,
    ) -> Result<(), ProtocolError> {
        let mut payload = Vec::with_capacity(bytes.len() + sender_name.as_str().len() + 2);
        if include_name_prefix {
            payload.extend_from_slice(sender_name.as_str().as_bytes());
            payload.push(b':');
        }
        payload.extend_from_slice(bytes);
        if payload.last() != Some(&b'\n') {
            payload.push(b'\n');
        }

        if payload.len() > MAX_MSG_SIZE {
            return Err(ProtocolError::MessageTooLarge);
        }

        self.sender
            .send(SendItem::Broadcast {
                origin,
                payload: Bytes::from(payload),
            })
            .await
            .map_err(|_| ProtocolError::RoomClosed)
    }

    /// Producer call enqueuing the literal `ERROR\n` response targeting
    /// `target`. Used only for protocol violations.
    pub async fn error_to(&self, target: u64) -> Result<(), ProtocolError> {
        self.sender
            .send(SendItem::Error {
                target,
                payload: Bytes::from_static(b"ERROR\n"),
            })
            .await
            .map_err(|_| ProtocolError::RoomClosed)
    }

    /// Enqueues the synthetic `"<name> has left\n"` broadcast. Only called
    /// by the fan-out worker, iff membership is still non-empty after the
    /// departing client was removed. `departed_id` is passed through as the
    /// item's origin — the departed client is already gone, so it is purely
    /// a formality, but it keeps every Broadcast honestly attributed.
    async fn announce_departure(&self, departed_id: u64, name: &Identifier) {
        let mut payload = Vec::with_capacity(name.as_str().len() + 10);
        payload.extend_from_slice(name.as_str().as_bytes());
        payload.extend_from_slice(b" has left\n");
        // Mirrors the source's blocking enqueue from within the sole
        // consumer: if the mailbox is saturated at this exact instant this
        // await cannot make progress, matching the source's own behavior.
        let _ = self
            .sender
            .send(SendItem::Broadcast {
                origin: departed_id,
                payload: Bytes::from(payload),
            })
            .await;
    }

    /// Idempotent: removes `id` from membership if present, cancels its
    /// reader, shuts down its socket, and — if membership remains non-empty
    /// — enqueues the "has left" notice.
    async fn detach(&self, id: u64) {
        let removed = {
            let mut members = self.membership.lock().await;
            let Some(pos) = members.iter().position(|c| c.id == id) else {
                return;
            };
            let removed = members.remove(pos);
            // Decremented while still holding the lock, for the same reason
            // `add_member` increments under lock: keeps the Vec and the
            // count from ever being observed out of step.
            self.member_count.fetch_sub(1, Ordering::Release);
            removed
        };

        removed.cancel.cancel();
        removed.active.store(false, Ordering::Release);
        let mut write_half = removed.write_half;
        let _ = write_half.shutdown().await;

        if self.member_count.load(Ordering::Acquire) > 0 {
            self.announce_departure(id, &removed.name).await;
        }
    }
}

async fn fan_out_worker(
    room: RoomHandle,
    mut receiver: mpsc::Receiver<SendItem>,
    registry: Registry,
) {
    debug!(room = %room.name, "fan-out worker started");

    while let Some(item) = receiver.recv().await {
        match item {
            SendItem::Error { target, payload } => {
                deliver_error(&room, target, &payload).await;
            }
            SendItem::Broadcast { origin, payload } => {
                deliver_broadcast(&room, origin, &payload).await;
            }
        }

        if !room.is_active() {
            break;
        }
    }

    registry.remove(&room);
    info!(room = %room.name, "room torn down");
}

async fn deliver_error(room: &RoomHandle, target: u64, payload: &[u8]) {
    let is_active = {
        let members = room.membership.lock().await;
        members
            .iter()
            .find(|c| c.id == target)
            .map(|c| c.active.load(Ordering::Acquire))
    };

    match is_active {
        Some(true) => {
            let mut members = room.membership.lock().await;
            if let Some(slot) = members.iter_mut().find(|c| c.id == target) {
                let _ = slot.write_half.write_all(payload).await;
            }
            drop(members);
            room.detach(target).await;
        }
        Some(false) | None => {
            room.detach(target).await;
        }
    }
}

async fn deliver_broadcast(room: &RoomHandle, origin: u64, payload: &[u8]) {
    let mut members = room.membership.lock().await;
    let mut dead = Vec::new();

    for slot in members.iter_mut() {
        if slot.id == origin {
            continue;
        }
        if !slot.active.load(Ordering::Acquire) {
            dead.push(slot.id);
            continue;
        }
        if let Err(e) = slot.write_half.write_all(payload).await {
            warn!(client = %slot.name, room = %room.name, error = %e, "broadcast send failed");
            slot.cancel.cancel();
            dead.push(slot.id);
        }
    }
    drop(members);

    for id in dead {
        room.detach(id).await;
    }
}
