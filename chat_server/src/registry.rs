//! Process-wide directory of live rooms.
//!
//! Generalizes `lib_common::core::registry::Registry`'s
//! `Arc<Mutex<HashMap<String, _>>>` subscription table: instead of
//! ref-counted linger entries keyed by symbol, this keeps room handles keyed
//! by room name, with dormant rooms pruned lazily the next time their name
//! is looked up rather than on a timed linger.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chat_common::Identifier;

use crate::room::{Room, RoomHandle};

/// The process-wide room directory, cheaply cloneable and shared by every
/// connection handler task.
#[derive(Clone, Default)]
pub struct Registry {
    rooms: Arc<Mutex<HashMap<Identifier, RoomHandle>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the active room named `name`, pruning it first if its
    /// membership has already drained to zero (a "dormant" room is treated
    /// as absent).
    pub fn find_or_probe(&self, name: &Identifier) -> Option<RoomHandle> {
        let mut rooms = self.rooms.lock().expect("registry lock poisoned");
        match rooms.get(name) {
            Some(room) if room.is_active() => Some(Arc::clone(room)),
            Some(_) => {
                rooms.remove(name);
                None
            }
            None => None,
        }
    }

    /// Returns the active room named `name`, creating and registering a
    /// fresh one if none is found. The registry lock is held across the
    /// lookup and the insert, so two connections racing to create the same
    /// new room can never both win — the second one through the lock
    /// always observes the first's insert.
    pub fn find_or_create(&self, name: &Identifier) -> RoomHandle {
        let mut rooms = self.rooms.lock().expect("registry lock poisoned");
        if let Some(room) = rooms.get(name) {
            if room.is_active() {
                return Arc::clone(room);
            }
            rooms.remove(name);
        }

        let room = Room::build(name.clone(), self.clone());
        rooms.insert(name.clone(), Arc::clone(&room));
        room
    }

    /// Registers a newly created room. Replaces any dormant entry left
    /// behind under the same name.
    pub fn insert(&self, room: RoomHandle) {
        let mut rooms = self.rooms.lock().expect("registry lock poisoned");
        rooms.insert(room.name().clone(), room);
    }

    /// Removes `room` from the directory, but only if it is still the entry
    /// on file for its name — a fresh room may have already replaced it.
    pub fn remove(&self, room: &RoomHandle) {
        let mut rooms = self.rooms.lock().expect("registry lock poisoned");
        if let Some(existing) = rooms.get(room.name())
            && Arc::ptr_eq(existing, room)
        {
            rooms.remove(room.name());
        }
    }
}
