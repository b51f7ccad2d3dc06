use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use war_api::consts::{SUBSCRIBE_EVENT, UNSUBSCRIBE_EVENT};

use super::frame::{encode, Packet};

/// Reference-counted room membership on one shared connection.
///
/// The first subscriber of a room emits the subscribe control message and
/// the last one to drop its guard emits the unsubscribe.
pub struct RoomRegistry {
    counts: Mutex<HashMap<String, usize>>,
    outbound: mpsc::UnboundedSender<String>,
}

impl RoomRegistry {
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Arc<Self> {
        Arc::new(Self {
            counts: Mutex::new(HashMap::new()),
            outbound,
        })
    }

    pub fn subscribe(self: &Arc<Self>, room: &str) -> RoomSubscription {
        let first = {
            let mut counts = self.counts.lock();
            let count = counts.entry(room.to_string()).or_insert(0);
            *count += 1;
            *count == 1
        };
        if first {
            tracing::info!("Joining room {}", room);
            self.emit(SUBSCRIBE_EVENT, room);
        }
        RoomSubscription {
            registry: Arc::clone(self),
            room: room.to_string(),
        }
    }

    /// Rooms with at least one live subscriber.
    pub fn active(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.counts.lock().keys().cloned().collect();
        rooms.sort();
        rooms
    }

    pub fn subscribers(&self, room: &str) -> usize {
        self.counts.lock().get(room).copied().unwrap_or(0)
    }

    /// Control frames that rejoin every active room on a fresh connection.
    pub fn rejoin_frames(&self) -> Vec<String> {
        self.active()
            .iter()
            .map(|room| encode(&Packet::event(SUBSCRIBE_EVENT, json!(room))))
            .collect()
    }

    fn release(&self, room: &str) {
        let last = {
            let mut counts = self.counts.lock();
            match counts.get_mut(room) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    counts.remove(room);
                    true
                }
                None => false,
            }
        };
        if last {
            tracing::info!("Leaving room {}", room);
            self.emit(UNSUBSCRIBE_EVENT, room);
        }
    }

    fn emit(&self, event: &str, room: &str) {
        // A closed connection has nothing left to notify.
        let _ = self.outbound.send(encode(&Packet::event(event, json!(room))));
    }
}

/// Membership guard. Dropping it releases the room.
pub struct RoomSubscription {
    registry: Arc<RoomRegistry>,
    room: String,
}

impl RoomSubscription {
    pub fn room(&self) -> &str {
        &self.room
    }
}

impl Drop for RoomSubscription {
    fn drop(&mut self) {
        self.registry.release(&self.room);
    }
}
