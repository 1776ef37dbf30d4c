/// Membership feed: the contract with the transport/presence collaborator.
/// Every committed membership mutation publishes exactly one event here;
/// subscribers (WebSocket fan-out, presence tracking) consume them to keep
/// live room views current. Publishing never blocks and tolerates having
/// no subscribers.
use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::models::Role;

const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MembershipEvent {
    Joined {
        room_id: String,
        user_id: String,
    },
    Left {
        room_id: String,
        user_id: String,
    },
    Kicked {
        room_id: String,
        user_id: String,
        by: String,
    },
    Banned {
        room_id: String,
        user_id: String,
        by: String,
    },
    Unbanned {
        room_id: String,
        user_id: String,
        by: String,
    },
    RoleChanged {
        room_id: String,
        user_id: String,
        role: Role,
        by: String,
    },
    RoomDeleted {
        room_id: String,
    },
}

/// Broadcast hub for membership events
#[derive(Clone)]
pub struct MembershipFeed {
    tx: broadcast::Sender<MembershipEvent>,
}

impl MembershipFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        MembershipFeed { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. A send error only means nobody is listening.
    pub fn publish(&self, event: MembershipEvent) {
        log::debug!("membership event: {:?}", event);
        let _ = self.tx.send(event);
    }
}

impl Default for MembershipFeed {
    fn default() -> Self {
        Self::new()
    }
}
