/// HTTP handlers module
/// REST endpoints for room access, membership and moderation

pub mod rest;

pub use rest::{
    create_room, delete_room, get_room, health, invite_users, join_room, leave_room,
    list_my_rooms, list_participants, list_public_rooms, manage_participant, update_room,
    validate_room_code,
};

/// Runtime knobs threaded into the handlers
pub struct ServerConfig {
    pub invite_ttl_seconds: i64,
}
