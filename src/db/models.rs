/// Data models for the room access subsystem.
/// Canonical entities (Room, Participant, Ban, Invite) plus the DTO layer
/// that forms the single translation boundary with external callers:
/// visibility travels as a string, password protection as a derived
/// boolean, and participant counts as derived integers. The stored
/// password hash never crosses this boundary.
use serde::{Deserialize, Serialize};

use crate::error::{AccessError, AccessResult};

/// Capacity applied when a room is created without an explicit limit
pub const DEFAULT_MAX_PARTICIPANTS: u32 = 50;

/// Room discoverability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

/// Ordered authorization level of a room member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Participant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Participant => "participant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Role::Owner),
            "admin" => Some(Role::Admin),
            "participant" => Some(Role::Participant),
            _ => None,
        }
    }

    /// Owners and admins may moderate (kick, ban, unban, invite)
    pub fn can_moderate(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

/// Canonical room entity.
///
/// Deliberately does not derive Serialize: the password hash must not leak
/// through a careless `json(room)`; callers go through [`RoomResponse`].
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    pub password_hash: Option<String>,
    pub owner_id: String,
    pub max_participants: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl Room {
    pub fn is_password_protected(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// A user's current membership in a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub room_id: String,
    pub user_id: String,
    pub role: Role,
    pub joined_at: String,
}

/// A persistent record blocking a user from rejoining a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ban {
    pub room_id: String,
    pub user_id: String,
    pub banned_by: String,
    pub banned_at: String,
}

/// A password-bypass capability grant with a validity window.
/// Epoch-second timestamps; valid iff not consumed and not expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invite {
    pub room_id: String,
    pub user_id: String,
    pub invited_by: String,
    pub granted_at: i64,
    pub expires_at: i64,
    pub consumed_at: Option<i64>,
}

/// Validated creation parameters, produced from [`CreateRoomRequest`]
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    pub password: Option<String>,
    pub max_participants: u32,
}

/// Typed patch for room updates. `password` is tri-state: `None` leaves
/// the secret alone, `Some(None)` clears it, `Some(Some(p))` replaces it.
#[derive(Debug, Clone, Default)]
pub struct RoomPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
    pub max_participants: Option<u32>,
    pub password: Option<Option<String>>,
}

/// Public-room listing sort orders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomSort {
    Newest,
    Popular,
    Name,
}

impl RoomSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "newest" => Some(RoomSort::Newest),
            "popular" => Some(RoomSort::Popular),
            "name" => Some(RoomSort::Name),
            _ => None,
        }
    }
}

// Request/Response DTOs

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub max_participants: Option<u32>,
}

impl CreateRoomRequest {
    /// Translate the external representation into validated parameters.
    pub fn into_new_room(self) -> AccessResult<NewRoom> {
        let visibility = match self.visibility.as_deref() {
            None => Visibility::Public,
            Some(v) => Visibility::parse(v).ok_or_else(|| {
                AccessError::Validation(format!("unknown visibility '{}'", v))
            })?,
        };
        Ok(NewRoom {
            name: self.name,
            description: self.description.unwrap_or_default(),
            visibility,
            password: self.password,
            max_participants: self.max_participants.unwrap_or(DEFAULT_MAX_PARTICIPANTS),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct UpdateRoomRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub max_participants: Option<u32>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub remove_password: Option<bool>,
}

impl UpdateRoomRequest {
    pub fn into_patch(self) -> AccessResult<RoomPatch> {
        let visibility = match self.visibility.as_deref() {
            None => None,
            Some(v) => Some(Visibility::parse(v).ok_or_else(|| {
                AccessError::Validation(format!("unknown visibility '{}'", v))
            })?),
        };
        let password = if self.remove_password.unwrap_or(false) {
            if self.password.is_some() {
                return Err(AccessError::Validation(
                    "cannot set and remove the password in the same request".into(),
                ));
            }
            Some(None)
        } else {
            self.password.map(Some)
        };
        Ok(RoomPatch {
            name: self.name,
            description: self.description,
            visibility,
            max_participants: self.max_participants,
            password,
        })
    }
}

/// External room representation: derived `has_password` and count, no hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomResponse {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: String,
    pub visibility: String,
    pub has_password: bool,
    pub owner_id: String,
    pub max_participants: u32,
    pub participant_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl RoomResponse {
    pub fn from_room(room: &Room, participant_count: i64) -> Self {
        RoomResponse {
            id: room.id.clone(),
            code: room.code.clone(),
            name: room.name.clone(),
            description: room.description.clone(),
            visibility: room.visibility.as_str().to_string(),
            has_password: room.is_password_protected(),
            owner_id: room.owner_id.clone(),
            max_participants: room.max_participants,
            participant_count,
            created_at: room.created_at.clone(),
            updated_at: room.updated_at.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MyRoomResponse {
    #[serde(flatten)]
    pub room: RoomResponse,
    pub my_role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomResponse>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRoomRequest {
    pub code: String,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRoomResponse {
    pub room: RoomResponse,
    pub membership: Participant,
    pub already_member: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateCodeRequest {
    pub code: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Read-only pre-check payload; reveals whether a password is required
/// and whether a supplied candidate matches, never the secret itself.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateCodeResponse {
    pub exists: bool,
    pub requires_password: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomPreview>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RoomPreview {
    pub name: String,
    pub description: String,
    pub visibility: String,
    pub participant_count: i64,
    pub max_participants: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InviteUsersRequest {
    pub user_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Invited,
    AlreadyMember,
    Banned,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InviteOutcome {
    pub user_id: String,
    pub status: InviteStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ManageParticipantRequest {
    pub action: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaveRoomResponse {
    pub left: bool,
    pub room_deleted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [Role::Owner, Role::Admin, Role::Participant] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("moderator"), None);
    }

    #[test]
    fn test_visibility_round_trip() {
        assert_eq!(Visibility::parse("public"), Some(Visibility::Public));
        assert_eq!(Visibility::parse("private"), Some(Visibility::Private));
        assert_eq!(Visibility::parse("hidden"), None);
    }

    #[test]
    fn test_only_owner_and_admin_moderate() {
        assert!(Role::Owner.can_moderate());
        assert!(Role::Admin.can_moderate());
        assert!(!Role::Participant.can_moderate());
    }

    #[test]
    fn test_create_request_defaults() {
        let req: CreateRoomRequest =
            serde_json::from_str(r#"{"name": "Design Jam"}"#).expect("Deserialization failed");
        let new_room = req.into_new_room().expect("Conversion failed");
        assert_eq!(new_room.name, "Design Jam");
        assert_eq!(new_room.visibility, Visibility::Public);
        assert_eq!(new_room.max_participants, DEFAULT_MAX_PARTICIPANTS);
        assert!(new_room.password.is_none());
    }

    #[test]
    fn test_create_request_rejects_unknown_visibility() {
        let req: CreateRoomRequest =
            serde_json::from_str(r#"{"name": "x", "visibility": "hidden"}"#)
                .expect("Deserialization failed");
        let err = req.into_new_room().unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_update_request_password_tristate() {
        let keep = UpdateRoomRequest::default().into_patch().expect("patch");
        assert!(keep.password.is_none());

        let set = UpdateRoomRequest {
            password: Some("s3cret".into()),
            ..Default::default()
        }
        .into_patch()
        .expect("patch");
        assert_eq!(set.password, Some(Some("s3cret".into())));

        let clear = UpdateRoomRequest {
            remove_password: Some(true),
            ..Default::default()
        }
        .into_patch()
        .expect("patch");
        assert_eq!(clear.password, Some(None));

        let conflicting = UpdateRoomRequest {
            password: Some("s3cret".into()),
            remove_password: Some(true),
            ..Default::default()
        }
        .into_patch();
        assert!(conflicting.is_err());
    }

    #[test]
    fn test_room_response_hides_password_hash() {
        let room = Room {
            id: "r1".into(),
            code: "ABC234".into(),
            name: "Design Jam".into(),
            description: String::new(),
            visibility: Visibility::Public,
            password_hash: Some("$argon2id$v=19$secret".into()),
            owner_id: "u1".into(),
            max_participants: 50,
            created_at: "2025-11-03T10:00:00+00:00".into(),
            updated_at: "2025-11-03T10:00:00+00:00".into(),
        };
        let json = serde_json::to_string(&RoomResponse::from_room(&room, 3))
            .expect("Serialization failed");
        assert!(!json.contains("argon2"));
        assert!(json.contains(r#""has_password":true"#));
        assert!(json.contains(r#""participant_count":3"#));
    }

    #[test]
    fn test_invite_status_serializes_snake_case() {
        let json = serde_json::to_string(&InviteOutcome {
            user_id: "u2".into(),
            status: InviteStatus::AlreadyMember,
        })
        .expect("Serialization failed");
        assert!(json.contains(r#""status":"already_member""#));
    }
}
