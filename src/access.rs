/// Access coordinator: the join/leave state machine.
///
/// Per (room, user) the states are NonMember -> Member(role) -> NonMember,
/// with Banned as an absorbing state while a ban record exists. Join is
/// idempotent and safe to retry; the final insert re-validates ban,
/// duplicate and capacity rules atomically in the ledger.
use crate::credential;
use crate::db::invites::InviteStore;
use crate::db::ledger::MembershipLedger;
use crate::db::models::{
    InviteOutcome, InviteStatus, Participant, Role, Room, RoomPreview, ValidateCodeResponse,
};
use crate::db::registry::RoomRegistry;
use crate::db::DbPool;
use crate::error::{AccessError, AccessResult};
use crate::events::{MembershipEvent, MembershipFeed};

/// Result of a successful join
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub room: Room,
    pub membership: Participant,
    pub already_member: bool,
}

/// Result of a successful leave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left,
    /// The owner left an otherwise-empty room, which deletes it
    RoomDeleted,
}

/// Orchestrates join/leave/validate/invite against the stores
pub struct AccessCoordinator;

impl AccessCoordinator {
    /// Join a room by code.
    ///
    /// 1. Resolve the code (`NotFound`)
    /// 2. Reject banned users (`Forbidden`), regardless of password
    /// 3. Return the existing membership idempotently if already joined
    /// 4. Enforce the password gate unless a valid invite is consumed;
    ///    the requirement is independent of visibility
    /// 5. Enforce capacity (`RoomFull`)
    /// 6. Insert the membership with role `participant` and emit `Joined`
    pub async fn join_room(
        pool: &DbPool,
        feed: &MembershipFeed,
        code: &str,
        user_id: &str,
        password: Option<&str>,
    ) -> AccessResult<JoinOutcome> {
        let room = RoomRegistry::find_by_code(pool, code)
            .await?
            .ok_or_else(|| AccessError::NotFound("room not found".into()))?;

        if MembershipLedger::is_banned(pool, &room.id, user_id).await? {
            return Err(AccessError::Forbidden(
                "you are banned from this room".into(),
            ));
        }

        if let Some(existing) = MembershipLedger::get_participant(pool, &room.id, user_id).await? {
            return Ok(JoinOutcome {
                room,
                membership: existing,
                already_member: true,
            });
        }

        if let Some(hash) = &room.password_hash {
            let invited = InviteStore::consume(pool, &room.id, user_id).await?;
            if !invited {
                match password {
                    None => {
                        return Err(AccessError::InvalidCredentials(
                            "this room requires a password".into(),
                        ));
                    }
                    Some(candidate) if !credential::verify_secret(hash, candidate) => {
                        return Err(AccessError::InvalidCredentials(
                            "incorrect room password".into(),
                        ));
                    }
                    Some(_) => {}
                }
            }
        }

        let membership =
            match MembershipLedger::add_participant(pool, &room.id, user_id, Role::Participant)
                .await
            {
                Ok(p) => p,
                // Lost a race against an identical join: still idempotent
                Err(AccessError::Conflict(_)) => {
                    let existing =
                        MembershipLedger::get_participant(pool, &room.id, user_id).await?;
                    return match existing {
                        Some(p) => Ok(JoinOutcome {
                            room,
                            membership: p,
                            already_member: true,
                        }),
                        None => Err(AccessError::Conflict(
                            "user is already a member of this room".into(),
                        )),
                    };
                }
                Err(e) => return Err(e),
            };

        feed.publish(MembershipEvent::Joined {
            room_id: room.id.clone(),
            user_id: user_id.to_string(),
        });

        Ok(JoinOutcome {
            room,
            membership,
            already_member: false,
        })
    }

    /// Leave a room.
    ///
    /// The owner may not leave while other members remain (`Forbidden`);
    /// an owner leaving an otherwise-empty room deletes it instead of
    /// leaving it ownerless. Leaving a room one is not a member of is an
    /// idempotent no-op.
    pub async fn leave_room(
        pool: &DbPool,
        feed: &MembershipFeed,
        room_id: &str,
        user_id: &str,
    ) -> AccessResult<LeaveOutcome> {
        let room = RoomRegistry::find_by_id(pool, room_id)
            .await?
            .ok_or_else(|| AccessError::NotFound("room not found".into()))?;

        if room.owner_id == user_id {
            let count = MembershipLedger::participant_count(pool, room_id).await?;
            if count > 1 {
                return Err(AccessError::Forbidden(
                    "the owner cannot leave while other members remain; \
                     delete the room instead"
                        .into(),
                ));
            }
            RoomRegistry::delete_room(pool, room_id, user_id).await?;
            feed.publish(MembershipEvent::RoomDeleted {
                room_id: room_id.to_string(),
            });
            return Ok(LeaveOutcome::RoomDeleted);
        }

        let was_member = MembershipLedger::get_participant(pool, room_id, user_id)
            .await?
            .is_some();
        MembershipLedger::remove_participant(pool, room_id, user_id).await?;
        if was_member {
            feed.publish(MembershipEvent::Left {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
            });
        }
        Ok(LeaveOutcome::Left)
    }

    /// Read-only pre-check before committing to a join. Never mutates
    /// membership; reveals only whether a password is required and, when a
    /// candidate is supplied, whether it matches.
    pub async fn validate_room_code(
        pool: &DbPool,
        code: &str,
        password: Option<&str>,
    ) -> AccessResult<ValidateCodeResponse> {
        let room = match RoomRegistry::find_by_code(pool, code).await? {
            Some(room) => room,
            None => {
                return Ok(ValidateCodeResponse {
                    exists: false,
                    requires_password: false,
                    password_valid: None,
                    room: None,
                });
            }
        };

        let count = MembershipLedger::participant_count(pool, &room.id).await?;
        let password_valid = match (&room.password_hash, password) {
            (Some(hash), Some(candidate)) => Some(credential::verify_secret(hash, candidate)),
            _ => None,
        };

        Ok(ValidateCodeResponse {
            exists: true,
            requires_password: room.is_password_protected(),
            password_valid,
            room: Some(RoomPreview {
                name: room.name.clone(),
                description: room.description.clone(),
                visibility: room.visibility.as_str().to_string(),
                participant_count: count,
                max_participants: room.max_participants,
            }),
        })
    }

    /// Grant password-bypass capabilities to a list of users.
    /// Requires the requester to be a member with a moderating role.
    /// Already-members and banned users are reported, not granted.
    pub async fn invite_users(
        pool: &DbPool,
        room_id: &str,
        requester_id: &str,
        user_ids: &[String],
        ttl_seconds: i64,
    ) -> AccessResult<Vec<InviteOutcome>> {
        RoomRegistry::find_by_id(pool, room_id)
            .await?
            .ok_or_else(|| AccessError::NotFound("room not found".into()))?;

        let requester = MembershipLedger::get_participant(pool, room_id, requester_id)
            .await?
            .ok_or_else(|| AccessError::NotFound("you are not a member of this room".into()))?;
        if !requester.role.can_moderate() {
            return Err(AccessError::Forbidden(
                "only the owner or an admin can invite users".into(),
            ));
        }

        let mut outcomes = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            let status = if MembershipLedger::get_participant(pool, room_id, user_id)
                .await?
                .is_some()
            {
                InviteStatus::AlreadyMember
            } else if MembershipLedger::is_banned(pool, room_id, user_id).await? {
                InviteStatus::Banned
            } else {
                InviteStore::grant(pool, room_id, user_id, requester_id, ttl_seconds).await?;
                InviteStatus::Invited
            };
            outcomes.push(InviteOutcome {
                user_id: user_id.clone(),
                status,
            });
        }

        Ok(outcomes)
    }
}
