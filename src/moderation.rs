/// Moderation authority: who may kick, ban, unban, promote and demote,
/// and the membership transition each action applies.
///
/// | action  | actor        | effect                         |
/// |---------|--------------|--------------------------------|
/// | kick    | owner, admin | remove membership              |
/// | ban     | owner, admin | remove membership + ban record |
/// | unban   | owner, admin | remove ban record              |
/// | promote | owner        | participant -> admin           |
/// | demote  | owner        | admin -> participant           |
///
/// The owner can never be targeted; self-targeted actions are rejected
/// (leave covers that case).
use serde::{Deserialize, Serialize};

use crate::db::ledger::MembershipLedger;
use crate::db::models::Role;
use crate::db::registry::RoomRegistry;
use crate::db::DbPool;
use crate::error::{AccessError, AccessResult};
use crate::events::{MembershipEvent, MembershipFeed};

/// Closed set of moderation actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    Kick,
    Ban,
    Unban,
    Promote,
    Demote,
}

impl ModerationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationAction::Kick => "kick",
            ModerationAction::Ban => "ban",
            ModerationAction::Unban => "unban",
            ModerationAction::Promote => "promote",
            ModerationAction::Demote => "demote",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kick" => Some(ModerationAction::Kick),
            "ban" => Some(ModerationAction::Ban),
            "unban" => Some(ModerationAction::Unban),
            "promote" => Some(ModerationAction::Promote),
            "demote" => Some(ModerationAction::Demote),
            _ => None,
        }
    }
}

/// Applies moderation actions after enforcing the authorization matrix
pub struct ModerationAuthority;

impl ModerationAuthority {
    pub async fn manage_participant(
        pool: &DbPool,
        feed: &MembershipFeed,
        room_id: &str,
        acting_user_id: &str,
        target_user_id: &str,
        action: ModerationAction,
    ) -> AccessResult<()> {
        let room = RoomRegistry::find_by_id(pool, room_id)
            .await?
            .ok_or_else(|| AccessError::NotFound("room not found".into()))?;

        if acting_user_id == target_user_id {
            return Err(AccessError::InvalidOperation(format!(
                "cannot {} yourself",
                action.as_str()
            )));
        }

        let actor = MembershipLedger::get_participant(pool, room_id, acting_user_id)
            .await?
            .ok_or_else(|| {
                AccessError::Forbidden("you are not a member of this room".into())
            })?;

        match action {
            ModerationAction::Kick => {
                if !actor.role.can_moderate() {
                    return Err(AccessError::Forbidden(
                        "only the owner or an admin can kick".into(),
                    ));
                }
                if target_user_id == room.owner_id {
                    return Err(AccessError::Forbidden("the owner cannot be kicked".into()));
                }
                MembershipLedger::get_participant(pool, room_id, target_user_id)
                    .await?
                    .ok_or_else(|| {
                        AccessError::NotFound("user is not a member of this room".into())
                    })?;
                MembershipLedger::remove_participant(pool, room_id, target_user_id).await?;
                feed.publish(MembershipEvent::Kicked {
                    room_id: room_id.to_string(),
                    user_id: target_user_id.to_string(),
                    by: acting_user_id.to_string(),
                });
            }
            ModerationAction::Ban => {
                if !actor.role.can_moderate() {
                    return Err(AccessError::Forbidden(
                        "only the owner or an admin can ban".into(),
                    ));
                }
                if target_user_id == room.owner_id {
                    return Err(AccessError::Forbidden("the owner cannot be banned".into()));
                }
                MembershipLedger::ban(pool, room_id, target_user_id, acting_user_id).await?;
                feed.publish(MembershipEvent::Banned {
                    room_id: room_id.to_string(),
                    user_id: target_user_id.to_string(),
                    by: acting_user_id.to_string(),
                });
            }
            ModerationAction::Unban => {
                if !actor.role.can_moderate() {
                    return Err(AccessError::Forbidden(
                        "only the owner or an admin can unban".into(),
                    ));
                }
                MembershipLedger::unban(pool, room_id, target_user_id).await?;
                feed.publish(MembershipEvent::Unbanned {
                    room_id: room_id.to_string(),
                    user_id: target_user_id.to_string(),
                    by: acting_user_id.to_string(),
                });
            }
            ModerationAction::Promote => {
                if actor.role != Role::Owner {
                    return Err(AccessError::Forbidden(
                        "only the owner can promote".into(),
                    ));
                }
                let target = MembershipLedger::get_participant(pool, room_id, target_user_id)
                    .await?
                    .ok_or_else(|| {
                        AccessError::NotFound("user is not a member of this room".into())
                    })?;
                if target.role != Role::Participant {
                    return Err(AccessError::Forbidden(
                        "user is already an admin".into(),
                    ));
                }
                MembershipLedger::set_role(pool, room_id, target_user_id, Role::Admin).await?;
                feed.publish(MembershipEvent::RoleChanged {
                    room_id: room_id.to_string(),
                    user_id: target_user_id.to_string(),
                    role: Role::Admin,
                    by: acting_user_id.to_string(),
                });
            }
            ModerationAction::Demote => {
                if actor.role != Role::Owner {
                    return Err(AccessError::Forbidden(
                        "only the owner can demote".into(),
                    ));
                }
                let target = MembershipLedger::get_participant(pool, room_id, target_user_id)
                    .await?
                    .ok_or_else(|| {
                        AccessError::NotFound("user is not a member of this room".into())
                    })?;
                match target.role {
                    Role::Owner => {
                        return Err(AccessError::Forbidden(
                            "the owner cannot be demoted".into(),
                        ));
                    }
                    Role::Participant => {
                        return Err(AccessError::Forbidden("user is not an admin".into()));
                    }
                    Role::Admin => {}
                }
                MembershipLedger::set_role(pool, room_id, target_user_id, Role::Participant)
                    .await?;
                feed.publish(MembershipEvent::RoleChanged {
                    room_id: room_id.to_string(),
                    user_id: target_user_id.to_string(),
                    role: Role::Participant,
                    by: acting_user_id.to_string(),
                });
            }
        }

        Ok(())
    }
}
