/// Membership ledger: Participant entities per room, their roles, and the
/// ban list. `add_participant` re-validates the ban, duplicate and capacity
/// rules inside a single lock hold so racing joins cannot oversubscribe a
/// room and a committed ban is never shadowed by a stale membership.
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::models::{Ban, Participant, Role};
use super::DbPool;
use crate::error::{AccessError, AccessResult};

/// Membership ledger operations
pub struct MembershipLedger;

impl MembershipLedger {
    /// Add a membership record.
    /// Fails `Forbidden` if banned, `Conflict` if already a member,
    /// `RoomFull` at capacity, `NotFound` if the room is gone. All checks
    /// and the insert run in one transaction under the storage lock.
    pub async fn add_participant(
        pool: &DbPool,
        room_id: &str,
        user_id: &str,
        role: Role,
    ) -> AccessResult<Participant> {
        let mut conn = pool.lock().await;
        let tx = conn.transaction()?;

        let max: Option<i64> = tx
            .query_row(
                "SELECT max_participants FROM rooms WHERE id = ?1",
                params![room_id],
                |row| row.get(0),
            )
            .optional()?;
        let max = max.ok_or_else(|| AccessError::NotFound("room not found".into()))?;

        let banned: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM bans WHERE room_id = ?1 AND user_id = ?2",
                params![room_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        if banned.is_some() {
            return Err(AccessError::Forbidden(
                "you are banned from this room".into(),
            ));
        }

        let existing: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM participants WHERE room_id = ?1 AND user_id = ?2",
                params![room_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(AccessError::Conflict(
                "user is already a member of this room".into(),
            ));
        }

        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM participants WHERE room_id = ?1",
            params![room_id],
            |row| row.get(0),
        )?;
        if count >= max {
            return Err(AccessError::RoomFull("this room is full".into()));
        }

        let joined_at = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT INTO participants (room_id, user_id, role, joined_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![room_id, user_id, role.as_str(), joined_at],
        )?;
        tx.commit()?;

        Ok(Participant {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            role,
            joined_at,
        })
    }

    /// Remove a membership record; idempotent no-op when absent
    pub async fn remove_participant(
        pool: &DbPool,
        room_id: &str,
        user_id: &str,
    ) -> AccessResult<()> {
        let conn = pool.lock().await;
        conn.execute(
            "DELETE FROM participants WHERE room_id = ?1 AND user_id = ?2",
            params![room_id, user_id],
        )?;
        Ok(())
    }

    /// Change a member's role.
    /// `NotFound` if not a current member. Refuses transitions that would
    /// leave the room with zero owners or mint a second one: ownership
    /// transfer is not supported.
    pub async fn set_role(
        pool: &DbPool,
        room_id: &str,
        user_id: &str,
        new_role: Role,
    ) -> AccessResult<()> {
        let conn = pool.lock().await;
        let current = get_participant_sync(&conn, room_id, user_id)?
            .ok_or_else(|| AccessError::NotFound("user is not a member of this room".into()))?;

        if current.role == Role::Owner && new_role != Role::Owner {
            return Err(AccessError::InvalidState(
                "a room cannot be left without an owner".into(),
            ));
        }
        if new_role == Role::Owner && current.role != Role::Owner {
            return Err(AccessError::InvalidState(
                "ownership transfer is not supported".into(),
            ));
        }

        conn.execute(
            "UPDATE participants SET role = ?1 WHERE room_id = ?2 AND user_id = ?3",
            params![new_role.as_str(), room_id, user_id],
        )?;
        Ok(())
    }

    /// Current members ordered by join time ascending
    pub async fn list_participants(
        pool: &DbPool,
        room_id: &str,
    ) -> AccessResult<Vec<Participant>> {
        let conn = pool.lock().await;
        let mut stmt = conn.prepare(
            "SELECT room_id, user_id, role, joined_at FROM participants
             WHERE room_id = ?1 ORDER BY joined_at ASC, user_id ASC",
        )?;
        let rows = stmt.query_map(params![room_id], participant_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub async fn participant_count(pool: &DbPool, room_id: &str) -> AccessResult<i64> {
        let conn = pool.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM participants WHERE room_id = ?1",
            params![room_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub async fn get_participant(
        pool: &DbPool,
        room_id: &str,
        user_id: &str,
    ) -> AccessResult<Option<Participant>> {
        let conn = pool.lock().await;
        Ok(get_participant_sync(&conn, room_id, user_id)?)
    }

    pub async fn is_banned(pool: &DbPool, room_id: &str, user_id: &str) -> AccessResult<bool> {
        let conn = pool.lock().await;
        let hit: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM bans WHERE room_id = ?1 AND user_id = ?2",
                params![room_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    /// Remove any active membership and record the ban, atomically.
    /// Re-banning an already-banned user refreshes the record.
    pub async fn ban(
        pool: &DbPool,
        room_id: &str,
        user_id: &str,
        acting_user_id: &str,
    ) -> AccessResult<Ban> {
        let mut conn = pool.lock().await;
        let banned_at = Utc::now().to_rfc3339();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM participants WHERE room_id = ?1 AND user_id = ?2",
            params![room_id, user_id],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO bans (room_id, user_id, banned_by, banned_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![room_id, user_id, acting_user_id, banned_at],
        )?;
        tx.commit()?;

        Ok(Ban {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            banned_by: acting_user_id.to_string(),
            banned_at,
        })
    }

    /// Lift a ban; `NotFound` when no ban exists
    pub async fn unban(pool: &DbPool, room_id: &str, user_id: &str) -> AccessResult<()> {
        let conn = pool.lock().await;
        let removed = conn.execute(
            "DELETE FROM bans WHERE room_id = ?1 AND user_id = ?2",
            params![room_id, user_id],
        )?;
        if removed == 0 {
            return Err(AccessError::NotFound(
                "user is not banned from this room".into(),
            ));
        }
        Ok(())
    }

    pub async fn list_bans(pool: &DbPool, room_id: &str) -> AccessResult<Vec<Ban>> {
        let conn = pool.lock().await;
        let mut stmt = conn.prepare(
            "SELECT room_id, user_id, banned_by, banned_at FROM bans
             WHERE room_id = ?1 ORDER BY banned_at ASC",
        )?;
        let rows = stmt.query_map(params![room_id], |row| {
            Ok(Ban {
                room_id: row.get(0)?,
                user_id: row.get(1)?,
                banned_by: row.get(2)?,
                banned_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

pub(crate) fn get_participant_sync(
    conn: &Connection,
    room_id: &str,
    user_id: &str,
) -> rusqlite::Result<Option<Participant>> {
    let mut stmt = conn.prepare(
        "SELECT room_id, user_id, role, joined_at FROM participants
         WHERE room_id = ?1 AND user_id = ?2",
    )?;
    stmt.query_row(params![room_id, user_id], participant_from_row)
        .optional()
}

fn participant_from_row(row: &rusqlite::Row) -> rusqlite::Result<Participant> {
    let role_str: String = row.get(2)?;
    Ok(Participant {
        room_id: row.get(0)?,
        user_id: row.get(1)?,
        role: Role::parse(&role_str).unwrap_or(Role::Participant),
        joined_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::db::models::{NewRoom, Visibility};
    use crate::db::registry::RoomRegistry;

    async fn room_with_capacity(pool: &DbPool, owner: &str, capacity: u32) -> String {
        RoomRegistry::create_room(
            pool,
            owner,
            NewRoom {
                name: "Design Jam".into(),
                description: String::new(),
                visibility: Visibility::Public,
                password: None,
                max_participants: capacity,
            },
        )
        .await
        .expect("Failed to create room")
        .id
    }

    #[tokio::test]
    async fn test_add_participant() {
        let pool = create_test_pool();
        let room_id = room_with_capacity(&pool, "alice", 10).await;

        let p = MembershipLedger::add_participant(&pool, &room_id, "bob", Role::Participant)
            .await
            .expect("Failed to add participant");
        assert_eq!(p.user_id, "bob");
        assert_eq!(p.role, Role::Participant);

        let count = MembershipLedger::participant_count(&pool, &room_id)
            .await
            .expect("count failed");
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_add_participant_duplicate_conflicts() {
        let pool = create_test_pool();
        let room_id = room_with_capacity(&pool, "alice", 10).await;

        MembershipLedger::add_participant(&pool, &room_id, "bob", Role::Participant)
            .await
            .expect("first add failed");
        let err = MembershipLedger::add_participant(&pool, &room_id, "bob", Role::Participant)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn test_add_participant_at_capacity_fails() {
        let pool = create_test_pool();
        let room_id = room_with_capacity(&pool, "alice", 2).await;

        MembershipLedger::add_participant(&pool, &room_id, "bob", Role::Participant)
            .await
            .expect("add below capacity failed");
        let err = MembershipLedger::add_participant(&pool, &room_id, "carol", Role::Participant)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "room_full");

        let count = MembershipLedger::participant_count(&pool, &room_id)
            .await
            .expect("count failed");
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_add_participant_banned_fails() {
        let pool = create_test_pool();
        let room_id = room_with_capacity(&pool, "alice", 10).await;

        MembershipLedger::ban(&pool, &room_id, "mallory", "alice")
            .await
            .expect("ban failed");
        let err = MembershipLedger::add_participant(&pool, &room_id, "mallory", Role::Participant)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[tokio::test]
    async fn test_add_participant_unknown_room() {
        let pool = create_test_pool();
        let err = MembershipLedger::add_participant(&pool, "missing", "bob", Role::Participant)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_remove_participant_idempotent() {
        let pool = create_test_pool();
        let room_id = room_with_capacity(&pool, "alice", 10).await;

        MembershipLedger::add_participant(&pool, &room_id, "bob", Role::Participant)
            .await
            .expect("add failed");
        MembershipLedger::remove_participant(&pool, &room_id, "bob")
            .await
            .expect("remove failed");
        // Second removal is a no-op, not an error
        MembershipLedger::remove_participant(&pool, &room_id, "bob")
            .await
            .expect("repeated remove failed");

        let count = MembershipLedger::participant_count(&pool, &room_id)
            .await
            .expect("count failed");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_set_role_promote_and_demote() {
        let pool = create_test_pool();
        let room_id = room_with_capacity(&pool, "alice", 10).await;
        MembershipLedger::add_participant(&pool, &room_id, "bob", Role::Participant)
            .await
            .expect("add failed");

        MembershipLedger::set_role(&pool, &room_id, "bob", Role::Admin)
            .await
            .expect("promote failed");
        let bob = MembershipLedger::get_participant(&pool, &room_id, "bob")
            .await
            .expect("get failed")
            .expect("missing");
        assert_eq!(bob.role, Role::Admin);

        MembershipLedger::set_role(&pool, &room_id, "bob", Role::Participant)
            .await
            .expect("demote failed");
    }

    #[tokio::test]
    async fn test_set_role_guards_owner_invariant() {
        let pool = create_test_pool();
        let room_id = room_with_capacity(&pool, "alice", 10).await;
        MembershipLedger::add_participant(&pool, &room_id, "bob", Role::Participant)
            .await
            .expect("add failed");

        // Demoting the owner would leave zero owners
        let err = MembershipLedger::set_role(&pool, &room_id, "alice", Role::Admin)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");

        // Promoting anyone else to owner would mint a second one
        let err = MembershipLedger::set_role(&pool, &room_id, "bob", Role::Owner)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");

        let err = MembershipLedger::set_role(&pool, &room_id, "ghost", Role::Admin)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_list_participants_ordered_by_join_time() {
        let pool = create_test_pool();
        let room_id = room_with_capacity(&pool, "alice", 10).await;
        for user in ["bob", "carol"] {
            MembershipLedger::add_participant(&pool, &room_id, user, Role::Participant)
                .await
                .expect("add failed");
        }

        let members = MembershipLedger::list_participants(&pool, &room_id)
            .await
            .expect("list failed");
        let names: Vec<&str> = members.iter().map(|p| p.user_id.as_str()).collect();
        assert_eq!(names, vec!["alice", "bob", "carol"]);
    }

    #[tokio::test]
    async fn test_ban_removes_membership_and_blocks() {
        let pool = create_test_pool();
        let room_id = room_with_capacity(&pool, "alice", 10).await;
        MembershipLedger::add_participant(&pool, &room_id, "mallory", Role::Participant)
            .await
            .expect("add failed");

        let ban = MembershipLedger::ban(&pool, &room_id, "mallory", "alice")
            .await
            .expect("ban failed");
        assert_eq!(ban.banned_by, "alice");

        assert!(MembershipLedger::is_banned(&pool, &room_id, "mallory")
            .await
            .expect("is_banned failed"));
        let membership = MembershipLedger::get_participant(&pool, &room_id, "mallory")
            .await
            .expect("get failed");
        assert!(membership.is_none(), "Ban must remove the membership");

        let bans = MembershipLedger::list_bans(&pool, &room_id)
            .await
            .expect("list failed");
        assert_eq!(bans.len(), 1);
    }

    #[tokio::test]
    async fn test_unban_restores_joinability() {
        let pool = create_test_pool();
        let room_id = room_with_capacity(&pool, "alice", 10).await;

        MembershipLedger::ban(&pool, &room_id, "mallory", "alice")
            .await
            .expect("ban failed");
        MembershipLedger::unban(&pool, &room_id, "mallory")
            .await
            .expect("unban failed");

        assert!(!MembershipLedger::is_banned(&pool, &room_id, "mallory")
            .await
            .expect("is_banned failed"));
        MembershipLedger::add_participant(&pool, &room_id, "mallory", Role::Participant)
            .await
            .expect("rejoin after unban failed");
    }

    #[tokio::test]
    async fn test_unban_without_ban_is_not_found() {
        let pool = create_test_pool();
        let room_id = room_with_capacity(&pool, "alice", 10).await;
        let err = MembershipLedger::unban(&pool, &room_id, "bob")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
