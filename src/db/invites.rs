/// Invite grant storage: per-(room, user) password-bypass capabilities
/// with a validity window.
///
/// This module provides:
/// - Grant recording with TTL (re-granting refreshes the window)
/// - Consume-on-use semantics (a grant authorizes exactly one join)
/// - Expiry-based lazy garbage collection
use rusqlite::{params, OptionalExtension};
use std::time::{SystemTime, UNIX_EPOCH};

use super::models::Invite;
use super::DbPool;
use crate::error::AccessResult;

/// Invite grant storage operations
pub struct InviteStore;

impl InviteStore {
    /// Record a grant for `user_id`, valid for `ttl_seconds` from now.
    /// An existing grant (consumed or not) is replaced, refreshing the
    /// window.
    pub async fn grant(
        pool: &DbPool,
        room_id: &str,
        user_id: &str,
        invited_by: &str,
        ttl_seconds: i64,
    ) -> AccessResult<Invite> {
        let conn = pool.lock().await;
        let now = now_epoch();
        let expires_at = now + ttl_seconds;

        conn.execute(
            "INSERT OR REPLACE INTO invites \
             (room_id, user_id, invited_by, granted_at, expires_at, consumed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            params![room_id, user_id, invited_by, now, expires_at],
        )?;

        Ok(Invite {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            invited_by: invited_by.to_string(),
            granted_at: now,
            expires_at,
            consumed_at: None,
        })
    }

    /// True when an unconsumed, unexpired grant exists
    pub async fn has_valid(pool: &DbPool, room_id: &str, user_id: &str) -> AccessResult<bool> {
        let conn = pool.lock().await;
        let now = now_epoch();
        let hit: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM invites
                 WHERE room_id = ?1 AND user_id = ?2
                   AND consumed_at IS NULL AND expires_at > ?3",
                params![room_id, user_id, now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }

    /// Consume a valid grant. Returns true when one was consumed; false
    /// when none exists, it expired, or it was already used. Expired rows
    /// are purged opportunistically, as with any invite mutation.
    pub async fn consume(pool: &DbPool, room_id: &str, user_id: &str) -> AccessResult<bool> {
        let conn = pool.lock().await;
        let now = now_epoch();
        purge_expired_sync(&conn, now)?;

        let updated = conn.execute(
            "UPDATE invites SET consumed_at = ?1
             WHERE room_id = ?2 AND user_id = ?3
               AND consumed_at IS NULL AND expires_at > ?1",
            params![now, room_id, user_id],
        )?;
        Ok(updated > 0)
    }

    /// Delete expired grants. Returns the number of rows removed.
    pub async fn purge_expired(pool: &DbPool) -> AccessResult<usize> {
        let conn = pool.lock().await;
        Ok(purge_expired_sync(&conn, now_epoch())?)
    }

    /// Fetch a grant regardless of validity (diagnostics and tests)
    pub async fn get(
        pool: &DbPool,
        room_id: &str,
        user_id: &str,
    ) -> AccessResult<Option<Invite>> {
        let conn = pool.lock().await;
        let mut stmt = conn.prepare(
            "SELECT room_id, user_id, invited_by, granted_at, expires_at, consumed_at
             FROM invites WHERE room_id = ?1 AND user_id = ?2",
        )?;
        let invite = stmt
            .query_row(params![room_id, user_id], |row| {
                Ok(Invite {
                    room_id: row.get(0)?,
                    user_id: row.get(1)?,
                    invited_by: row.get(2)?,
                    granted_at: row.get(3)?,
                    expires_at: row.get(4)?,
                    consumed_at: row.get(5)?,
                })
            })
            .optional()?;
        Ok(invite)
    }
}

fn purge_expired_sync(conn: &rusqlite::Connection, now: i64) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM invites WHERE expires_at <= ?1", params![now])
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
