/// Room registry: canonical Room entities.
/// Creation (with join-code allocation), lookup, public listing, update
/// and cascading deletion. Creation inserts the owner's membership in the
/// same transaction so a room is never observable without its owner.
use chrono::Utc;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::models::{NewRoom, Role, Room, RoomPatch, RoomSort, Visibility};
use super::DbPool;
use crate::credential;
use crate::error::{AccessError, AccessResult};

/// Join-code alphabet: uppercase alphanumerics minus lookalikes (0/O, 1/I)
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 6;
const CODE_RETRIES: usize = 8;

const ROOM_COLUMNS: &str =
    "id, code, name, description, visibility, password_hash, owner_id, max_participants, \
     created_at, updated_at";

/// Room registry operations
pub struct RoomRegistry;

impl RoomRegistry {
    /// Create a room and seed its owner membership.
    /// Retries code generation on UNIQUE collision; `Conflict` once retries
    /// exhaust.
    pub async fn create_room(
        pool: &DbPool,
        owner_id: &str,
        new_room: NewRoom,
    ) -> AccessResult<Room> {
        let name = new_room.name.trim().to_string();
        if name.is_empty() {
            return Err(AccessError::Validation("room name must not be empty".into()));
        }
        if new_room.max_participants < 1 {
            return Err(AccessError::Validation(
                "max_participants must be at least 1".into(),
            ));
        }
        // Hash outside the storage lock; hashing needs no database state
        let password_hash = match &new_room.password {
            Some(p) => Some(credential::hash_secret(p)?),
            None => None,
        };

        let mut conn = pool.lock().await;
        let now = Utc::now().to_rfc3339();
        let id = Uuid::new_v4().to_string();
        let tx = conn.transaction()?;

        let mut code = generate_code();
        let mut attempts = 0;
        loop {
            let inserted = tx.execute(
                "INSERT INTO rooms (id, code, name, description, visibility, password_hash, \
                 owner_id, max_participants, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    code,
                    name,
                    new_room.description,
                    new_room.visibility.as_str(),
                    password_hash,
                    owner_id,
                    new_room.max_participants,
                    now,
                    now,
                ],
            );
            match inserted {
                Ok(_) => break,
                Err(e) if super::is_constraint_violation(&e) => {
                    attempts += 1;
                    if attempts >= CODE_RETRIES {
                        return Err(AccessError::Conflict(
                            "could not allocate a unique room code".into(),
                        ));
                    }
                    code = generate_code();
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.execute(
            "INSERT INTO participants (room_id, user_id, role, joined_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, owner_id, Role::Owner.as_str(), now],
        )?;
        tx.commit()?;

        Ok(Room {
            id,
            code,
            name,
            description: new_room.description,
            visibility: new_room.visibility,
            password_hash,
            owner_id: owner_id.to_string(),
            max_participants: new_room.max_participants,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Look up a room by its join code
    pub async fn find_by_code(pool: &DbPool, code: &str) -> AccessResult<Option<Room>> {
        let conn = pool.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM rooms WHERE code = ?1",
            ROOM_COLUMNS
        ))?;
        let room = stmt.query_row(params![code], room_from_row).optional()?;
        Ok(room)
    }

    /// Look up a room by id
    pub async fn find_by_id(pool: &DbPool, room_id: &str) -> AccessResult<Option<Room>> {
        let conn = pool.lock().await;
        Ok(find_by_id_sync(&conn, room_id)?)
    }

    /// List public rooms with derived participant counts.
    /// Returns (rooms-with-counts, total matching). `popular` sorts by
    /// current participant count descending.
    pub async fn list_public(
        pool: &DbPool,
        search: Option<&str>,
        sort: RoomSort,
        page: u32,
        limit: u32,
    ) -> AccessResult<(Vec<(Room, i64)>, i64)> {
        let conn = pool.lock().await;
        let order = match sort {
            RoomSort::Popular => "participant_count DESC, r.created_at DESC",
            RoomSort::Newest => "r.created_at DESC",
            RoomSort::Name => "r.name COLLATE NOCASE ASC",
        };
        let page = page.max(1);
        let offset = (page as i64 - 1) * limit as i64;

        // ORDER BY cannot be bound as a parameter; the order string is one
        // of three static values above.
        let sql = format!(
            "SELECT r.id, r.code, r.name, r.description, r.visibility, r.password_hash, \
             r.owner_id, r.max_participants, r.created_at, r.updated_at, \
             (SELECT COUNT(*) FROM participants p WHERE p.room_id = r.id) AS participant_count
             FROM rooms r
             WHERE r.visibility = 'public'
               AND (?1 IS NULL OR r.name LIKE '%' || ?1 || '%')
             ORDER BY {}
             LIMIT ?2 OFFSET ?3",
            order
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![search, limit as i64, offset], |row| {
            let room = room_from_row(row)?;
            let count: i64 = row.get(10)?;
            Ok((room, count))
        })?;
        let rooms = rows.collect::<Result<Vec<_>, _>>()?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM rooms
             WHERE visibility = 'public' AND (?1 IS NULL OR name LIKE '%' || ?1 || '%')",
            params![search],
            |row| row.get(0),
        )?;

        Ok((rooms, total))
    }

    /// Rooms the user currently belongs to, with counts and the user's role
    pub async fn list_for_user(
        pool: &DbPool,
        user_id: &str,
    ) -> AccessResult<Vec<(Room, i64, Role)>> {
        let conn = pool.lock().await;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.code, r.name, r.description, r.visibility, r.password_hash, \
             r.owner_id, r.max_participants, r.created_at, r.updated_at, \
             (SELECT COUNT(*) FROM participants p WHERE p.room_id = r.id) AS participant_count, \
             m.role
             FROM rooms r
             JOIN participants m ON m.room_id = r.id
             WHERE m.user_id = ?1
             ORDER BY m.joined_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            let room = room_from_row(row)?;
            let count: i64 = row.get(10)?;
            let role_str: String = row.get(11)?;
            let role = Role::parse(&role_str).unwrap_or(Role::Participant);
            Ok((room, count, role))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Apply an owner-gated patch. Visibility and password follow the same
    /// optionality rules as creation; `updated_at` is bumped.
    pub async fn update_room(
        pool: &DbPool,
        room_id: &str,
        requester_id: &str,
        patch: RoomPatch,
    ) -> AccessResult<Room> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(AccessError::Validation("room name must not be empty".into()));
            }
        }
        if let Some(max) = patch.max_participants {
            if max < 1 {
                return Err(AccessError::Validation(
                    "max_participants must be at least 1".into(),
                ));
            }
        }
        let password_patch = match patch.password {
            Some(Some(ref p)) => Some(Some(credential::hash_secret(p)?)),
            Some(None) => Some(None),
            None => None,
        };

        let conn = pool.lock().await;
        let room = find_by_id_sync(&conn, room_id)?
            .ok_or_else(|| AccessError::NotFound("room not found".into()))?;
        if room.owner_id != requester_id {
            return Err(AccessError::Forbidden(
                "only the room owner can update the room".into(),
            ));
        }

        let name = patch
            .name
            .map(|n| n.trim().to_string())
            .unwrap_or(room.name);
        let description = patch.description.unwrap_or(room.description);
        let visibility = patch.visibility.unwrap_or(room.visibility);
        let max_participants = patch.max_participants.unwrap_or(room.max_participants);
        let password_hash = match password_patch {
            Some(p) => p,
            None => room.password_hash,
        };
        let updated_at = Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE rooms SET name = ?1, description = ?2, visibility = ?3, password_hash = ?4, \
             max_participants = ?5, updated_at = ?6 WHERE id = ?7",
            params![
                name,
                description,
                visibility.as_str(),
                password_hash,
                max_participants,
                updated_at,
                room_id,
            ],
        )?;

        Ok(Room {
            id: room.id,
            code: room.code,
            name,
            description,
            visibility,
            password_hash,
            owner_id: room.owner_id,
            max_participants,
            created_at: room.created_at,
            updated_at,
        })
    }

    /// Owner-only deletion, cascading membership, ban and invite cleanup
    pub async fn delete_room(
        pool: &DbPool,
        room_id: &str,
        requester_id: &str,
    ) -> AccessResult<()> {
        let mut conn = pool.lock().await;
        let room = find_by_id_sync(&conn, room_id)?
            .ok_or_else(|| AccessError::NotFound("room not found".into()))?;
        if room.owner_id != requester_id {
            return Err(AccessError::Forbidden(
                "only the room owner can delete the room".into(),
            ));
        }

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM invites WHERE room_id = ?1", params![room_id])?;
        tx.execute("DELETE FROM bans WHERE room_id = ?1", params![room_id])?;
        tx.execute(
            "DELETE FROM participants WHERE room_id = ?1",
            params![room_id],
        )?;
        tx.execute("DELETE FROM rooms WHERE id = ?1", params![room_id])?;
        tx.commit()?;

        Ok(())
    }
}

/// Internal lookup usable while the caller already holds the lock
pub(crate) fn find_by_id_sync(
    conn: &Connection,
    room_id: &str,
) -> rusqlite::Result<Option<Room>> {
    let mut stmt = conn.prepare(&format!("SELECT {} FROM rooms WHERE id = ?1", ROOM_COLUMNS))?;
    stmt.query_row(params![room_id], room_from_row).optional()
}

fn room_from_row(row: &rusqlite::Row) -> rusqlite::Result<Room> {
    let visibility_str: String = row.get(4)?;
    Ok(Room {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        // Fail closed on an unrecognized stored value
        visibility: Visibility::parse(&visibility_str).unwrap_or(Visibility::Private),
        password_hash: row.get(5)?,
        owner_id: row.get(6)?,
        max_participants: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect()
}
