/// Storage layer for rooms, participants, bans and invite grants.
///
/// All state lives in SQLite behind a single connection guarded by an async
/// mutex: every mutation holds the lock for its whole read-check-write span,
/// which is what serializes each room's membership transitions (capacity
/// checks cannot race, and a committed ban is observed by any later join).

pub mod init;
pub mod invites;
pub mod ledger;
pub mod models;
pub mod registry;

use rusqlite::{Connection, Result as SqliteResult};
use std::sync::Arc;
use tokio::sync::Mutex;

pub type DbPool = Arc<Mutex<Connection>>;

/// Create a connection pool (simplified for single-threaded SQLite)
pub fn create_pool(db_path: &str) -> SqliteResult<DbPool> {
    let conn = Connection::open(db_path)?;
    init::initialize_database(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Create an in-memory database for testing
pub fn create_test_pool() -> DbPool {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory DB");
    init::initialize_database(&conn).expect("Failed to initialize DB");
    Arc::new(Mutex::new(conn))
}

/// True when the error is a SQLite uniqueness/constraint violation.
/// Used for room-code collision retries and duplicate-membership detection.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
