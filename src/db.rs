// Database handle + schema setup
// One SQLite file holds both tables: the identity roster and the
// append-only attendance ledger.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared database handle.
///
/// The scan loop (reader/appender) and the admin surface (reader/writer)
/// hold clones of the same handle; the inner mutex serializes writes so a
/// concurrent enroll/delete cannot interleave with an in-progress
/// identify/append.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and run schema setup.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Acquire the connection for one synchronous operation.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock only means another thread panicked mid-operation;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Identities Table (employee roster, keyed by business id e.g. RUT)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS identities (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            role TEXT NOT NULL,
            template BLOB,
            enrolled_at TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create identities table")?;

    // ==========================================================================
    // Attendance Events Table (append-only ledger)
    // seq preserves append order for same-timestamp tie-breaks
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_events (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            identity_id TEXT NOT NULL,
            display_name TEXT NOT NULL,
            date TEXT NOT NULL,
            time TEXT NOT NULL,
            action TEXT NOT NULL,
            method TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .context("Failed to create attendance_events table")?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_identity ON attendance_events(identity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_date ON attendance_events(date, time)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_shared_handle_sees_same_data() {
        let db = Database::open_in_memory().unwrap();
        let db2 = db.clone();

        db.lock()
            .execute(
                "INSERT INTO identities (id, display_name, role) VALUES (?1, ?2, ?3)",
                rusqlite::params!["11.111.111-1", "Ana Soto", "Docente"],
            )
            .unwrap();

        let count: i64 = db2
            .lock()
            .query_row("SELECT COUNT(*) FROM identities", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
