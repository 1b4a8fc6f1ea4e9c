//! SQLite connection handling.
//!
//! One connection behind a mutex, shared by the session store and the lead
//! directory. File databases run in WAL mode; both kinds run the schema
//! migrations on open.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, Transaction};
use tracing::info;

use crm_core::error::CrmError;

use crate::migrations;

const FILE_PRAGMAS: &str = "PRAGMA journal_mode = WAL;
     PRAGMA synchronous = NORMAL;
     PRAGMA busy_timeout = 5000;
     PRAGMA foreign_keys = ON;";

const MEMORY_PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

/// Shared SQLite handle. `rusqlite::Connection` is not `Sync`, so every
/// access goes through [`Database::with_conn`].
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database file at `path`, creating parent
    /// directories as needed.
    pub fn new(path: &Path) -> Result<Self, CrmError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| {
            CrmError::Storage(format!("Failed to open database {}: {}", path.display(), e))
        })?;
        let db = Self::prepare(conn, FILE_PRAGMAS)?;
        info!(path = %path.display(), "Database ready");
        Ok(db)
    }

    /// A private in-memory database, used by tests and ephemeral runs.
    pub fn in_memory() -> Result<Self, CrmError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CrmError::Storage(format!("Failed to open in-memory db: {}", e)))?;
        Self::prepare(conn, MEMORY_PRAGMAS)
    }

    fn prepare(conn: Connection, pragmas: &str) -> Result<Self, CrmError> {
        conn.execute_batch(pragmas)
            .map_err(|e| CrmError::Storage(format!("Failed to set pragmas: {}", e)))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Run `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, CrmError>
    where
        F: FnOnce(&Connection) -> Result<T, CrmError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CrmError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run `f` inside a transaction. Commits when `f` succeeds, rolls back
    /// when it fails.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, CrmError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, CrmError>,
    {
        self.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| CrmError::Storage(format!("Failed to begin transaction: {}", e)))?;
            let value = f(&tx)?;
            tx.commit()
                .map_err(|e| CrmError::Storage(format!("Failed to commit transaction: {}", e)))?;
            Ok(value)
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}
