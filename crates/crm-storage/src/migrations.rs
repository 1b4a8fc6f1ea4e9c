//! Database schema migrations.
//!
//! Applies the initial schema: the chat_sessions and leads tables plus the
//! schema_migrations bookkeeping table.

use rusqlite::Connection;
use tracing::info;

use crm_core::error::CrmError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), CrmError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| CrmError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| CrmError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), CrmError> {
    conn.execute_batch(
        "
        -- One row per conversation; the full session is stored as JSON.
        CREATE TABLE IF NOT EXISTS chat_sessions (
            session_id      TEXT PRIMARY KEY NOT NULL,
            document        TEXT NOT NULL,
            has_pending     INTEGER NOT NULL DEFAULT 0,
            last_active     INTEGER NOT NULL,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_chat_sessions_last_active
            ON chat_sessions (last_active DESC);

        -- Lead documents. Names are stored lowercased for lookups.
        CREATE TABLE IF NOT EXISTS leads (
            id                  TEXT PRIMARY KEY NOT NULL,
            first_name_folded   TEXT NOT NULL,
            last_name_folded    TEXT NOT NULL,
            email               TEXT NOT NULL UNIQUE,
            document            TEXT NOT NULL,
            created_at          INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_leads_name
            ON leads (first_name_folded, last_name_folded);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| CrmError::Storage(format!("Migration v1 failed: {}", e)))?;
    Ok(())
}
