//! Chat session persistence.
//!
//! The router loads a session, mutates it, and saves it back once per
//! request. Saves replace the whole document, so two concurrent requests on
//! the same key race and the last save wins.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::OptionalExtension;

use crm_core::error::CrmError;
use crm_core::types::ChatSession;

use crate::db::Database;

/// Keyed storage for conversation state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the session for `key`, if one has been saved.
    async fn load(&self, key: &str) -> Result<Option<ChatSession>, CrmError>;

    /// Insert or replace the session under its `session_id`.
    async fn save(&self, session: &ChatSession) -> Result<(), CrmError>;

    /// Fetch the session for `key`, creating an unsaved empty one if needed.
    async fn load_or_create(&self, key: &str) -> Result<ChatSession, CrmError> {
        Ok(self
            .load(key)
            .await?
            .unwrap_or_else(|| ChatSession::new(key)))
    }
}

/// SQLite-backed session store.
pub struct SessionRepository {
    db: Arc<Database>,
}

impl SessionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Number of stored sessions.
    pub fn count(&self) -> Result<u64, CrmError> {
        self.db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM chat_sessions", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
            .map_err(|e| CrmError::Storage(e.to_string()))
        })
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn load(&self, key: &str) -> Result<Option<ChatSession>, CrmError> {
        let document: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT document FROM chat_sessions WHERE session_id = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CrmError::Storage(format!("Failed to load session: {}", e)))
        })?;

        match document {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, session: &ChatSession) -> Result<(), CrmError> {
        let document = serde_json::to_string(session)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_sessions (session_id, document, has_pending, last_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(session_id) DO UPDATE SET
                    document = excluded.document,
                    has_pending = excluded.has_pending,
                    last_active = excluded.last_active",
                rusqlite::params![
                    session.session_id,
                    document,
                    session.pending_email.is_some() as i32,
                    session.last_active.timestamp(),
                    session.created_at.timestamp(),
                ],
            )
            .map_err(|e| CrmError::Storage(format!("Failed to save session: {}", e)))?;
            Ok(())
        })?;
        tracing::debug!(
            session = %session.session_id,
            messages = session.history.len(),
            pending = session.pending_email.is_some(),
            "Session saved"
        );
        Ok(())
    }
}

/// In-memory session store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, ChatSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &str) -> Result<Option<ChatSession>, CrmError> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|e| CrmError::Storage(format!("session lock poisoned: {}", e)))?;
        Ok(sessions.get(key).cloned())
    }

    async fn save(&self, session: &ChatSession) -> Result<(), CrmError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| CrmError::Storage(format!("session lock poisoned: {}", e)))?;
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }
}
