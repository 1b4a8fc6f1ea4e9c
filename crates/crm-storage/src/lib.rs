//! CRM storage crate - SQLite persistence for chat sessions and leads.
//!
//! Provides a WAL-mode SQLite database with migrations, the session store
//! used by the conversation router, and the lead directory with a
//! Mongo-style filter evaluator.

pub mod db;
pub mod filter;
pub mod leads;
pub mod migrations;
pub mod sessions;

pub use db::Database;
pub use filter::{FilterError, LeadFilter};
pub use leads::{LeadDirectory, LeadRepository};
pub use sessions::{MemorySessionStore, SessionRepository, SessionStore};
