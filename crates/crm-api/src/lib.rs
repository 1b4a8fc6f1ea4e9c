//! CRM API crate - axum HTTP server for the chat assistant.
//!
//! Exposes the chat endpoint (JSON or multipart with attachments), chat
//! history retrieval, and a health check.

pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
