//! Application state shared across all route handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crm_chat::ChatRouter;
use crm_core::config::{CrmConfig, Environment};

/// Shared application state. Cloned into every handler task.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, fixed for the life of the server.
    pub config: Arc<CrmConfig>,
    pub router: Arc<ChatRouter>,
    /// Where multipart uploads are written before they are staged.
    pub upload_dir: PathBuf,
    /// Server start time for uptime reporting.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: CrmConfig, router: ChatRouter, upload_dir: PathBuf) -> Self {
        Self {
            config: Arc::new(config),
            router: Arc::new(router),
            upload_dir,
            start_time: Instant::now(),
        }
    }

    pub fn environment(&self) -> Environment {
        self.config.general.environment
    }
}
