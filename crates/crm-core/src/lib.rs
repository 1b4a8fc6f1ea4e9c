//! Shared configuration, error, and domain types for the CRM assistant.

pub mod config;
pub mod error;
pub mod types;

pub use config::CrmConfig;
pub use error::{CrmError, Result};
pub use types::*;
