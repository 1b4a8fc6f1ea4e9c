//! CRM assistant binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration (file, env, CLI)
//! 2. Open the SQLite database and optionally seed leads
//! 3. Build the mail transport, language model client and chat router
//! 4. Serve the HTTP API until Ctrl-C

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use crm_api::{start_server, AppState};
use crm_chat::{ChatRouter, GeminiClient};
use crm_core::config::CrmConfig;
use crm_mail::{EmailDispatcher, LogTransport, MailTransport, SmtpMailTransport};
use crm_storage::{Database, LeadRepository, SessionRepository};

use cli::CliArgs;

/// Expand a leading `~` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(rest)
        }
        None => PathBuf::from(path),
    }
}

/// `name` under `base` unless it is already absolute.
fn under(base: &Path, name: &str) -> PathBuf {
    base.join(expand_home(name))
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_transport(config: &CrmConfig) -> Result<Arc<dyn MailTransport>, crm_mail::MailError> {
    if config.mail.enabled {
        let transport = SmtpMailTransport::from_config(&config.mail, config.sender_address())?;
        tracing::info!(host = %config.mail.smtp_host, port = config.mail.smtp_port, "SMTP transport configured");
        Ok(Arc::new(transport))
    } else {
        tracing::warn!("Mail is disabled, outgoing emails will only be logged");
        Ok(Arc::new(LogTransport))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config: file, then env, then CLI.
    let config_file = args.resolve_config_path();
    let loaded = CrmConfig::load(&config_file);
    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => CrmConfig::default(),
    };
    config.apply_env_overrides();
    config.server.port = args.resolve_port(config.server.port);
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    init_tracing(&config.general.log_level);
    tracing::info!("Starting CRM assistant v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Ok(_) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Err(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Using default configuration"
        ),
    }

    // Storage.
    let data_dir = expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = under(&data_dir, &config.storage.db_file);
    let upload_dir = under(&data_dir, &config.storage.upload_dir);
    let db = Arc::new(Database::new(&db_path)?);

    let leads = LeadRepository::new(Arc::clone(&db));
    if let Some(seed) = &args.seed {
        let count = leads.seed_from_file(seed)?;
        tracing::info!(path = %seed.display(), count, "Leads seeded");
    }
    tracing::info!(leads = leads.count()?, "Lead directory ready");
    let sessions = SessionRepository::new(Arc::clone(&db));

    // Collaborators.
    let transport = build_transport(&config)?;
    let dispatcher = Arc::new(EmailDispatcher::from_config(transport, &config.mail));
    tracing::info!(transport = dispatcher.transport_name(), "Mail dispatcher ready");
    let model = match GeminiClient::from_config(&config.llm) {
        Ok(model) => model,
        Err(e) => {
            tracing::error!(error = %e, "Language model is not available");
            return Err(e.into());
        }
    };
    tracing::info!(model = %config.llm.model, "Language model configured");

    let router = ChatRouter::new(
        Arc::new(sessions),
        Arc::new(leads),
        Arc::new(model),
        dispatcher,
        &config.llm,
        config.chat.clone(),
    );

    // API server.
    let state = AppState::new(config.clone(), router, upload_dir);
    start_server(&config, state, shutdown_signal()).await?;

    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_keeps_absolute_paths() {
        let base = Path::new("/data");
        assert_eq!(under(base, "crm.db"), PathBuf::from("/data/crm.db"));
        assert_eq!(under(base, "/tmp/uploads"), PathBuf::from("/tmp/uploads"));
    }

    #[test]
    fn test_expand_home_leaves_plain_paths() {
        assert_eq!(expand_home("data/crm"), PathBuf::from("data/crm"));
        assert!(!expand_home("~/crm").starts_with("~"));
    }
}
