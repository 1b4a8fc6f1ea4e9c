//! CLI argument definitions for the CRM assistant.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// CRM assistant - a chat interface for querying leads and emailing them.
#[derive(Parser, Debug)]
#[command(name = "crm-assistant", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Data directory for the SQLite database and uploads.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Replace all leads with the JSON array in this file before serving.
    #[arg(long = "seed", value_name = "LEADS_JSON")]
    pub seed: Option<PathBuf>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > CRM_CONFIG env var > ~/.crm-assistant/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("CRM_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port. The config value already carries CRM_PORT.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        self.port.unwrap_or(config_port)
    }

    /// The data directory override, if any.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// The log level override, if any.
    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }
}

fn default_config_path() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) => PathBuf::from(home).join(".crm-assistant").join("config.toml"),
        Err(_) => PathBuf::from("config.toml"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_flags() {
        let args = CliArgs::parse_from([
            "crm-assistant",
            "--config",
            "/etc/crm.toml",
            "-p",
            "8080",
            "--data-dir",
            "/var/lib/crm",
            "--log-level",
            "debug",
            "--seed",
            "leads.json",
        ]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/etc/crm.toml"));
        assert_eq!(args.resolve_port(3000), 8080);
        assert_eq!(args.resolve_data_dir().as_deref(), Some("/var/lib/crm"));
        assert_eq!(args.resolve_log_level().as_deref(), Some("debug"));
        assert_eq!(args.seed, Some(PathBuf::from("leads.json")));
    }

    #[test]
    fn test_defaults_fall_through_to_config() {
        let args = CliArgs::parse_from(["crm-assistant"]);
        assert_eq!(args.resolve_port(3000), 3000);
        assert!(args.resolve_data_dir().is_none());
        assert!(args.resolve_log_level().is_none());
        assert!(args.seed.is_none());
    }
}
