use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CrmError, Result};

/// Top-level configuration for the CRM assistant.
///
/// Loaded from `~/.crm-assistant/config.toml` by default. Secrets (API keys,
/// SMTP credentials) are normally supplied through the environment and merged
/// with [`CrmConfig::apply_env_overrides`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrmConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl CrmConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CrmConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CrmError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Merge overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Merge overrides from an arbitrary key lookup.
    ///
    /// Empty values are ignored. Unparseable numeric values are logged and
    /// ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CRM_ENV") {
            match v.to_lowercase().as_str() {
                "development" | "dev" => self.general.environment = Environment::Development,
                "production" | "prod" => self.general.environment = Environment::Production,
                other => warn!(value = %other, "Ignoring unknown CRM_ENV value"),
            }
        }
        if let Some(v) = get("CRM_PORT") {
            match v.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(value = %v, "Ignoring invalid CRM_PORT"),
            }
        }
        if let Some(v) = get("GOOGLE_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = get("GEMINI_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("SMTP_HOST") {
            self.mail.smtp_host = v;
            self.mail.enabled = true;
        }
        if let Some(v) = get("SMTP_PORT") {
            match v.parse::<u16>() {
                Ok(port) => self.mail.smtp_port = port,
                Err(_) => warn!(value = %v, "Ignoring invalid SMTP_PORT"),
            }
        }
        if let Some(v) = get("SMTP_USER") {
            self.mail.smtp_user = v;
        }
        if let Some(v) = get("SMTP_PASS") {
            self.mail.smtp_pass = v;
        }
        if let Some(v) = get("SMTP_FROM") {
            self.mail.from = v;
        }
        if let Some(v) = get("SMTP_SECURE") {
            self.mail.secure = v.eq_ignore_ascii_case("true");
        }
    }

    /// The sender address, defaulting to the SMTP user like the mail relay does.
    pub fn sender_address(&self) -> &str {
        if self.mail.from.is_empty() {
            &self.mail.smtp_user
        } else {
            &self.mail.from
        }
    }
}

/// Deployment environment. Controls how much error detail reaches clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database and uploads.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Deployment environment.
    pub environment: Environment,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.crm-assistant/data".to_string(),
            log_level: "info".to_string(),
            environment: Environment::Production,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    /// Maximum requests per second across the API routes.
    pub rate_limit_per_sec: u64,
    /// Request body limit, covering multipart uploads.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            rate_limit_per_sec: 100,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Hosted language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Upper bound on a single model call, in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.0-flash-001".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            temperature: 0.1,
            max_output_tokens: 1500,
            timeout_secs: 30,
        }
    }
}

/// Outbound mail configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// When false, emails are logged instead of sent.
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    #[serde(skip_serializing)]
    pub smtp_pass: String,
    pub from: String,
    /// Use implicit TLS instead of STARTTLS.
    pub secure: bool,
    /// Image attached inline to every outgoing email.
    pub signature_path: String,
    /// Upper bound on a single send, in seconds.
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_user: String::new(),
            smtp_pass: String::new(),
            from: String::new(),
            secure: false,
            signature_path: "email-signature.jpeg".to_string(),
            timeout_secs: 20,
        }
    }
}

/// Conversation routing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Number of recent messages passed to the classifier.
    pub context_window: usize,
    /// Maximum lead records returned by a chat query.
    pub query_result_cap: usize,
    /// Maximum accepted message length in characters.
    pub max_message_length: usize,
    /// Session key used when a request does not carry one.
    pub default_session_key: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            context_window: 6,
            query_result_cap: 100,
            max_message_length: 2000,
            default_session_key: "default".to_string(),
        }
    }
}

/// Storage locations, relative to `general.data_dir` unless absolute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_file: String,
    pub upload_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_file: "crm.db".to_string(),
            upload_dir: "uploads".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = CrmConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.environment, Environment::Production);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.chat.context_window, 6);
        assert_eq!(config.chat.query_result_cap, 100);
        assert!(!config.mail.enabled);
        assert_eq!(config.llm.model, "gemini-2.0-flash-001");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[general]
environment = "development"

[chat]
context_window = 4
"#;
        let file = create_temp_config(content);
        let config = CrmConfig::load(file.path()).unwrap();
        assert_eq!(config.general.environment, Environment::Development);
        assert_eq!(config.chat.context_window, 4);
        assert_eq!(config.chat.query_result_cap, 100);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_load_invalid_toml_is_config_error() {
        let file = create_temp_config("[general\nlog_level = ");
        let err = CrmConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, CrmError::Config(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = CrmConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.general.data_dir, "~/.crm-assistant/data");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CrmConfig::default();
        config.server.port = 4100;
        config.mail.smtp_pass = "secret".to_string();
        config.save(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("secret"));

        let reloaded = CrmConfig::load(&path).unwrap();
        assert_eq!(reloaded.server.port, 4100);
        assert!(reloaded.mail.smtp_pass.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CRM_ENV", "dev"),
            ("CRM_PORT", "8080"),
            ("GOOGLE_API_KEY", "key-123"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_PORT", "465"),
            ("SMTP_SECURE", "true"),
            ("SMTP_USER", "bot@example.com"),
        ]
        .into_iter()
        .collect();

        let mut config = CrmConfig::default();
        config.apply_overrides_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.general.environment, Environment::Development);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.llm.api_key, "key-123");
        assert!(config.mail.enabled);
        assert_eq!(config.mail.smtp_port, 465);
        assert!(config.mail.secure);
        assert_eq!(config.sender_address(), "bot@example.com");
    }

    #[test]
    fn test_env_overrides_ignore_invalid_and_empty() {
        let mut config = CrmConfig::default();
        config.apply_overrides_from(|k| match k {
            "CRM_PORT" => Some("not-a-port".to_string()),
            "GOOGLE_API_KEY" => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(config.server.port, 3000);
        assert!(config.llm.api_key.is_empty());
    }

    #[test]
    fn test_sender_address_prefers_from() {
        let mut config = CrmConfig::default();
        config.mail.smtp_user = "user@example.com".to_string();
        config.mail.from = "CRM <crm@example.com>".to_string();
        assert_eq!(config.sender_address(), "CRM <crm@example.com>");
    }
}
