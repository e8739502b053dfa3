//! Service configuration — every tunable of the incident workflow as a TOML
//! value with a built-in default.
//!
//! Secrets never live here: the classifier API key and SMTP credentials come
//! from the environment (`GOOGLE_API_KEY`, `SENDER_EMAIL`, `SENDER_PASSWORD`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Root configuration for an incidentflow deployment.
///
/// Load with `ServiceConfig::load()` which searches:
/// 1. `$INCIDENTFLOW_CONFIG` env var
/// 2. `./incidentflow.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP server binding
    #[serde(default)]
    pub server: ServerConfig,

    /// Sled database location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Classification service boundary
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Ticketing service boundary
    #[serde(default)]
    pub ticketing: TicketingConfig,

    /// SMTP relay for the email channel
    #[serde(default)]
    pub email: EmailConfig,

    /// Reminder workflow timing
    #[serde(default)]
    pub reminder: ReminderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "incidents_db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,
    #[serde(default = "default_classifier_model")]
    pub model: String,
    /// Request timeout in seconds.
    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_classifier_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_classifier_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_classifier_timeout_secs() -> u64 {
    15
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_classifier_base_url(),
            model: default_classifier_model(),
            timeout_secs: default_classifier_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketingConfig {
    #[serde(default = "default_ticketing_endpoint")]
    pub endpoint: String,
    /// Bounded timeout for the remote create-ticket call, in seconds.
    #[serde(default = "default_ticketing_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_ticketing_endpoint() -> String {
    "https://reqres.in/api/tickets".to_string()
}

fn default_ticketing_timeout_secs() -> u64 {
    5
}

impl Default for TicketingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ticketing_endpoint(),
            timeout_secs: default_ticketing_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    465
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Delay before the follow-up check fires. 24 hours by default.
    #[serde(default = "default_reminder_delay_secs")]
    pub delay_secs: u64,
    /// Re-arm open, un-reminded incidents from the store on startup.
    #[serde(default = "default_recover_on_startup")]
    pub recover_on_startup: bool,
}

fn default_reminder_delay_secs() -> u64 {
    86_400
}

fn default_recover_on_startup() -> bool {
    true
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_reminder_delay_secs(),
            recover_on_startup: default_recover_on_startup(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ServiceConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var("INCIDENTFLOW_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from INCIDENTFLOW_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from INCIDENTFLOW_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "INCIDENTFLOW_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./incidentflow.toml
        let local = PathBuf::from("incidentflow.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./incidentflow.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./incidentflow.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No incidentflow.toml found — using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8000");
        assert_eq!(config.ticketing.timeout_secs, 5);
        assert_eq!(config.reminder.delay_secs, 86_400);
        assert!(config.reminder.recover_on_startup);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[reminder]\ndelay_secs = 120\n\n[server]\nlisten_addr = \"127.0.0.1:9000\""
        )
        .unwrap();

        let config = ServiceConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.reminder.delay_secs, 120);
        assert_eq!(config.server.listen_addr, "127.0.0.1:9000");
        // Untouched sections keep defaults.
        assert_eq!(config.email.smtp_port, 465);
        assert_eq!(config.classifier.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reminder\ndelay_secs = ").unwrap();
        assert!(matches!(
            ServiceConfig::load_from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
