use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{GmailError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Only unread messages newer than this many days are candidates
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    /// Hard cap on candidates per run; extra matches are dropped
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u16,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    /// Name the model signs replies with
    #[serde(default = "default_signature")]
    pub signature: String,
    #[serde(default = "default_disclaimer")]
    pub disclaimer: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            initial_backoff_secs: default_initial_backoff_secs(),
            signature: default_signature(),
            disclaimer: default_disclaimer(),
        }
    }
}

impl ClassifierConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_secs(self.initial_backoff_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Pause after every message, whatever its outcome
    #[serde(default = "default_inter_item_delay_secs")]
    pub inter_item_delay_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            inter_item_delay_secs: default_inter_item_delay_secs(),
        }
    }
}

impl OrchestratorConfig {
    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_secs(self.inter_item_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_circuit_breaker_enabled")]
    pub enabled: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: default_circuit_breaker_enabled(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub dry_run: bool,
}

fn default_window_days() -> u32 {
    20
}

fn default_max_results() -> u32 {
    100
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u16 {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_secs() -> u64 {
    10
}

fn default_signature() -> String {
    "Aarush".to_string()
}

fn default_disclaimer() -> String {
    "This mail is system generated, if you have any more specifications add them, we will revert back to you."
        .to_string()
}

fn default_inter_item_delay_secs() -> u64 {
    10
}

fn default_circuit_breaker_enabled() -> bool {
    true
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    GmailError::ConfigError(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GmailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scan.window_days == 0 {
            return Err(GmailError::ConfigError(
                "scan.window_days must be at least 1".to_string(),
            ));
        }
        if self.scan.window_days > 365 {
            return Err(GmailError::ConfigError(
                "scan.window_days cannot exceed 365 (1 year)".to_string(),
            ));
        }

        // Gmail caps a single messages.list page at 500
        if self.scan.max_results == 0 || self.scan.max_results > 500 {
            return Err(GmailError::ConfigError(
                "scan.max_results must be between 1 and 500".to_string(),
            ));
        }

        if self.classifier.model.trim().is_empty() {
            return Err(GmailError::ConfigError(
                "classifier.model cannot be empty".to_string(),
            ));
        }
        if self.classifier.max_tokens == 0 {
            return Err(GmailError::ConfigError(
                "classifier.max_tokens must be greater than 0".to_string(),
            ));
        }
        if self.classifier.max_retries > 10 {
            return Err(GmailError::ConfigError(
                "classifier.max_retries cannot exceed 10".to_string(),
            ));
        }

        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(GmailError::ConfigError(format!(
                "server.bind '{}' is not a valid socket address",
                self.server.bind
            )));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
