mod env;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Complete bridge configuration.
///
/// Built once at startup and handed to constructors; never re-read.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub webhook: WebhookConfig,
    pub slack: SlackConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Virtual-agent backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// OAuth token endpoint (client_credentials grant)
    pub token_url: String,
    /// API base URL, e.g. "https://api.example.com"
    pub api_base: String,
    pub client_id: String,
    pub client_secret: String,
    /// Virtual-agent flow that handles new conversations
    pub touchpoint_id: String,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_source")]
    pub source: String,
    /// Tokens are refreshed this many seconds before expiry
    #[serde(default = "default_refresh_buffer")]
    pub refresh_buffer_seconds: i64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_channel() -> String {
    "chat".to_string()
}

fn default_source() -> String {
    "slack".to_string()
}

fn default_refresh_buffer() -> i64 {
    crate::credentials::DEFAULT_REFRESH_BUFFER_SECONDS
}

fn default_request_timeout() -> u64 {
    30
}

/// Inbound webhook configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Shared secret expected in the X-Api-Key header
    pub api_key: String,
}

/// Slack configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    pub bot_token: String,
    /// When unset, request signatures are not checked
    #[serde(default)]
    pub signing_secret: Option<String>,
    /// The bridge's own bot user; its messages are never forwarded
    #[serde(default)]
    pub bot_user_id: Option<String>,
    #[serde(default = "default_slack_api_base")]
    pub api_base: String,
    /// Contact email used when the Slack profile has none
    #[serde(default = "default_contact_email")]
    pub default_contact_email: String,
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_contact_email() -> String {
    "unknown@example.com".to_string()
}

impl BridgeConfig {
    /// Reject values the rest of the bridge cannot work with
    pub fn validate(&self) -> Result<()> {
        let buffer = self.backend.refresh_buffer_seconds;
        let max = crate::credentials::MAX_REFRESH_BUFFER_SECONDS;
        if !(0..=max).contains(&buffer) {
            bail!(
                "refresh_buffer_seconds must be between 0 and {}, got {}",
                max,
                buffer
            );
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<BridgeConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: BridgeConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path))?;
    config.validate()?;
    Ok(config)
}
