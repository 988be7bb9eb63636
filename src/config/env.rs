use super::{
    default_bind, default_channel, default_contact_email, default_refresh_buffer,
    default_request_timeout, default_slack_api_base, default_source, BackendConfig, BridgeConfig,
    ServerConfig, SlackConfig, WebhookConfig,
};
use anyhow::{anyhow, Context, Result};

impl BridgeConfig {
    /// Build from env vars, falling back to defaults for optional values.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("{} is required", key))
        };

        let mut backend = BackendConfig {
            token_url: required("PARLEY_TOKEN_URL")?,
            api_base: required("PARLEY_API_BASE")?,
            client_id: required("PARLEY_CLIENT_ID")?,
            client_secret: required("PARLEY_CLIENT_SECRET")?,
            touchpoint_id: required("PARLEY_TOUCHPOINT_ID")?,
            channel: lookup("PARLEY_CHANNEL").unwrap_or_else(default_channel),
            source: lookup("PARLEY_SOURCE").unwrap_or_else(default_source),
            refresh_buffer_seconds: default_refresh_buffer(),
            request_timeout_seconds: default_request_timeout(),
        };
        if let Some(v) = lookup("PARLEY_REFRESH_BUFFER_SECONDS") {
            backend.refresh_buffer_seconds = v
                .parse()
                .context("PARLEY_REFRESH_BUFFER_SECONDS must be an integer")?;
        }
        if let Some(v) = lookup("PARLEY_REQUEST_TIMEOUT_SECONDS") {
            backend.request_timeout_seconds = v
                .parse()
                .context("PARLEY_REQUEST_TIMEOUT_SECONDS must be an integer")?;
        }

        let config = Self {
            server: ServerConfig {
                bind: lookup("PARLEY_BIND").unwrap_or_else(default_bind),
            },
            backend,
            webhook: WebhookConfig {
                api_key: required("PARLEY_WEBHOOK_API_KEY")?,
            },
            slack: SlackConfig {
                bot_token: required("SLACK_BOT_TOKEN")?,
                signing_secret: lookup("SLACK_SIGNING_SECRET").filter(|v| !v.is_empty()),
                bot_user_id: lookup("SLACK_BOT_USER_ID").filter(|v| !v.is_empty()),
                api_base: lookup("SLACK_API_BASE").unwrap_or_else(default_slack_api_base),
                default_contact_email: lookup("PARLEY_DEFAULT_CONTACT_EMAIL")
                    .unwrap_or_else(default_contact_email),
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("PARLEY_TOKEN_URL", "https://auth.example.com/token"),
            ("PARLEY_API_BASE", "https://api.example.com"),
            ("PARLEY_CLIENT_ID", "id"),
            ("PARLEY_CLIENT_SECRET", "secret"),
            ("PARLEY_TOUCHPOINT_ID", "tp"),
            ("PARLEY_WEBHOOK_API_KEY", "hook"),
            ("SLACK_BOT_TOKEN", "xoxb"),
        ])
    }

    fn build(vars: &HashMap<&'static str, &'static str>) -> Result<BridgeConfig> {
        BridgeConfig::from_vars(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = build(&base_vars()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert_eq!(config.backend.refresh_buffer_seconds, 300);
        assert_eq!(config.backend.source, "slack");
        assert!(config.slack.signing_secret.is_none());
    }

    #[test]
    fn test_from_vars_overrides() {
        let mut vars = base_vars();
        vars.insert("PARLEY_BIND", "127.0.0.1:4000");
        vars.insert("PARLEY_REFRESH_BUFFER_SECONDS", "120");
        vars.insert("SLACK_SIGNING_SECRET", "sign");
        vars.insert("SLACK_BOT_USER_ID", "UBOT");

        let config = build(&vars).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:4000");
        assert_eq!(config.backend.refresh_buffer_seconds, 120);
        assert_eq!(config.slack.signing_secret.as_deref(), Some("sign"));
        assert_eq!(config.slack.bot_user_id.as_deref(), Some("UBOT"));
    }

    #[test]
    fn test_missing_required_var_names_it() {
        let mut vars = base_vars();
        vars.remove("PARLEY_CLIENT_SECRET");

        let err = build(&vars).unwrap_err();
        assert!(err.to_string().contains("PARLEY_CLIENT_SECRET"));
    }

    #[test]
    fn test_negative_refresh_buffer_rejected() {
        let mut vars = base_vars();
        vars.insert("PARLEY_REFRESH_BUFFER_SECONDS", "-300");

        let err = build(&vars).unwrap_err();
        assert!(err.to_string().contains("refresh_buffer_seconds"));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let mut vars = base_vars();
        vars.insert("PARLEY_REQUEST_TIMEOUT_SECONDS", "soon");
        assert!(build(&vars).is_err());
    }
}
