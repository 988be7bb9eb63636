use anyhow::{Context, Result};
use parley::api::{create_router, AppState};
use parley::backend::BackendClient;
use parley::bridge::{ConversationBridge, InMemoryConversationStore};
use parley::config::{load_config, BridgeConfig};
use parley::credentials::CredentialManager;
use parley::slack::SlackClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=info".into()),
        )
        .init();

    info!("Parley starting...");

    // Config file wins over individual environment variables
    let config = match std::env::var("PARLEY_CONFIG") {
        Ok(path) => load_config(&path)?,
        Err(_) => BridgeConfig::from_env()?,
    };

    info!(
        bind = %config.server.bind,
        api_base = %config.backend.api_base,
        touchpoint_id = %config.backend.touchpoint_id,
        refresh_buffer_seconds = config.backend.refresh_buffer_seconds,
        "Configuration loaded"
    );
    if config.slack.signing_secret.is_none() {
        warn!("SLACK_SIGNING_SECRET not set, Slack request signatures will not be checked");
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.backend.request_timeout_seconds))
        .build()
        .context("Failed to build HTTP client")?;

    // Backend credentials and client
    let credentials = Arc::new(CredentialManager::from_config(http.clone(), &config.backend));
    let backend = Arc::new(BackendClient::from_config(
        http.clone(),
        &config.backend,
        Arc::clone(&credentials),
    ));

    // Warm the token cache; failure is not fatal, the first message retries
    match credentials.get_token(false).await {
        Ok(_) => info!("Backend token acquired"),
        Err(e) => warn!(error = %e, "Initial backend token request failed"),
    }

    let bridge = Arc::new(ConversationBridge::new(
        backend,
        Arc::new(InMemoryConversationStore::new()),
        config.backend.touchpoint_id.clone(),
        config.slack.bot_user_id.clone(),
    ));
    let slack = Arc::new(SlackClient::new(http, &config.slack));

    let state = Arc::new(AppState {
        bridge,
        credentials,
        slack,
        webhook_api_key: config.webhook.api_key.clone(),
        signing_secret: config.slack.signing_secret.clone(),
    });
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "HTTP API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Parley stopped");

    Ok(())
}
