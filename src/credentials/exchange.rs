//! Client-credentials token exchange.
//!
//! Trades the configured client id/secret for a bearer token.

use super::{AuthError, Credential};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Lifetime assumed when the token endpoint omits `expires_in`
pub(crate) const DEFAULT_EXPIRES_IN_SECONDS: i64 = 3600;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
}

/// Build the `Authorization: Basic base64(client_id:client_secret)` value
pub(crate) fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    let raw = format!("{}:{}", client_id, client_secret);
    format!("Basic {}", STANDARD.encode(raw))
}

/// Exchange client credentials for an access token
///
/// # Arguments
/// * `http` - Shared HTTP client
/// * `token_url` - OAuth token endpoint URL
/// * `client_id` - OAuth client ID
/// * `client_secret` - OAuth client secret
///
/// # Returns
/// * `Ok(Credential)` - Access token and absolute expiry
/// * `Err(AuthError)` - Endpoint unreachable, rejected, or unparseable
pub(crate) async fn exchange_client_credentials(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<Credential, AuthError> {
    tracing::debug!(token_url = %token_url, "Requesting client-credentials token");

    let response = http
        .post(token_url)
        .header("Accept", "application/json")
        .header("Authorization", basic_auth_header(client_id, client_secret))
        .form(&[("grant_type", "client_credentials")])
        .send()
        .await
        .map_err(|e| AuthError::Transport(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            body,
        });
    }

    let token_response: TokenResponse = response
        .json()
        .await
        .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

    let expires_in = token_response
        .expires_in
        .unwrap_or(DEFAULT_EXPIRES_IN_SECONDS);

    tracing::debug!(
        expires_in = expires_in,
        token_type = ?token_response.token_type,
        "Token exchange successful"
    );

    Ok(Credential {
        token: token_response.access_token,
        expires_at: expiry_from(Utc::now(), expires_in)?,
    })
}

/// Absolute expiry for a token issued at `now`. Negative lifetimes count as
/// already expired; lifetimes past chrono's range are rejected.
pub(crate) fn expiry_from(
    now: DateTime<Utc>,
    expires_in: i64,
) -> Result<DateTime<Utc>, AuthError> {
    Duration::try_seconds(expires_in.max(0))
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| {
            AuthError::InvalidResponse(format!("expires_in out of range: {}", expires_in))
        })
}
