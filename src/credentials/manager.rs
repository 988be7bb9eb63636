//! Cached bearer token with single-flight refresh.

use super::exchange::{exchange_client_credentials, DEFAULT_EXPIRES_IN_SECONDS};
use super::{AuthError, Credential};
use crate::config::BackendConfig;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Tokens are refreshed this long before they actually expire
pub const DEFAULT_REFRESH_BUFFER_SECONDS: i64 = 300;

/// Largest accepted buffer, just under the default token lifetime
pub const MAX_REFRESH_BUFFER_SECONDS: i64 = DEFAULT_EXPIRES_IN_SECONDS - 1;

type RefreshFuture = Shared<BoxFuture<'static, Result<String, AuthError>>>;

/// Cached credential plus the refresh currently in flight, if any.
#[derive(Default)]
struct TokenSlot {
    credential: Option<Credential>,
    refresh: Option<RefreshFuture>,
}

/// Clears the in-flight slot when the refresh it guards settles, fails, or
/// unwinds.
struct InFlightRefresh {
    slot: Arc<Mutex<TokenSlot>>,
}

impl Drop for InFlightRefresh {
    fn drop(&mut self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh = None;
    }
}

/// Owns the backend bearer token.
///
/// - Serves the cached token until `expires_at - refresh_buffer`
/// - At most one token request is in flight; concurrent callers await it
/// - A failed refresh drops the cached token and clears the in-flight slot
///
/// The slot mutex is never held across an await.
pub struct CredentialManager {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_buffer: Duration,
    slot: Arc<Mutex<TokenSlot>>,
}

impl CredentialManager {
    pub fn new(
        http: reqwest::Client,
        token_url: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http,
            token_url,
            client_id,
            client_secret,
            refresh_buffer: Duration::seconds(DEFAULT_REFRESH_BUFFER_SECONDS),
            slot: Arc::new(Mutex::new(TokenSlot::default())),
        }
    }

    /// Build from the backend section of the startup configuration
    pub fn from_config(http: reqwest::Client, config: &BackendConfig) -> Self {
        Self::new(
            http,
            config.token_url.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
        )
        .with_refresh_buffer(Duration::seconds(
            config
                .refresh_buffer_seconds
                .clamp(0, MAX_REFRESH_BUFFER_SECONDS),
        ))
    }

    pub fn with_refresh_buffer(mut self, refresh_buffer: Duration) -> Self {
        self.refresh_buffer = refresh_buffer;
        self
    }

    /// Return a usable bearer token.
    ///
    /// With `force_refresh = false` a fresh cached token is returned without a
    /// network call. Otherwise the caller joins the in-flight refresh, or
    /// starts one if none is running.
    pub async fn get_token(&self, force_refresh: bool) -> Result<String, AuthError> {
        let refresh = {
            let mut slot = self.slot.lock().unwrap();

            if !force_refresh {
                if let Some(credential) = &slot.credential {
                    if credential.is_fresh(Utc::now(), self.refresh_buffer) {
                        return Ok(credential.token.clone());
                    }
                }
            }

            match &slot.refresh {
                Some(in_flight) => {
                    debug!(force_refresh, "Joining in-flight token refresh");
                    in_flight.clone()
                }
                None => {
                    let refresh = self.start_refresh(force_refresh);
                    slot.refresh = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }

    /// True if a token is cached and outside the refresh window
    pub fn has_token(&self) -> bool {
        let slot = self.slot.lock().unwrap();
        slot.credential
            .as_ref()
            .map(|c| c.is_fresh(Utc::now(), self.refresh_buffer))
            .unwrap_or(false)
    }

    /// Expiry of the cached token, if any
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.slot
            .lock()
            .unwrap()
            .credential
            .as_ref()
            .map(|c| c.expires_at)
    }

    /// Drop the cached token; the next `get_token` goes to the network
    pub fn invalidate(&self) {
        self.slot.lock().unwrap().credential = None;
    }

    /// Build the shared refresh future. It settles the slot itself so the
    /// outcome is recorded even if the caller that started it goes away;
    /// the in-flight entry is released when the future completes or is
    /// dropped.
    fn start_refresh(&self, forced: bool) -> RefreshFuture {
        let http = self.http.clone();
        let token_url = self.token_url.clone();
        let client_id = self.client_id.clone();
        let client_secret = self.client_secret.clone();
        let in_flight = InFlightRefresh {
            slot: Arc::clone(&self.slot),
        };

        async move {
            let result =
                exchange_client_credentials(&http, &token_url, &client_id, &client_secret).await;

            let mut slot = in_flight.slot.lock().unwrap();

            match result {
                Ok(credential) => {
                    info!(
                        forced,
                        expires_at = %credential.expires_at,
                        "Backend token refreshed"
                    );
                    let token = credential.token.clone();
                    slot.credential = Some(credential);
                    Ok(token)
                }
                Err(e) => {
                    warn!(forced, error = %e, "Backend token refresh failed");
                    slot.credential = None;
                    Err(e)
                }
            }
        }
        .boxed()
        .shared()
    }
}
