//! Bearer-token lifecycle for the backend API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialManager                  │
//! │  - cached Credential + refresh buffer    │
//! │  - single in-flight refresh (shared)     │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (refresh)            (token)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       Token exchange                     │
//! │  - client_credentials grant              │
//! │  - Basic auth header                     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use parley::credentials::CredentialManager;
//!
//! # async fn run() -> Result<(), parley::credentials::AuthError> {
//! let manager = CredentialManager::new(
//!     reqwest::Client::new(),
//!     "https://auth.example.com/oauth/token".to_string(),
//!     "client-id".to_string(),
//!     "client-secret".to_string(),
//! );
//!
//! // Cached until five minutes before expiry
//! let token = manager.get_token(false).await?;
//!
//! // After a 401 from the backend
//! let token = manager.get_token(true).await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Duration, Utc};

mod exchange;
mod manager;


pub use manager::{
    CredentialManager, DEFAULT_REFRESH_BUFFER_SECONDS, MAX_REFRESH_BUFFER_SECONDS,
};

/// Bearer token issued by the backend's token endpoint.
///
/// Replaced wholesale on every refresh, never mutated in place.
#[derive(Clone, Debug)]
pub struct Credential {
    /// Access token sent as `Authorization: Bearer <token>`
    pub token: String,

    /// When the token expires (UTC)
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// True while `now < expires_at - buffer`
    pub fn is_fresh(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.expires_at
            .checked_sub_signed(buffer)
            .map(|refresh_at| now < refresh_at)
            .unwrap_or(false)
    }
}

/// Token acquisition errors.
///
/// Cloneable so a single refresh failure can be handed to every caller
/// awaiting the same refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    /// Token endpoint unreachable
    Transport(String),
    /// Token endpoint rejected the client credentials
    Rejected { status: u16, body: String },
    /// Token endpoint answered with a body we could not parse
    InvalidResponse(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Transport(msg) => write!(f, "Token endpoint unreachable: {}", msg),
            AuthError::Rejected { status, body } => {
                write!(f, "Token request rejected with status {}: {}", status, body)
            }
            AuthError::InvalidResponse(msg) => write!(f, "Invalid token response: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}
