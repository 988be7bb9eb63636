use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

#[cfg(test)]
mod tests;

/// Header carrying the webhook shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// Extract the API key from the X-Api-Key header
///
/// Returns the raw header value if present and not blank. The value is not
/// trimmed; it must equal the configured secret byte for byte.
pub fn extract_api_key(headers: &HeaderMap) -> Result<String, ApiKeyError> {
    let value = headers
        .get(API_KEY_HEADER)
        .ok_or(ApiKeyError::Missing)?
        .to_str()
        .map_err(|_| ApiKeyError::InvalidFormat)?;

    if value.trim().is_empty() {
        return Err(ApiKeyError::Empty);
    }

    Ok(value.to_string())
}

/// Check the request's API key against the configured secret
///
/// Comparison is constant-time.
pub fn verify_api_key(headers: &HeaderMap, expected: &str) -> Result<(), ApiKeyError> {
    let provided = extract_api_key(headers)?;

    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(ApiKeyError::Mismatch)
    }
}

/// API key check errors
#[derive(Debug, PartialEq, Clone)]
pub enum ApiKeyError {
    /// Header not present
    Missing,
    /// Header value is not visible ASCII
    InvalidFormat,
    /// Header present but blank
    Empty,
    /// Key does not match
    Mismatch,
}

impl std::fmt::Display for ApiKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiKeyError::Missing => write!(f, "API key not provided"),
            ApiKeyError::InvalidFormat => write!(f, "Invalid API key format"),
            ApiKeyError::Empty => write!(f, "API key is empty"),
            ApiKeyError::Mismatch => write!(f, "Invalid API key"),
        }
    }
}

impl std::error::Error for ApiKeyError {}
