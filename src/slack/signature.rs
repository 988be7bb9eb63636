use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Slack-Signature";

/// Requests signed longer ago than this are rejected as replays
pub const MAX_REQUEST_AGE_SECONDS: i64 = 300;

/// Signature verification failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Timestamp or signature header absent
    MissingHeaders,
    /// Timestamp is not a unix epoch integer
    InvalidTimestamp,
    /// Timestamp outside the accepted window
    Stale,
    /// Signature does not match the body
    Mismatch,
}

impl std::fmt::Display for SignatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureError::MissingHeaders => write!(f, "Slack signature headers missing"),
            SignatureError::InvalidTimestamp => write!(f, "Slack request timestamp is invalid"),
            SignatureError::Stale => write!(f, "Slack request timestamp is too old"),
            SignatureError::Mismatch => write!(f, "Slack signature mismatch"),
        }
    }
}

impl std::error::Error for SignatureError {}

/// Verify Slack's request signature.
///
/// `v0=hex(HMAC-SHA256(secret, "v0:{timestamp}:{body}"))`, compared in
/// constant time. `now` is the current unix time in seconds.
pub fn verify_signature(
    secret: &str,
    headers: &HeaderMap,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
    };
    let (timestamp, signature) = match (header(TIMESTAMP_HEADER), header(SIGNATURE_HEADER)) {
        (Some(timestamp), Some(signature)) => (timestamp, signature),
        _ => return Err(SignatureError::MissingHeaders),
    };

    let issued_at: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;
    if now.abs_diff(issued_at) > MAX_REQUEST_AGE_SECONDS.unsigned_abs() {
        return Err(SignatureError::Stale);
    }

    let expected = sign(secret, timestamp, body).ok_or(SignatureError::Mismatch)?;
    if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Compute the `v0=` signature for a request body
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Some(format!("v0={}", hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const NOW: i64 = 1_700_000_000;

    fn signed_headers(timestamp: &str, signature: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, timestamp.parse().unwrap());
        headers.insert(SIGNATURE_HEADER, signature.parse().unwrap());
        headers
    }

    #[test]
    fn test_valid_signature() {
        let body = br#"{"type":"event_callback"}"#;
        let ts = NOW.to_string();
        let headers = signed_headers(&ts, &sign(SECRET, &ts, body).unwrap());

        assert_eq!(verify_signature(SECRET, &headers, body, NOW), Ok(()));
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let ts = NOW.to_string();
        let headers = signed_headers(&ts, &sign(SECRET, &ts, b"original").unwrap());

        assert_eq!(
            verify_signature(SECRET, &headers, b"tampered", NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let body = b"{}";
        let ts = NOW.to_string();
        let headers = signed_headers(&ts, &sign("other-secret", &ts, body).unwrap());

        assert_eq!(
            verify_signature(SECRET, &headers, body, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_truncated_signature_is_rejected() {
        let ts = NOW.to_string();
        let headers = signed_headers(&ts, "v0=deadbeef");
        assert_eq!(
            verify_signature(SECRET, &headers, b"{}", NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let body = b"{}";
        let ts = (NOW - MAX_REQUEST_AGE_SECONDS - 1).to_string();
        let headers = signed_headers(&ts, &sign(SECRET, &ts, body).unwrap());

        assert_eq!(
            verify_signature(SECRET, &headers, body, NOW),
            Err(SignatureError::Stale)
        );
    }

    #[test]
    fn test_timestamp_at_window_edge_is_accepted() {
        let body = b"{}";
        let ts = (NOW - MAX_REQUEST_AGE_SECONDS).to_string();
        let headers = signed_headers(&ts, &sign(SECRET, &ts, body).unwrap());

        assert!(verify_signature(SECRET, &headers, body, NOW).is_ok());
    }

    #[test]
    fn test_extreme_timestamps_are_stale() {
        let body = b"{}";
        for issued_at in [i64::MIN, i64::MAX] {
            let ts = issued_at.to_string();
            let headers = signed_headers(&ts, &sign(SECRET, &ts, body).unwrap());
            assert_eq!(
                verify_signature(SECRET, &headers, body, NOW),
                Err(SignatureError::Stale)
            );
        }

        let headers = signed_headers(&i64::MIN.to_string(), "v0=deadbeef");
        assert_eq!(
            verify_signature("s", &headers, b"{}", NOW),
            Err(SignatureError::Stale)
        );
    }

    #[test]
    fn test_missing_headers() {
        assert_eq!(
            verify_signature(SECRET, &HeaderMap::new(), b"{}", NOW),
            Err(SignatureError::MissingHeaders)
        );

        let mut only_ts = HeaderMap::new();
        only_ts.insert(TIMESTAMP_HEADER, NOW.to_string().parse().unwrap());
        assert_eq!(
            verify_signature(SECRET, &only_ts, b"{}", NOW),
            Err(SignatureError::MissingHeaders)
        );
    }

    #[test]
    fn test_non_numeric_timestamp() {
        let headers = signed_headers("yesterday", "v0=00");
        assert_eq!(
            verify_signature(SECRET, &headers, b"{}", NOW),
            Err(SignatureError::InvalidTimestamp)
        );
    }

    #[test]
    fn test_sign_format() {
        let signature = sign(SECRET, "1", b"body").unwrap();
        assert!(signature.starts_with("v0="));
        assert_eq!(signature.len(), 3 + 64);
    }
}
