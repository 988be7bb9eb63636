use super::*;
use axum::http::{HeaderMap, HeaderValue};

fn headers_with_key(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(API_KEY_HEADER, value.parse().unwrap());
    headers
}

#[cfg(test)]
mod extract_api_key_tests {
    use super::*;

    #[test]
    fn valid_api_key() {
        let headers = headers_with_key("hook-secret-123");

        let result = extract_api_key(&headers);
        assert_eq!(result, Ok("hook-secret-123".to_string()));
    }

    #[test]
    fn header_name_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Api-Key", "hook-secret-123".parse().unwrap());

        assert_eq!(
            extract_api_key(&headers),
            Ok("hook-secret-123".to_string())
        );
    }

    #[test]
    fn api_key_is_not_trimmed() {
        let headers = headers_with_key(" hook-secret-123 ");

        assert_eq!(
            extract_api_key(&headers),
            Ok(" hook-secret-123 ".to_string())
        );
    }

    #[test]
    fn missing_header() {
        let headers = HeaderMap::new();
        assert_eq!(extract_api_key(&headers), Err(ApiKeyError::Missing));
    }

    #[test]
    fn empty_header() {
        let headers = headers_with_key("");
        assert_eq!(extract_api_key(&headers), Err(ApiKeyError::Empty));
    }

    #[test]
    fn whitespace_only_header() {
        let headers = headers_with_key("   ");
        assert_eq!(extract_api_key(&headers), Err(ApiKeyError::Empty));
    }

    #[test]
    fn non_ascii_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            API_KEY_HEADER,
            HeaderValue::from_bytes(b"key\xff").unwrap(),
        );
        assert_eq!(extract_api_key(&headers), Err(ApiKeyError::InvalidFormat));
    }
}

#[cfg(test)]
mod verify_api_key_tests {
    use super::*;

    #[test]
    fn matching_key() {
        let headers = headers_with_key("hook-key");
        assert_eq!(verify_api_key(&headers, "hook-key"), Ok(()));
    }

    #[test]
    fn wrong_key() {
        let headers = headers_with_key("guess");
        assert_eq!(
            verify_api_key(&headers, "hook-key"),
            Err(ApiKeyError::Mismatch)
        );
    }

    #[test]
    fn prefix_of_key_is_rejected() {
        let headers = headers_with_key("hook");
        assert_eq!(
            verify_api_key(&headers, "hook-key"),
            Err(ApiKeyError::Mismatch)
        );
    }

    #[test]
    fn padded_key_is_rejected() {
        let headers = headers_with_key(" hook-key ");
        assert_eq!(
            verify_api_key(&headers, "hook-key"),
            Err(ApiKeyError::Mismatch)
        );
    }

    #[test]
    fn missing_key_reports_missing() {
        assert_eq!(
            verify_api_key(&HeaderMap::new(), "hook-key"),
            Err(ApiKeyError::Missing)
        );
    }
}

#[cfg(test)]
mod api_key_error_display_tests {
    use super::*;

    #[test]
    fn missing_error_message() {
        assert_eq!(ApiKeyError::Missing.to_string(), "API key not provided");
    }

    #[test]
    fn mismatch_error_message() {
        assert_eq!(ApiKeyError::Mismatch.to_string(), "Invalid API key");
    }

    #[test]
    fn empty_error_message() {
        assert_eq!(ApiKeyError::Empty.to_string(), "API key is empty");
    }
}
