//! Session delivery: the issued token travels as a protected cookie.

use axum::http::{header::InvalidHeaderValue, HeaderMap, HeaderValue};

use crate::config::AppConfig;

pub const SESSION_COOKIE_NAME: &str = "token";

/// Build the `Set-Cookie` value for a freshly issued token.
///
/// The `Secure` attribute comes from the process-wide deployment mode, never
/// from the calling route.
pub fn session_cookie(config: &AppConfig, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let max_age = config.jwt.ttl_minutes * 60;
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age}"
    );
    if config.environment.secure_cookies() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Pull the session token back out of a request's `Cookie` header.
pub fn token_from_cookies(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::state::test_config;

    #[test]
    fn cookie_carries_the_protective_attributes() {
        let config = test_config();
        let cookie = session_cookie(&config, "abc.def.ghi").expect("cookie");
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("token=abc.def.ghi;"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Strict"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=7200"));
    }

    #[test]
    fn secure_attribute_follows_deployment_mode() {
        let mut config = test_config();
        let dev = session_cookie(&config, "t").expect("cookie");
        assert!(!dev.to_str().unwrap().contains("Secure"));

        config.environment = Environment::Production;
        let prod = session_cookie(&config, "t").expect("cookie");
        assert!(prod.to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn token_is_recovered_from_the_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark; token=abc.def.ghi; lang=en"),
        );
        assert_eq!(token_from_cookies(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn missing_cookie_yields_none() {
        let headers = HeaderMap::new();
        assert_eq!(token_from_cookies(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("theme=dark"),
        );
        assert_eq!(token_from_cookies(&headers), None);
    }
}
