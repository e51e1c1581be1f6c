//! Proxy to the external bot-verification provider.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::CaptchaConfig;

/// Provider verdict for a single challenge token. Ephemeral, never stored.
#[derive(Debug, Deserialize)]
pub struct VerificationOutcome {
    pub success: bool,
    pub challenge_ts: Option<String>,
    pub hostname: Option<String>,
    #[serde(rename = "error-codes", default)]
    pub error_codes: Vec<String>,
}

/// Client for the provider's `siteverify` endpoint. The server-held secret
/// goes only upstream, never into a response to our caller.
#[derive(Clone)]
pub struct BotVerifier {
    client: Client,
    secret: String,
    verify_url: String,
}

impl BotVerifier {
    pub fn new(config: &CaptchaConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            secret: config.secret.clone(),
            verify_url: config.verify_url.clone(),
        })
    }

    /// Forward a client-supplied challenge token and return the provider's
    /// verdict. Transport failures, timeouts, and non-2xx statuses are
    /// errors; callers treat them the same as a negative verdict.
    pub async fn verify(&self, client_token: &str) -> anyhow::Result<VerificationOutcome> {
        let response = self
            .client
            .post(&self.verify_url)
            .form(&[
                ("secret", self.secret.as_str()),
                ("response", client_token),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("verification provider returned {}", response.status());
        }

        let outcome: VerificationOutcome = response.json().await?;
        debug!(success = outcome.success, "bot verification verdict");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn verifier_for(server: &MockServer) -> BotVerifier {
        BotVerifier::new(&CaptchaConfig {
            secret: "server-side-secret".into(),
            verify_url: format!("{}/siteverify", server.uri()),
            timeout_seconds: 2,
        })
        .expect("build verifier")
    }

    #[tokio::test]
    async fn positive_verdict_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/siteverify"))
            .and(body_string_contains("secret=server-side-secret"))
            .and(body_string_contains("response=client-token"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"success": true, "challenge_ts": "2024-01-01T00:00:00Z", "hostname": "localhost"}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let outcome = verifier_for(&server)
            .verify("client-token")
            .await
            .expect("verdict");
        assert!(outcome.success);
        assert_eq!(outcome.hostname.as_deref(), Some("localhost"));
        assert_eq!(
            outcome.challenge_ts.as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
        assert!(outcome.error_codes.is_empty());
    }

    #[tokio::test]
    async fn negative_verdict_carries_error_codes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/siteverify"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{"success": false, "error-codes": ["invalid-input-response"]}"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let outcome = verifier_for(&server)
            .verify("stale-token")
            .await
            .expect("verdict");
        assert!(!outcome.success);
        assert_eq!(outcome.error_codes, vec!["invalid-input-response"]);
    }

    #[tokio::test]
    async fn provider_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/siteverify"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = verifier_for(&server).verify("any").await.unwrap_err();
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn unreachable_provider_is_an_error() {
        let verifier = BotVerifier::new(&CaptchaConfig {
            secret: "s".into(),
            // Port 9 (discard) is not listening.
            verify_url: "http://127.0.0.1:9/siteverify".into(),
            timeout_seconds: 1,
        })
        .expect("build verifier");
        assert!(verifier.verify("any").await.is_err());
    }
}
