use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::auth::dto::MessageResponse;

/// Request-level failures for the auth flows.
///
/// The `Display` string of each variant is exactly the message sent to the
/// client; internal causes stay in the server log.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("Email already in use")]
    EmailTaken,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Missing authentication token")]
    MissingToken,
    #[error("Invalid or expired token")]
    TokenRejected,
    #[error("verification failed")]
    VerificationFailed,
    #[error("Server error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) | AuthError::EmailTaken | AuthError::VerificationFailed => {
                StatusCode::BAD_REQUEST
            }
            AuthError::InvalidCredentials | AuthError::MissingToken | AuthError::TokenRejected => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Internal(err) = &self {
            error!(error = %err, "internal error");
        }
        let body = Json(MessageResponse {
            message: self.to_string(),
        });
        (self.status(), body).into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        AuthError::Internal(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn response_parts(err: AuthError) -> (StatusCode, Vec<u8>) {
        let response = err.into_response();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    // Unknown email and wrong password must be indistinguishable on the wire.
    #[tokio::test]
    async fn invalid_credentials_responses_are_identical() {
        let (unknown_email, body_a) = response_parts(AuthError::InvalidCredentials).await;
        let (wrong_password, body_b) = response_parts(AuthError::InvalidCredentials).await;
        assert_eq!(unknown_email, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_email, wrong_password);
        assert_eq!(body_a, body_b);
    }

    #[tokio::test]
    async fn internal_error_body_hides_the_cause() {
        let err = AuthError::Internal(anyhow::anyhow!("pool timed out at 10.0.0.7:5432"));
        let (status, body) = response_parts(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body = String::from_utf8(body).unwrap();
        assert!(body.contains("Server error"));
        assert!(!body.contains("10.0.0.7"));
    }

    #[tokio::test]
    async fn email_taken_maps_to_400_with_message() {
        let (status, body) = response_parts(AuthError::EmailTaken).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let parsed: MessageResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.message, "Email already in use");
    }
}
