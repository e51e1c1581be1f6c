use axum::{
    extract::{FromRef, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, LoginRequest, MessageResponse, PublicUser, RegisterRequest,
            VerifyBotRequest,
        },
        extractors::AuthUser,
        jwt::JwtKeys,
        password, repo,
        repo::User,
        session, AuthError,
    },
    config::AppConfig,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verify-bot", post(verify_bot))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn is_valid_password(password: &str) -> bool {
    password.len() >= 8
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

fn session_headers(config: &AppConfig, token: &str) -> Result<HeaderMap, AuthError> {
    let mut headers = HeaderMap::new();
    let cookie =
        session::session_cookie(config, token).map_err(|e| AuthError::Internal(e.into()))?;
    headers.insert(SET_COOKIE, cookie);
    Ok(headers)
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, HeaderMap, Json<AuthResponse>), AuthError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.username.trim().len() < 3 {
        warn!("username too short");
        return Err(AuthError::Validation(
            "Username must be at least 3 characters".into(),
        ));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }
    if !is_valid_password(&payload.password) {
        warn!("password does not meet policy");
        return Err(AuthError::Validation(
            "Password must include uppercase, lowercase, number, and be 8+ chars".into(),
        ));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AuthError::EmailTaken);
    }

    let hash = password::hash_password(payload.password).await?;

    // A racing registration can still win between the lookup and the
    // insert; the unique constraint settles it.
    let user = match User::create(&state.db, payload.username.trim(), &payload.email, &hash).await
    {
        Ok(user) => user,
        Err(e) if repo::is_unique_violation(&e) => {
            warn!(email = %payload.email, "email taken concurrently");
            return Err(AuthError::EmailTaken);
        }
        Err(e) => return Err(e.into()),
    };

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;
    let headers = session_headers(&state.config, &token)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            user: PublicUser {
                username: user.username,
                email: user.email,
            },
            token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<(HeaderMap, Json<AuthResponse>), AuthError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }

    // Unknown email and wrong password take the same exit.
    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(user) => user,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(AuthError::InvalidCredentials);
        }
    };

    let ok = password::verify_password(payload.password, user.password_hash.clone()).await?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;
    let headers = session_headers(&state.config, &token)?;

    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok((
        headers,
        Json(AuthResponse {
            user: PublicUser {
                username: user.username,
                email: user.email,
            },
            token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn verify_bot(
    State(state): State<AppState>,
    Json(payload): Json<VerifyBotRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    match state.captcha.verify(&payload.token).await {
        Ok(outcome) if outcome.success => {
            info!("bot verification passed");
            Ok(Json(MessageResponse {
                message: "verified".into(),
            }))
        }
        Ok(outcome) => {
            warn!(error_codes = ?outcome.error_codes, "bot verification rejected");
            Err(AuthError::VerificationFailed)
        }
        Err(e) => {
            error!(error = %e, "bot verification request failed");
            Err(AuthError::VerificationFailed)
        }
    }
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AuthError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(AuthError::TokenRejected)?;

    Ok(Json(PublicUser {
        username: user.username,
        email: user.email,
    }))
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn email_regex_accepts_and_rejects() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@sub.domain.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@x.com"));
    }

    #[test]
    fn password_policy_requires_all_classes() {
        assert!(is_valid_password("Passw0rd!"));
        assert!(!is_valid_password("Sh0rt"));
        assert!(!is_valid_password("alllowercase1"));
        assert!(!is_valid_password("ALLUPPERCASE1"));
        assert!(!is_valid_password("NoDigitsHere"));
    }
}
