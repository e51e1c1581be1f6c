use anyhow::Context;
use serde::Deserialize;

/// Deployment mode, set once at startup via `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    fn from_env() -> Self {
        match std::env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            _ => Environment::Development,
        }
    }

    /// Session cookies carry the `Secure` attribute only in production.
    pub fn secure_cookies(self) -> bool {
        self == Environment::Production
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptchaConfig {
    pub secret: String,
    pub verify_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub cors_origin: String,
    pub database_url: String,
    pub jwt: JwtConfig,
    pub captcha: CaptchaConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is required")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "authgate".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "authgate-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(120),
        };
        let captcha = CaptchaConfig {
            secret: std::env::var("CAPTCHA_SECRET").unwrap_or_default(),
            verify_url: std::env::var("CAPTCHA_VERIFY_URL")
                .unwrap_or_else(|_| "https://www.google.com/recaptcha/api/siteverify".into()),
            timeout_seconds: std::env::var("CAPTCHA_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5),
        };
        if captcha.secret.is_empty() {
            tracing::warn!("CAPTCHA_SECRET is not set; bot verification will fail closed");
        }
        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("APP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8080),
            environment: Environment::from_env(),
            cors_origin: std::env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            database_url,
            jwt,
            captcha,
        })
    }
}
