use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub refresh_cookie_secure: bool,
    pub refresh_cookie_domain: Option<String>,
    pub cors_allowed_origin: Option<String>,
    pub aws_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
    pub s3_bucket: String,
    pub public_app_url: String,
    pub proposal_link_expiry_days: i64,
    pub smtp: Option<SmtpConfig>,
    pub email_from: String,
    pub email_max_attempts: u32,
    pub email_retry_base_ms: u64,
    pub rate_limits: RateLimitSettings,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Requests allowed per client IP within one window.
#[derive(Clone, Debug)]
pub struct RateLimitSettings {
    pub window_seconds: u64,
    pub api: u32,
    pub public_leads: u32,
    pub public_proposals: u32,
    pub login: u32,
    /// Key clients by forwarding headers instead of the socket peer.
    pub trust_proxy: bool,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_seconds: 15 * 60,
            api: 100,
            public_leads: 5,
            public_proposals: 10,
            login: 5,
            trust_proxy: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = parse_var("SERVER_PORT", 5000).context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "wasteph".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "wasteph-admin".to_string());
        let jwt_expiry_minutes = parse_var("JWT_EXPIRY_MINUTES", 60)
            .context("JWT_EXPIRY_MINUTES must be an integer")?;
        let refresh_token_expiry_days = parse_var("REFRESH_TOKEN_EXPIRY_DAYS", 30)
            .context("REFRESH_TOKEN_EXPIRY_DAYS must be an integer")?;
        let refresh_cookie_secure = env::var("REFRESH_COOKIE_SECURE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let refresh_cookie_domain = env::var("REFRESH_COOKIE_DOMAIN").ok();
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let aws_endpoint_url = env::var("AWS_ENDPOINT_URL").ok();
        let aws_access_key_id = env::var("AWS_ACCESS_KEY_ID").ok();
        let aws_secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok();
        let aws_region = env::var("AWS_REGION").unwrap_or_else(|_| "ap-southeast-1".to_string());
        let s3_bucket = env::var("S3_BUCKET").context("S3_BUCKET must be set")?;
        let public_app_url = env::var("PUBLIC_APP_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .trim_end_matches('/')
            .to_string();
        let proposal_link_expiry_days = parse_var("PROPOSAL_LINK_EXPIRY_DAYS", 14)
            .context("PROPOSAL_LINK_EXPIRY_DAYS must be an integer")?;

        let smtp = match env::var("SMTP_HOST").ok().filter(|host| !host.trim().is_empty()) {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_var("SMTP_PORT", 587).context("SMTP_PORT must be a valid u16")?,
                username: env::var("SMTP_USERNAME").ok(),
                password: env::var("SMTP_PASSWORD").ok(),
            }),
            None => None,
        };
        let email_from =
            env::var("EMAIL_FROM").unwrap_or_else(|_| "WastePH <no-reply@wasteph.com>".to_string());
        let email_max_attempts = parse_var("EMAIL_MAX_ATTEMPTS", 3)
            .context("EMAIL_MAX_ATTEMPTS must be an integer")?;
        let email_retry_base_ms = parse_var("EMAIL_RETRY_BASE_MS", 500)
            .context("EMAIL_RETRY_BASE_MS must be an integer")?;

        let defaults = RateLimitSettings::default();
        let rate_limits = RateLimitSettings {
            window_seconds: parse_var("RATE_LIMIT_WINDOW_SECONDS", defaults.window_seconds)
                .context("RATE_LIMIT_WINDOW_SECONDS must be an integer")?,
            api: parse_var("RATE_LIMIT_API", defaults.api)
                .context("RATE_LIMIT_API must be an integer")?,
            public_leads: parse_var("RATE_LIMIT_PUBLIC_LEADS", defaults.public_leads)
                .context("RATE_LIMIT_PUBLIC_LEADS must be an integer")?,
            public_proposals: parse_var("RATE_LIMIT_PUBLIC_PROPOSALS", defaults.public_proposals)
                .context("RATE_LIMIT_PUBLIC_PROPOSALS must be an integer")?,
            login: parse_var("RATE_LIMIT_LOGIN", defaults.login)
                .context("RATE_LIMIT_LOGIN must be an integer")?,
            trust_proxy: env::var("TRUST_PROXY")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.trust_proxy),
        };

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            refresh_token_expiry_days,
            refresh_cookie_secure,
            refresh_cookie_domain,
            cors_allowed_origin,
            aws_endpoint_url,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
            s3_bucket,
            public_app_url,
            proposal_link_expiry_days,
            smtp,
            email_from,
            email_max_attempts,
            email_retry_base_ms,
            rate_limits,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => Ok(raw.trim().parse()?),
        Err(_) => Ok(default),
    }
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
