use anyhow::{anyhow, Context, Result};
use std::env;
use tracing::warn;

/// Fallback signing secret for local development only. Startup refuses to use
/// it outside the development environment.
pub const DEV_TOKEN_SECRET: &str = "dev-only-catalog-token-secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(AppEnv::Development),
            "production" | "prod" | "staging" => Ok(AppEnv::Production),
            other => Err(anyhow!(
                "Unsupported APP_ENV '{other}'. Use development or production."
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub app_env: AppEnv,
    pub token_secret: String,
}

pub fn load_config() -> Result<ServiceConfig> {
    let app_env = env::var("APP_ENV")
        .ok()
        .map(|value| AppEnv::parse(&value))
        .transpose()
        .context("Failed to parse APP_ENV")?
        .unwrap_or(AppEnv::Development);

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let token_secret = resolve_token_secret(app_env, env::var("TOKEN_SECRET").ok())?;

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8080);

    Ok(ServiceConfig {
        database_url,
        host,
        port,
        app_env,
        token_secret,
    })
}

/// The token secret is a hard startup requirement outside development; a
/// known default secret in production would let anyone mint valid tokens.
pub fn resolve_token_secret(app_env: AppEnv, configured: Option<String>) -> Result<String> {
    match configured.and_then(normalize_optional) {
        Some(secret) => Ok(secret),
        None if app_env == AppEnv::Development => {
            warn!("TOKEN_SECRET not set; falling back to the development-only default");
            Ok(DEV_TOKEN_SECRET.to_string())
        }
        None => Err(anyhow!(
            "TOKEN_SECRET must be set when APP_ENV is not development"
        )),
    }
}

fn normalize_optional(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
