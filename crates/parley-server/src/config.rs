use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

use parley_chat::ledger::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub message_limit: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = var("PARLEY_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("PARLEY_JWT_SECRET is unset or still a placeholder; set it in your .env file and restart");
        }

        let port: u16 = var("PARLEY_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PARLEY_PORT must be a port number")?;

        let token_ttl_days: i64 = match var("PARLEY_TOKEN_TTL_DAYS") {
            Some(v) => v.parse().context("PARLEY_TOKEN_TTL_DAYS must be a number of days")?,
            None => 30,
        };
        if token_ttl_days <= 0 {
            bail!("PARLEY_TOKEN_TTL_DAYS must be positive");
        }

        let message_limit: u32 = match var("PARLEY_MESSAGE_LIMIT") {
            Some(v) => v.parse().context("PARLEY_MESSAGE_LIMIT must be a number")?,
            None => DEFAULT_LIST_LIMIT,
        };
        if message_limit == 0 || message_limit > MAX_LIST_LIMIT {
            bail!("PARLEY_MESSAGE_LIMIT must be between 1 and {}", MAX_LIST_LIMIT);
        }

        Ok(Self {
            host: var("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("PARLEY_DB_PATH").unwrap_or_else(|| "parley.db".into()).into(),
            jwt_secret,
            token_ttl_days,
            message_limit,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
