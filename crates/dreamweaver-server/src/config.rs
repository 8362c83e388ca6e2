use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

use dreamweaver_completion::GroqConfig;
use dreamweaver_completion::client::{DEFAULT_API_BASE, DEFAULT_MODEL};

const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub completion: GroqConfig,
    pub language_cache_ttl: Duration,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let number = |key: &str, default: u64| -> anyhow::Result<u64> {
            var(key, &default.to_string())
                .parse()
                .with_context(|| format!("{key} must be a whole number"))
        };

        let jwt_secret = var("DREAMWEAVER_JWT_SECRET", "");
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("DREAMWEAVER_JWT_SECRET is unset or still a placeholder");
        }

        let api_key = var("DREAMWEAVER_COMPLETION_API_KEY", "");
        if api_key.is_empty() {
            bail!("DREAMWEAVER_COMPLETION_API_KEY is not set");
        }

        let host = var("DREAMWEAVER_HOST", "0.0.0.0");
        let port: u16 = var("DREAMWEAVER_PORT", "3000")
            .parse()
            .context("DREAMWEAVER_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {host}:{port}"))?;

        let mut completion = GroqConfig::new(api_key);
        completion.api_base = var("DREAMWEAVER_COMPLETION_API_BASE", DEFAULT_API_BASE);
        completion.model = var("DREAMWEAVER_COMPLETION_MODEL", DEFAULT_MODEL);
        completion.request_timeout_ms = number("DREAMWEAVER_COMPLETION_TIMEOUT_MS", 30_000)?;

        Ok(Self {
            addr,
            db_path: PathBuf::from(var("DREAMWEAVER_DB_PATH", "dreamweaver.db")),
            jwt_secret,
            token_ttl: Duration::from_secs(number("DREAMWEAVER_TOKEN_TTL_SECS", 3600)?),
            completion,
            language_cache_ttl: Duration::from_secs(number("DREAMWEAVER_LANGUAGE_CACHE_TTL_SECS", 3600)?),
        })
    }
}
