//! Configuration management for the loyalty service
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Where session records live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackend {
    Memory,
    Redis,
}

impl FromStr for SessionBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(SessionBackend::Memory),
            "redis" => Ok(SessionBackend::Redis),
            other => anyhow::bail!("Unknown SESSION_BACKEND '{}', expected memory or redis", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub host: String,

    /// HTTP server port
    pub port: u16,

    /// sqlx SQLite connection string
    pub database_url: String,

    pub session_backend: SessionBackend,

    /// Only used by the Redis session backend
    pub redis_url: String,

    /// Idle lifetime of a login
    pub session_ttl_secs: i64,

    pub admin_username: String,

    /// Admin logins are refused while this is unset
    pub admin_password: Option<String>,

    /// Directory served under `/static`
    pub static_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let config = Config {
            host: env::var("LOYALTY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: env::var("LOYALTY_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .context("Invalid LOYALTY_PORT")?,

            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://loyalty.db?mode=rwc".to_string()),

            session_backend: env::var("SESSION_BACKEND")
                .unwrap_or_else(|_| "memory".to_string())
                .parse()?,

            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),

            session_ttl_secs: env::var("SESSION_TTL_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()
                .context("Invalid SESSION_TTL_SECS")?,

            admin_username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),

            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|p| !p.is_empty()),

            static_dir: env::var("STATIC_DIR")
                .unwrap_or_else(|_| "./static".to_string())
                .into(),
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("LOYALTY_PORT must be greater than 0");
        }

        if self.session_ttl_secs <= 0 {
            anyhow::bail!("SESSION_TTL_SECS must be greater than 0");
        }

        if self.admin_username.trim().is_empty() {
            anyhow::bail!("ADMIN_USERNAME must not be empty");
        }

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs)
    }
}
