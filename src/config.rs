use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The address the HTTP listener binds to.
    pub bind_addr: SocketAddr,
    /// The URL of the PostgreSQL database. `None` selects the in-memory store.
    pub database_url: Option<String>,
    /// The URL of the Redis server holding refresh grants.
    pub redis_url: String,
    /// The HMAC key that signs access tokens.
    pub jwt_secret: Zeroizing<Vec<u8>>,
    /// The lifetime of an access token in seconds.
    pub access_token_ttl_secs: i64,
    /// The lifetime of a refresh token in days.
    pub refresh_token_ttl_days: i64,
    /// How long an attendance session accepts redemptions, in minutes.
    pub session_ttl_minutes: i64,
    /// How long after opening a redemption still counts as present, in minutes.
    pub grace_period_minutes: i64,
    /// How often the expiry sweep runs, in seconds.
    pub sweep_interval_secs: u64,
    /// Optional JSON fixture provisioning users and schedules at start-up.
    pub seed_file: Option<PathBuf>,
}

/// Reads an optional variable and parses it, falling back to `default`.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let mut jwt_secret_hex = env::var("JWT_SECRET")
            .context("JWT_SECRET must be set (generate with: openssl rand -hex 32)")?;

        let jwt_secret_bytes = hex::decode(&jwt_secret_hex)
            .context("JWT_SECRET must be valid hexadecimal")?;

        jwt_secret_hex.zeroize();

        if jwt_secret_bytes.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 bytes (64 hex characters)");
        }

        let config = Self {
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            database_url: env::var("DATABASE_URL").ok(),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            jwt_secret: Zeroizing::new(jwt_secret_bytes),
            access_token_ttl_secs: parse_var("ACCESS_TOKEN_TTL_SECS", 300)?,
            refresh_token_ttl_days: parse_var("REFRESH_TOKEN_TTL_DAYS", 7)?,
            session_ttl_minutes: parse_var("SESSION_TTL_MINUTES", 30)?,
            grace_period_minutes: parse_var("GRACE_PERIOD_MINUTES", 10)?,
            sweep_interval_secs: parse_var("SWEEP_INTERVAL_SECS", 60)?,
            seed_file: env::var("SEED_FILE").ok().map(PathBuf::from),
        };

        config.check()?;
        Ok(config)
    }

    /// A configuration backed by the in-memory stores with default policy.
    pub fn in_memory(jwt_secret: Vec<u8>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: None,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            jwt_secret: Zeroizing::new(jwt_secret),
            access_token_ttl_secs: 300,
            refresh_token_ttl_days: 7,
            session_ttl_minutes: 30,
            grace_period_minutes: 10,
            sweep_interval_secs: 60,
            seed_file: None,
        }
    }

    fn check(&self) -> Result<()> {
        if self.session_ttl_minutes <= 0 {
            anyhow::bail!("SESSION_TTL_MINUTES must be positive");
        }
        if self.grace_period_minutes < 0 {
            anyhow::bail!("GRACE_PERIOD_MINUTES must not be negative");
        }
        if self.access_token_ttl_secs <= 0 || self.refresh_token_ttl_days <= 0 {
            anyhow::bail!("Token lifetimes must be positive");
        }
        Ok(())
    }

    /// The session TTL as a `chrono::Duration`.
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_ttl_minutes)
    }

    /// The grace period as a `chrono::Duration`.
    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.grace_period_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_config_uses_default_policy() {
        let config = Config::in_memory(vec![7u8; 32]);
        assert!(config.database_url.is_none());
        assert_eq!(config.session_ttl(), chrono::Duration::minutes(30));
        assert_eq!(config.grace_period(), chrono::Duration::minutes(10));
        assert!(config.check().is_ok());
    }

    #[test]
    fn negative_grace_period_is_rejected() {
        let mut config = Config::in_memory(vec![7u8; 32]);
        config.grace_period_minutes = -1;
        assert!(config.check().is_err());
    }
}
