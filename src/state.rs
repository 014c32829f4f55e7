use redis::aio::ConnectionManager;
use std::sync::Arc;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::Result;
use crate::repositories::{
    AttendanceStore, RefreshTokenStore,
    memory::MemoryStore,
    postgres::PgStore,
    refresh_tokens::{MemoryRefreshTokens, RedisRefreshTokens},
};
use crate::services::scan::ScanPolicy;

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// Users, schedules, sessions and records.
    pub store: Arc<dyn AttendanceStore>,
    /// Issued refresh grants.
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    /// The application's configuration.
    pub config: Config,
    /// The server clock.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// With a `DATABASE_URL` the state is backed by PostgreSQL and Redis;
    /// without one it runs entirely in memory.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let Some(database_url) = config.database_url.as_deref() else {
            tracing::warn!("⚠️ DATABASE_URL not set, using in-memory stores");
            return Ok(Self::in_memory(config.clone(), Arc::new(SystemClock)));
        };

        let db = crate::db::create_pool(database_url)?;
        crate::db::migrate(&db).await?;
        tracing::info!("✅ PostgreSQL Pool initialized with deadpool-postgres");

        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("✅ Redis Connection Manager initialized");

        Ok(AppState {
            store: Arc::new(PgStore::new(db)),
            refresh_tokens: Arc::new(RedisRefreshTokens::new(redis)),
            config: config.clone(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Creates an `AppState` over fresh in-memory stores.
    pub fn in_memory(config: Config, clock: Arc<dyn Clock>) -> Self {
        AppState {
            store: Arc::new(MemoryStore::new()),
            refresh_tokens: Arc::new(MemoryRefreshTokens::new()),
            config,
            clock,
        }
    }

    /// The redemption policy derived from the configuration.
    pub fn scan_policy(&self) -> ScanPolicy {
        ScanPolicy {
            grace_period: self.config.grace_period(),
        }
    }
}
