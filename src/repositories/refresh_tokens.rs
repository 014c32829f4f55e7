use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, aio::ConnectionManager};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::{
    error::{AppError, Result},
    models::token::RefreshGrant,
    repositories::RefreshTokenStore,
};

/// Refresh grants kept in Redis under `refresh:<fingerprint>` with a TTL
/// matching the grant's expiry.
#[derive(Clone)]
pub struct RedisRefreshTokens {
    redis: ConnectionManager,
}

impl RedisRefreshTokens {
    /// Creates a new `RedisRefreshTokens` over an existing connection manager.
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    fn key(fingerprint: &str) -> String {
        format!("refresh:{}", fingerprint)
    }
}

#[async_trait]
impl RefreshTokenStore for RedisRefreshTokens {
    async fn save(&self, fingerprint: &str, grant: &RefreshGrant, now: DateTime<Utc>) -> Result<()> {
        let grant_json = sonic_rs::to_string(grant)
            .map_err(|e| AppError::Internal(format!("Grant serialization failed: {}", e)))?;

        let ttl_seconds = (grant.expires_at - now).num_seconds().max(1) as u64;
        let mut redis = self.redis.clone();
        let _: () = redis
            .set_ex(Self::key(fingerprint), &grant_json, ttl_seconds)
            .await
            .map_err(|e| {
                tracing::error!("❌ Redis set_ex failed: {}", e);
                AppError::Redis(e)
            })?;

        tracing::debug!("✅ Refresh grant saved to Redis for user {}", grant.user_id);
        Ok(())
    }

    async fn find(&self, fingerprint: &str) -> Result<Option<RefreshGrant>> {
        let mut redis = self.redis.clone();
        let grant_json: Option<String> = redis.get(Self::key(fingerprint)).await?;

        grant_json
            .map(|json| {
                sonic_rs::from_str::<RefreshGrant>(&json)
                    .map_err(|e| AppError::Internal(format!("Invalid grant JSON: {}", e)))
            })
            .transpose()
    }

    async fn revoke(&self, fingerprint: &str) -> Result<()> {
        let mut redis = self.redis.clone();
        let _: () = redis.del(Self::key(fingerprint)).await?;
        Ok(())
    }
}

/// Refresh grants held in process memory.
#[derive(Default)]
pub struct MemoryRefreshTokens {
    grants: Mutex<HashMap<String, RefreshGrant>>,
}

impl MemoryRefreshTokens {
    /// Creates a new, empty `MemoryRefreshTokens`.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokens {
    async fn save(&self, fingerprint: &str, grant: &RefreshGrant, now: DateTime<Utc>) -> Result<()> {
        let mut grants = self.grants.lock().await;
        grants.retain(|_, existing| existing.expires_at >= now);
        grants.insert(fingerprint.to_string(), grant.clone());
        Ok(())
    }

    async fn find(&self, fingerprint: &str) -> Result<Option<RefreshGrant>> {
        Ok(self.grants.lock().await.get(fingerprint).cloned())
    }

    async fn revoke(&self, fingerprint: &str) -> Result<()> {
        self.grants.lock().await.remove(fingerprint);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn grant(issued_at: DateTime<Utc>, days: i64) -> RefreshGrant {
        RefreshGrant {
            user_id: Uuid::new_v4(),
            issued_at,
            expires_at: issued_at + Duration::days(days),
        }
    }

    #[tokio::test]
    async fn save_prunes_expired_grants() {
        let t0 = Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).unwrap();
        let store = MemoryRefreshTokens::new();

        store.save("old", &grant(t0, 7), t0).await.unwrap();
        store.save("current", &grant(t0, 30), t0).await.unwrap();

        let later = t0 + Duration::days(8);
        store.save("new", &grant(later, 7), later).await.unwrap();

        assert!(store.find("old").await.unwrap().is_none());
        assert!(store.find("current").await.unwrap().is_some());
        assert!(store.find("new").await.unwrap().is_some());
        assert_eq!(store.grants.lock().await.len(), 2);
    }
}
