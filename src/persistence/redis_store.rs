use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

use super::{IndicatorKey, IndicatorStore};
use crate::error::TradingError;
use crate::retry::{retry, RetryPolicy};
use crate::Result;

/// Redis persistence for indicator series.
///
/// Each series is one JSON array stored under `indicator:{key}`.
pub struct RedisIndicatorStore {
    conn: ConnectionManager,
    retry: RetryPolicy,
}

impl RedisIndicatorStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str, retry: RetryPolicy) -> Result<Self> {
        let client = Client::open(redis_url)?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| TradingError::transient("redis connect", "timeout after 5 seconds"))??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn, retry })
    }

    fn redis_key(key: &IndicatorKey) -> String {
        format!("indicator:{}", key)
    }
}

#[async_trait]
impl IndicatorStore for RedisIndicatorStore {
    async fn save(&self, key: &IndicatorKey, rows: Vec<serde_json::Value>) -> Result<()> {
        let redis_key = Self::redis_key(key);
        let payload = serde_json::to_string(&rows)?;

        retry(&self.retry, "redis save", || {
            let mut conn = self.conn.clone();
            let redis_key = redis_key.clone();
            let payload = payload.clone();
            async move {
                conn.set::<_, _, ()>(&redis_key, payload).await?;
                Ok(())
            }
        })
        .await?;

        tracing::debug!("Saved {} rows for {} to Redis", rows.len(), key);

        Ok(())
    }

    async fn load(&self, key: &IndicatorKey) -> Result<Vec<serde_json::Value>> {
        let redis_key = Self::redis_key(key);

        let payload: Option<String> = retry(&self.retry, "redis load", || {
            let mut conn = self.conn.clone();
            let redis_key = redis_key.clone();
            async move {
                let value: Option<String> = conn.get(&redis_key).await?;
                Ok(value)
            }
        })
        .await?;

        let rows: Vec<serde_json::Value> = match payload {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        };

        tracing::info!("Loaded {} stored rows for {} from Redis", rows.len(), key);

        Ok(rows)
    }
}
