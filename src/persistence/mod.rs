//! Durable storage for indicator series.

pub mod memory;
pub mod redis_store;

pub use memory::MemoryIndicatorStore;
pub use redis_store::RedisIndicatorStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Period;
use crate::Result;

/// Identity of one stored indicator series
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndicatorKey {
    pub strategy: String,
    pub indicator: String,
    pub symbol: String,
    pub interval: u32,
    pub period: Period,
}

impl fmt::Display for IndicatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}{}",
            self.strategy,
            self.symbol,
            self.indicator,
            self.interval,
            self.period.as_str()
        )
    }
}

/// Replace-on-save store of serialized rows.
///
/// `load` of an unknown key is an empty vector.
#[async_trait]
pub trait IndicatorStore: Send + Sync {
    async fn save(&self, key: &IndicatorKey, rows: Vec<serde_json::Value>) -> Result<()>;

    async fn load(&self, key: &IndicatorKey) -> Result<Vec<serde_json::Value>>;
}
