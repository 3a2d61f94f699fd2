use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{IndicatorKey, IndicatorStore};
use crate::error::TradingError;
use crate::Result;

/// In-process indicator store used by backtests and tests
#[derive(Clone, Default)]
pub struct MemoryIndicatorStore {
    rows: Arc<RwLock<HashMap<IndicatorKey, Vec<serde_json::Value>>>>,
}

impl MemoryIndicatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored series
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IndicatorStore for MemoryIndicatorStore {
    async fn save(&self, key: &IndicatorKey, rows: Vec<serde_json::Value>) -> Result<()> {
        let mut stored = self
            .rows
            .write()
            .map_err(|e| TradingError::Store(e.to_string()))?;
        stored.insert(key.clone(), rows);
        Ok(())
    }

    async fn load(&self, key: &IndicatorKey) -> Result<Vec<serde_json::Value>> {
        let stored = self
            .rows
            .read()
            .map_err(|e| TradingError::Store(e.to_string()))?;
        Ok(stored.get(key).cloned().unwrap_or_default())
    }
}
