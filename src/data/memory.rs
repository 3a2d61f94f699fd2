use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use super::MarketData;
use crate::error::TradingError;
use crate::models::{Candle, Tick};
use crate::Result;

#[derive(Default)]
struct Inner {
    candles: HashMap<String, BTreeMap<NaiveDateTime, Candle>>,
    ticks: HashMap<String, Vec<Tick>>,
}

/// Thread-safe in-memory market data store.
///
/// Backs backtests and tests. Candles are keyed by start time, so inserting a
/// candle for an existing minute replaces it.
#[derive(Clone, Default)]
pub struct MemoryMarketData {
    data: Arc<RwLock<Inner>>,
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> TradingError {
    TradingError::Store(format!("market data lock poisoned: {}", e))
}

impl MemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_candles(&self, candles: impl IntoIterator<Item = Candle>) -> Result<()> {
        let mut data = self.data.write().map_err(poisoned)?;

        for candle in candles {
            data.candles
                .entry(candle.symbol.clone())
                .or_default()
                .insert(candle.timestamp, candle);
        }

        Ok(())
    }

    pub fn record_ticks(&self, ticks: impl IntoIterator<Item = Tick>) -> Result<()> {
        let mut data = self.data.write().map_err(poisoned)?;

        for tick in ticks {
            let series = data.ticks.entry(tick.symbol.clone()).or_default();
            let at = series.partition_point(|t| t.timestamp <= tick.timestamp);
            series.insert(at, tick);
        }

        Ok(())
    }

    pub fn candle_count(&self, symbol: &str) -> Result<usize> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.candles.get(symbol).map(|c| c.len()).unwrap_or(0))
    }

    pub fn symbols(&self) -> Result<Vec<String>> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.candles.keys().cloned().collect())
    }
}

#[async_trait]
impl MarketData for MemoryMarketData {
    async fn candles(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Candle>> {
        if start >= end {
            return Ok(Vec::new());
        }

        let data = self.data.read().map_err(poisoned)?;
        Ok(data
            .candles
            .get(symbol)
            .map(|series| series.range(start..end).map(|(_, c)| c.clone()).collect())
            .unwrap_or_default())
    }

    async fn ticks(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Tick>> {
        let data = self.data.read().map_err(poisoned)?;
        Ok(data
            .ticks
            .get(symbol)
            .map(|series| {
                series
                    .iter()
                    .filter(|t| t.timestamp >= start && t.timestamp < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
