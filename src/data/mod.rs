//! Raw candle and tick sources.

pub mod memory;
pub mod postgres;
pub mod resample;

pub use memory::MemoryMarketData;
pub use postgres::PostgresMarketData;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::models::{Candle, Tick};
use crate::Result;

/// Queryable store of one-minute candles and raw ticks.
///
/// Ranges are half open (`[start, end)`). A window without data yields an
/// empty vector, never an error.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn candles(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Candle>>;

    async fn ticks(&self, symbol: &str, start: NaiveDateTime, end: NaiveDateTime)
        -> Result<Vec<Tick>>;

    /// Stored one-minute candles, or candles resampled from ticks when none are stored
    async fn minute_candles(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Candle>> {
        let candles = self.candles(symbol, start, end).await?;
        if !candles.is_empty() {
            return Ok(candles);
        }

        let ticks = self.ticks(symbol, start, end).await?;
        Ok(resample::candles_from_ticks(symbol, &ticks))
    }

    /// Close of the newest one-minute candle in `[start, end)`
    async fn last_price(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Option<f64>> {
        let candles = self.minute_candles(symbol, start, end).await?;
        Ok(candles.last().map(|c| c.close))
    }
}
