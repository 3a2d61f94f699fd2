use chrono::NaiveDateTime;
use std::sync::Arc;

use crate::calendar::{missing_times, time_delta, TradingCalendar};
use crate::data::{resample, MarketData};
use crate::error::TradingError;
use crate::models::{Candle, Period};
use crate::Result;

/// Interval candles of one symbol, aligned to the trading calendar.
///
/// Candles are aggregated from one-minute candles into buckets that start at the
/// session open, so a 3 minute feed has buckets at 09:15, 09:18, ...
#[derive(Clone)]
pub struct CandleFeed {
    market_data: Arc<dyn MarketData>,
    calendar: Arc<TradingCalendar>,
    symbol: String,
    period: Period,
    interval: u32,
}

impl CandleFeed {
    pub fn new(
        market_data: Arc<dyn MarketData>,
        calendar: Arc<TradingCalendar>,
        symbol: String,
        period: Period,
        interval: u32,
    ) -> Self {
        Self {
            market_data,
            calendar,
            symbol,
            period,
            interval,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn interval(&self) -> u32 {
        self.interval
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    /// The `n` complete candles before `candle_time`, oldest first.
    ///
    /// Fails with `DataNotAvailable` unless every expected boundary has data.
    pub async fn window(&self, n: usize, candle_time: NaiveDateTime) -> Result<Vec<Candle>> {
        let mut expected = self
            .calendar
            .sequence(self.period, self.interval, n, candle_time)?;
        expected.reverse();

        let (first, last) = match (expected.first(), expected.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Ok(Vec::new()),
        };

        let width = time_delta(self.period, self.interval)?;
        let minutes = self
            .market_data
            .minute_candles(&self.symbol, first, last + width)
            .await?;

        let candles: Vec<Candle> = expected
            .iter()
            .filter_map(|start| resample::bucket(&self.symbol, &minutes, *start, width))
            .collect();

        if candles.len() != expected.len() {
            let actual: Vec<NaiveDateTime> = candles.iter().map(|c| c.timestamp).collect();
            let missing = missing_times(&actual, &expected);
            return Err(TradingError::DataNotAvailable(format!(
                "{} {}-minute candles missing at {:?}",
                self.symbol,
                self.interval,
                missing.iter().map(|t| t.to_string()).collect::<Vec<_>>()
            )));
        }

        Ok(candles)
    }

    /// The newest complete candle at `candle_time`
    pub async fn latest(&self, candle_time: NaiveDateTime) -> Result<Candle> {
        self.window(1, candle_time)
            .await?
            .pop()
            .ok_or_else(|| TradingError::DataNotAvailable(format!("no candle for {}", self.symbol)))
    }
}
