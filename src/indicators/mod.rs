// Incremental indicator engine
// Implements True Range, ATR, DX/ADX, Parabolic SAR, Adaptive SAR, SuperTrend and Structural Pivot

pub mod adaptive_sar;
pub mod adx;
pub mod atr;
pub mod engine;
pub mod feed;
pub mod parabolic_sar;
pub mod series;
pub mod structural_pivot;
pub mod supertrend;
pub mod true_range;

pub use adaptive_sar::{AdaptiveSar, AdaptiveSarRow};
pub use adx::{Adx, AdxRow, Dx, DxRow};
pub use atr::{AtrRow, AverageTrueRange};
pub use engine::{Formula, FormulaInput, IndicatorEngine};
pub use feed::CandleFeed;
pub use parabolic_sar::{ParabolicSar, SarRow};
pub use series::{Series, SeriesHandle};
pub use structural_pivot::{Pivot, PivotKind, PivotRow, StructuralPivot};
pub use supertrend::{SuperTrend, SuperTrendBand, SuperTrendBandRow, SuperTrendRow};
pub use true_range::{TrueRange, TrueRangeRow};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::calendar::{TimeSlots, TradingCalendar};
use crate::data::MarketData;
use crate::models::Period;
use crate::persistence::IndicatorStore;
use crate::Result;

/// One row of an indicator series, labelled by its candle start time
pub trait SeriesRow: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    fn timestamp(&self) -> NaiveDateTime;
}

/// Parameters of one indicator instance
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub symbol: String,
    pub period: Period,
    pub interval: u32,
    /// Bootstrap window in candles of `interval`
    pub lookback: usize,
    /// Start empty instead of loading stored rows
    pub stateless: bool,
    /// Rows kept when persisting
    pub rows_to_keep: usize,
}

impl IndicatorConfig {
    pub fn new(symbol: impl Into<String>, interval: u32, lookback: usize) -> Self {
        Self {
            symbol: symbol.into(),
            period: Period::Minute,
            interval,
            lookback,
            stateless: false,
            rows_to_keep: 50,
        }
    }

    pub fn stateless(mut self, stateless: bool) -> Self {
        self.stateless = stateless;
        self
    }

    pub fn rows_to_keep(mut self, rows: usize) -> Self {
        self.rows_to_keep = rows;
        self
    }

    pub fn with_interval(&self, interval: u32) -> Self {
        Self {
            interval,
            ..self.clone()
        }
    }
}

/// Collaborators shared by every indicator of one strategy
#[derive(Clone)]
pub struct IndicatorContext {
    pub strategy: String,
    pub calendar: Arc<TradingCalendar>,
    pub market_data: Arc<dyn MarketData>,
    pub store: Arc<dyn IndicatorStore>,
}

impl IndicatorContext {
    pub fn feed(&self, config: &IndicatorConfig) -> CandleFeed {
        CandleFeed::new(
            self.market_data.clone(),
            self.calendar.clone(),
            config.symbol.clone(),
            config.period,
            config.interval,
        )
    }
}

/// Refreshable indicator as seen by strategies and workers
#[async_trait]
pub trait Indicator: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> u32;

    /// Minutes at which this indicator has a new candle
    fn allowed_time_slots(&self) -> &TimeSlots;

    /// Compute the row for the candle that completed at `candle_time`
    async fn refresh(&mut self, candle_time: NaiveDateTime) -> Result<()>;

    /// Flush the tail of the series to the store
    async fn persist(&self) -> Result<()>;
}

/// Arithmetic mean, 0 for an empty input
pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::data::MemoryMarketData;
    use crate::models::Candle;
    use crate::persistence::MemoryIndicatorStore;
    use chrono::NaiveDate;

    pub fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 12, 3)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    pub fn candle(t: NaiveDateTime, o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle {
            symbol: "IEX".to_string(),
            timestamp: t,
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 100.0,
        }
    }

    /// One-minute candles from 09:15 on 2021-12-03 (a Friday)
    pub fn minute_candles(ohlc: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        ohlc.iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| {
                candle(at(9, 15) + chrono::Duration::minutes(i as i64), o, h, l, c)
            })
            .collect()
    }

    pub fn context(candles: Vec<Candle>) -> (IndicatorContext, MemoryIndicatorStore) {
        let market_data = MemoryMarketData::new();
        market_data.insert_candles(candles).unwrap();
        let store = MemoryIndicatorStore::new();

        let ctx = IndicatorContext {
            strategy: "Test".to_string(),
            calendar: Arc::new(TradingCalendar::default()),
            market_data: Arc::new(market_data),
            store: Arc::new(store.clone()),
        };

        (ctx, store)
    }
}
