// Strategy decision layer
pub mod adaptive_sar;
pub mod adx;
pub mod book;
pub mod factory;
pub mod parabolic_sar;
pub mod parabolic_sar_mtf;
pub mod structural_pivot;
pub mod supertrend;

pub use adaptive_sar::AdaptiveSarStrategy;
pub use adx::AdxStrategy;
pub use book::{BookEntry, TradeBook};
pub use factory::StrategyFactory;
pub use parabolic_sar::ParabolicSarStrategy;
pub use parabolic_sar_mtf::ParabolicSarMtfStrategy;
pub use structural_pivot::StructuralPivotStrategy;
pub use supertrend::SuperTrendStrategy;

use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use std::sync::Arc;

use crate::calendar::TimeSlots;
use crate::config::{RunConfig, SarParams};
use crate::execution::Orders;
use crate::indicators::{Indicator, IndicatorConfig, IndicatorContext, SeriesRow, SeriesHandle};
use crate::error::TradingError;
use crate::models::Trend;
use crate::Result;

/// Collaborators and settings every strategy is built from
#[derive(Clone)]
pub struct StrategyContext {
    pub indicators: IndicatorContext,
    pub orders: Arc<dyn Orders>,
    pub close: NaiveTime,
    pub entry_cutoff_minutes: u32,
    pub sar: SarParams,
    pub stateless: bool,
    pub rows_to_keep: usize,
}

impl StrategyContext {
    pub fn from_config(config: &RunConfig, indicators: IndicatorContext, orders: Arc<dyn Orders>) -> Self {
        Self {
            close: indicators.calendar.close(),
            indicators,
            orders,
            entry_cutoff_minutes: config.scheduler.entry_cutoff_minutes,
            sar: config.sar,
            stateless: config.persistence.stateless,
            rows_to_keep: config.persistence.rows_to_keep,
        }
    }

    /// Indicator collaborators with series keys scoped to `strategy`
    pub fn indicator_context(&self, strategy: &str) -> IndicatorContext {
        IndicatorContext {
            strategy: strategy.to_string(),
            ..self.indicators.clone()
        }
    }

    pub fn indicator_config(&self, symbol: &str, interval: u32, lookback: usize) -> IndicatorConfig {
        IndicatorConfig::new(symbol, interval, lookback)
            .stateless(self.stateless)
            .rows_to_keep(self.rows_to_keep)
    }

    pub fn book(&self, symbol: &str) -> TradeBook {
        TradeBook::new(symbol, self.orders.clone(), self.close, self.entry_cutoff_minutes)
    }
}

/// State shared by every concrete strategy: its indicators in dependency order,
/// the merged time slots and the trade book.
pub struct StrategyCore {
    name: String,
    indicators: Vec<Box<dyn Indicator>>,
    slots: TimeSlots,
    book: TradeBook,
}

impl StrategyCore {
    pub fn new(name: impl Into<String>, indicators: Vec<Box<dyn Indicator>>, book: TradeBook) -> Self {
        let slots = indicators
            .iter()
            .fold(TimeSlots::default(), |acc, ind| acc.merge(ind.allowed_time_slots()));

        Self {
            name: name.into(),
            indicators,
            slots,
            book,
        }
    }
}

/// A trading strategy for one symbol.
///
/// The scheduler refreshes the indicators in declared order and then calls `decide`.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn core(&self) -> &StrategyCore;

    fn core_mut(&mut self) -> &mut StrategyCore;

    /// Read the refreshed indicators and act through the trade book
    async fn decide(&mut self, candle_time: NaiveDateTime) -> Result<()>;

    fn name(&self) -> &str {
        &self.core().name
    }

    fn symbol(&self) -> &str {
        self.core().book.symbol()
    }

    /// Minutes at which at least one indicator has a new candle
    fn allowed_time_slots(&self) -> &TimeSlots {
        &self.core().slots
    }

    fn indicators(&self) -> &[Box<dyn Indicator>] {
        &self.core().indicators
    }

    fn book(&self) -> &TradeBook {
        &self.core().book
    }

    fn book_mut(&mut self) -> &mut TradeBook {
        &mut self.core_mut().book
    }

    /// Refresh every indicator in dependency order
    async fn refresh_indicators(&mut self, candle_time: NaiveDateTime) -> Result<()> {
        for indicator in self.core_mut().indicators.iter_mut() {
            tracing::debug!(indicator = indicator.name(), "Refreshing at {}", candle_time);
            indicator.refresh(candle_time).await?;
        }
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        for indicator in self.indicators() {
            indicator.persist().await?;
        }
        tracing::info!(strategy = self.name(), symbol = self.symbol(), "Persisted indicators");
        Ok(())
    }
}

/// The last two validated rows ending at `candle_time`
pub(crate) async fn last_two<R: SeriesRow>(
    handle: &SeriesHandle<R>,
    candle_time: NaiveDateTime,
) -> Result<(R, R)> {
    let mut rows = handle.read().await.lines(2, candle_time)?;
    match (rows.pop(), rows.pop()) {
        (Some(current), Some(prev)) => Ok((prev, current)),
        _ => Err(TradingError::DataNotAvailable("expected two rows".into())),
    }
}

/// `Some(new)` when the trend changed between two rows
pub(crate) fn flip(prev: Trend, current: Trend) -> Option<Trend> {
    (prev != current).then_some(current)
}
