use chrono::NaiveDateTime;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{IndicatorConfig, IndicatorContext, SeriesRow};
use crate::calendar::{missing_times, TradingCalendar};
use crate::error::TradingError;
use crate::persistence::{IndicatorKey, IndicatorStore};
use crate::Result;

/// Shared, read-mostly handle to a series. Only the owning engine writes.
pub type SeriesHandle<R> = Arc<RwLock<Series<R>>>;

/// Append-only, time-ordered rows of one indicator for one symbol and interval
pub struct Series<R: SeriesRow> {
    name: String,
    config: IndicatorConfig,
    calendar: Arc<TradingCalendar>,
    key: IndicatorKey,
    store: Arc<dyn IndicatorStore>,
    rows: Vec<R>,
}

impl<R: SeriesRow> Series<R> {
    /// Empty series bound to its storage key
    pub fn new(name: impl Into<String>, config: IndicatorConfig, ctx: &IndicatorContext) -> Self {
        let name = name.into();
        let key = IndicatorKey {
            strategy: ctx.strategy.clone(),
            indicator: name.clone(),
            symbol: config.symbol.clone(),
            interval: config.interval,
            period: config.period,
        };

        Self {
            name,
            config,
            calendar: ctx.calendar.clone(),
            key,
            store: ctx.store.clone(),
            rows: Vec::new(),
        }
    }

    /// Series restored from the store, or empty in stateless mode
    pub async fn open(
        name: impl Into<String>,
        config: IndicatorConfig,
        ctx: &IndicatorContext,
    ) -> Result<Self> {
        let mut series = Self::new(name, config, ctx);
        if !series.config.stateless {
            series.load().await?;
        }
        Ok(series)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    pub fn key(&self) -> &IndicatorKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&R> {
        self.rows.last()
    }

    /// Boundary of the candle that completed at `candle_time`
    pub fn expected_time(&self, candle_time: NaiveDateTime) -> Result<NaiveDateTime> {
        self.calendar
            .previous_time(self.config.period, self.config.interval, candle_time)
    }

    /// Row to continue from at `candle_time`.
    ///
    /// `None` when the series is empty or its last row is not the boundary right
    /// before the expected one; the caller must then re-derive from raw candles.
    pub fn previous_row(&self, candle_time: NaiveDateTime) -> Result<Option<R>> {
        let last = match self.rows.last() {
            Some(last) => last,
            None => return Ok(None),
        };

        let expected =
            self.calendar
                .sequence(self.config.period, self.config.interval, 2, candle_time)?;

        if expected.get(1) == Some(&last.timestamp()) {
            return Ok(Some(last.clone()));
        }

        tracing::warn!(
            indicator = %self.name,
            symbol = %self.config.symbol,
            "Series out of sync at {}: last row {}, expected {:?}",
            candle_time,
            last.timestamp(),
            expected.get(1)
        );

        Ok(None)
    }

    /// Last `n` rows, checked against the calendar sequence ending at `candle_time`
    pub fn lines(&self, n: usize, candle_time: NaiveDateTime) -> Result<Vec<R>> {
        let mut expected =
            self.calendar
                .sequence(self.config.period, self.config.interval, n, candle_time)?;
        expected.reverse();

        let rows = self.lines_unsafe(n);
        let actual: Vec<NaiveDateTime> = rows.iter().map(|r| r.timestamp()).collect();

        if actual != expected {
            return Err(TradingError::DataNotAvailable(format!(
                "{} {} lines for {} at {} not aligned, missing {:?}",
                self.name,
                n,
                self.config.symbol,
                candle_time,
                missing_times(&actual, &expected)
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
            )));
        }

        Ok(rows)
    }

    /// Last `n` rows (or fewer) without alignment checks
    pub fn lines_unsafe(&self, n: usize) -> Vec<R> {
        let start = self.rows.len().saturating_sub(n);
        self.rows[start..].to_vec()
    }

    pub fn all(&self) -> &[R] {
        &self.rows
    }

    /// Append a row; timestamps must strictly increase
    pub fn append(&mut self, row: R) -> Result<()> {
        if let Some(last) = self.rows.last() {
            if row.timestamp() <= last.timestamp() {
                return Err(TradingError::invariant(
                    &self.config.symbol,
                    format!(
                        "{} row at {} does not follow {}",
                        self.name,
                        row.timestamp(),
                        last.timestamp()
                    ),
                ));
            }
        }

        self.rows.push(row);
        Ok(())
    }

    /// Drop rows at or after `from`; returns how many were dropped
    pub fn discard_from(&mut self, from: NaiveDateTime) -> usize {
        let keep = self.rows.partition_point(|r| r.timestamp() < from);
        let dropped = self.rows.len() - keep;
        self.rows.truncate(keep);
        dropped
    }

    /// Save the last `rows_to_keep` rows
    pub async fn persist(&self) -> Result<()> {
        let tail = self.lines_unsafe(self.config.rows_to_keep);
        let values = tail
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.store.save(&self.key, values).await?;

        tracing::info!(
            indicator = %self.name,
            symbol = %self.config.symbol,
            "Persisted {} rows",
            tail.len()
        );

        Ok(())
    }

    /// Replace in-memory rows with the stored ones
    pub async fn load(&mut self) -> Result<()> {
        let values = self.store.load(&self.key).await?;
        let rows = values
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<R>, _>>()?;

        if rows.windows(2).any(|w| w[0].timestamp() >= w[1].timestamp()) {
            return Err(TradingError::Store(format!(
                "stored rows for {} are not time ordered",
                self.key
            )));
        }

        tracing::info!(
            indicator = %self.name,
            symbol = %self.config.symbol,
            "Loaded {} stored rows",
            rows.len()
        );

        self.rows = rows;
        Ok(())
    }

    pub fn into_handle(self) -> SeriesHandle<R> {
        Arc::new(RwLock::new(self))
    }
}
