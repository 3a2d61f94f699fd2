use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::{CandleFeed, Indicator, IndicatorConfig, IndicatorContext, Series, SeriesHandle, SeriesRow};
use crate::calendar::TimeSlots;
use crate::error::TradingError;
use crate::Result;

/// Inputs available to a formula for one tick
pub struct FormulaInput<'a> {
    pub feed: &'a CandleFeed,
    pub config: &'a IndicatorConfig,
    pub candle_time: NaiveDateTime,
}

/// The arithmetic of one indicator.
///
/// `bootstrap` derives the first row from raw history; `step` derives the next
/// row from the previous one. Rows produced by either must be labelled with the
/// boundary of the candle that completed at `candle_time`.
#[async_trait]
pub trait Formula: Send + Sync + 'static {
    type Row: SeriesRow;

    async fn bootstrap(&self, input: &FormulaInput<'_>) -> Result<Self::Row>;

    async fn step(
        &self,
        prev: &Self::Row,
        history: &[Self::Row],
        input: &FormulaInput<'_>,
    ) -> Result<Self::Row>;
}

/// Drives a `Formula`: slot gating, continuity, validation and persistence.
pub struct IndicatorEngine<F: Formula> {
    formula: F,
    name: String,
    interval: u32,
    config: IndicatorConfig,
    feed: CandleFeed,
    slots: TimeSlots,
    series: SeriesHandle<F::Row>,
}

impl<F: Formula> IndicatorEngine<F> {
    /// Build the engine and restore its series from the store
    pub async fn open(
        name: &str,
        formula: F,
        config: IndicatorConfig,
        ctx: &IndicatorContext,
    ) -> Result<Self> {
        let series = Series::open(name, config.clone(), ctx).await?;
        Self::with_series(formula, series, ctx)
    }

    pub fn with_series(formula: F, series: Series<F::Row>, ctx: &IndicatorContext) -> Result<Self> {
        let config = series.config().clone();
        let slots = ctx
            .calendar
            .allowed_time_slots(config.period, config.interval)?;

        Ok(Self {
            formula,
            name: series.name().to_string(),
            interval: config.interval,
            feed: ctx.feed(&config),
            config,
            slots,
            series: series.into_handle(),
        })
    }

    /// Read handle for dependent indicators and strategies
    pub fn handle(&self) -> SeriesHandle<F::Row> {
        self.series.clone()
    }
}

#[async_trait]
impl<F: Formula> Indicator for IndicatorEngine<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> u32 {
        self.interval
    }

    fn allowed_time_slots(&self) -> &TimeSlots {
        &self.slots
    }

    async fn refresh(&mut self, candle_time: NaiveDateTime) -> Result<()> {
        if !self.slots.contains(candle_time) {
            return Ok(());
        }

        // Rows restored from a later session cannot be continued from here
        let stale_from = {
            let series = self.series.read().await;
            let expected = series.expected_time(candle_time)?;
            series
                .last()
                .is_some_and(|r| r.timestamp() > expected)
                .then_some(expected)
        };
        if let Some(from) = stale_from {
            let dropped = self.series.write().await.discard_from(from);
            tracing::warn!(
                indicator = %self.name,
                symbol = %self.config.symbol,
                "Discarded {} rows at or after {}",
                dropped,
                from
            );
        }

        let input = FormulaInput {
            feed: &self.feed,
            config: &self.config,
            candle_time,
        };

        let (expected, row) = {
            let series = self.series.read().await;
            let expected = series.expected_time(candle_time)?;

            if series.last().map(|r| r.timestamp()) == Some(expected) {
                tracing::debug!(indicator = %self.name, "Already refreshed for {}", candle_time);
                return Ok(());
            }

            let row = match series.previous_row(candle_time)? {
                Some(prev) => self.formula.step(&prev, series.all(), &input).await?,
                None => {
                    tracing::debug!(
                        indicator = %self.name,
                        symbol = %self.config.symbol,
                        "Bootstrapping from {} candles at {}",
                        self.config.lookback,
                        candle_time
                    );
                    self.formula.bootstrap(&input).await?
                }
            };

            (expected, row)
        };

        if row.timestamp() != expected {
            return Err(TradingError::DataNotAvailable(format!(
                "{} computed row for {} at {}, expected {}",
                self.name,
                self.config.symbol,
                row.timestamp(),
                expected
            )));
        }

        self.series.write().await.append(row)?;

        tracing::debug!(
            indicator = %self.name,
            symbol = %self.config.symbol,
            "Refreshed at {}",
            candle_time
        );

        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        self.series.read().await.persist().await
    }
}
