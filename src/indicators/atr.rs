//! Average True Range (ATR)
//!
//! Mean of the first `lookback` true ranges, then Wilder's smoothing:
//! `atr = (prev_atr * (n - 1) + tr) / n`.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{mean, Formula, FormulaInput, SeriesHandle, SeriesRow, TrueRangeRow};
use crate::error::TradingError;
use crate::models::Bar;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtrRow {
    pub ts: NaiveDateTime,
    pub bar: Bar,
    pub tr: f64,
    pub atr: f64,
}

impl SeriesRow for AtrRow {
    fn timestamp(&self) -> NaiveDateTime {
        self.ts
    }
}

pub struct AverageTrueRange {
    true_range: SeriesHandle<TrueRangeRow>,
}

impl AverageTrueRange {
    pub fn new(true_range: SeriesHandle<TrueRangeRow>) -> Self {
        Self { true_range }
    }
}

#[async_trait]
impl Formula for AverageTrueRange {
    type Row = AtrRow;

    async fn bootstrap(&self, input: &FormulaInput<'_>) -> Result<AtrRow> {
        let n = input.config.lookback;
        let lines = self.true_range.read().await.lines(n, input.candle_time)?;
        let last = lines
            .last()
            .ok_or_else(|| TradingError::DataNotAvailable("no true range rows".into()))?;

        Ok(AtrRow {
            ts: last.ts,
            bar: last.bar,
            tr: last.tr,
            atr: mean(lines.iter().map(|r| r.tr)),
        })
    }

    async fn step(
        &self,
        prev: &AtrRow,
        _history: &[AtrRow],
        input: &FormulaInput<'_>,
    ) -> Result<AtrRow> {
        let n = input.config.lookback as f64;
        let lines = self.true_range.read().await.lines(1, input.candle_time)?;
        let current = lines
            .last()
            .ok_or_else(|| TradingError::DataNotAvailable("no true range row".into()))?;

        Ok(AtrRow {
            ts: current.ts,
            bar: current.bar,
            tr: current.tr,
            atr: (prev.atr * (n - 1.0) + current.tr) / n,
        })
    }
}
