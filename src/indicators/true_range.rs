//! True Range (TR)
//!
//! The greatest of:
//! - Current High - Current Low
//! - Abs(Current High - Previous Close)
//! - Abs(Current Low - Previous Close)

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{Formula, FormulaInput, SeriesRow};
use crate::error::TradingError;
use crate::models::{Bar, Candle};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrueRangeRow {
    pub ts: NaiveDateTime,
    pub bar: Bar,
    pub tr: f64,
}

impl SeriesRow for TrueRangeRow {
    fn timestamp(&self) -> NaiveDateTime {
        self.ts
    }
}

pub fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

fn row(candle: &Candle, prev_close: f64) -> TrueRangeRow {
    TrueRangeRow {
        ts: candle.timestamp,
        bar: candle.bar(),
        tr: true_range(candle.high, candle.low, prev_close),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TrueRange;

#[async_trait]
impl Formula for TrueRange {
    type Row = TrueRangeRow;

    async fn bootstrap(&self, input: &FormulaInput<'_>) -> Result<TrueRangeRow> {
        // Previous and current candles are enough
        let candles = input.feed.window(2, input.candle_time).await?;
        match candles.as_slice() {
            [prev, current] => Ok(row(current, prev.close)),
            _ => Err(TradingError::DataNotAvailable(
                "true range needs two candles".into(),
            )),
        }
    }

    async fn step(
        &self,
        prev: &TrueRangeRow,
        _history: &[TrueRangeRow],
        input: &FormulaInput<'_>,
    ) -> Result<TrueRangeRow> {
        let candle = input.feed.latest(input.candle_time).await?;
        Ok(row(&candle, prev.bar.close))
    }
}
