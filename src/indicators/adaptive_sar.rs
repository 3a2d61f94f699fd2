//! Adaptive SAR
//!
//! A volatility stop around the significant close (SIC): while green the SIC is the
//! highest close of the lookback window and `sar = sic - atr * arc`; while red the
//! SIC is the lowest close and `sar = sic + atr * arc`. A close through the previous
//! SAR flips the trend and reseeds the SIC from that close.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{AtrRow, Formula, FormulaInput, SeriesHandle, SeriesRow};
use crate::error::TradingError;
use crate::models::{Bar, Trend};
use crate::Result;

pub const DEFAULT_ARC: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveSarRow {
    pub ts: NaiveDateTime,
    pub bar: Bar,
    pub atr: f64,
    pub sic: f64,
    pub sar: f64,
    pub trend: Trend,
}

impl SeriesRow for AdaptiveSarRow {
    fn timestamp(&self) -> NaiveDateTime {
        self.ts
    }
}

pub struct AdaptiveSar {
    atr: SeriesHandle<AtrRow>,
    arc: f64,
}

impl AdaptiveSar {
    pub fn new(atr: SeriesHandle<AtrRow>) -> Self {
        Self {
            atr,
            arc: DEFAULT_ARC,
        }
    }

    pub fn with_arc(mut self, arc: f64) -> Self {
        self.arc = arc;
        self
    }

    fn row(&self, atr: &AtrRow, sic: f64, trend: Trend) -> AdaptiveSarRow {
        let offset = atr.atr * self.arc;
        let sar = match trend {
            Trend::Green => sic - offset,
            Trend::Red => sic + offset,
        };

        AdaptiveSarRow {
            ts: atr.ts,
            bar: atr.bar,
            atr: atr.atr,
            sic,
            sar,
            trend,
        }
    }

    /// First row from two ATR rows; the trend is a guess from their closes
    pub fn seed(&self, prev: &AtrRow, current: &AtrRow) -> AdaptiveSarRow {
        let trend = if prev.bar.close < current.bar.close {
            Trend::Green
        } else {
            Trend::Red
        };
        self.row(current, current.bar.close, trend)
    }

    /// Next row given the newest ATR row and the closes of the lookback window
    pub fn next(&self, prev: &AdaptiveSarRow, current: &AtrRow, closes: &[f64]) -> AdaptiveSarRow {
        let close = current.bar.close;

        match prev.trend {
            Trend::Green if close < prev.sar => self.row(current, close, Trend::Red),
            Trend::Red if close > prev.sar => self.row(current, close, Trend::Green),
            Trend::Green => {
                let sic = closes.iter().copied().fold(f64::MIN, f64::max);
                self.row(current, sic, Trend::Green)
            }
            Trend::Red => {
                let sic = closes.iter().copied().fold(f64::MAX, f64::min);
                self.row(current, sic, Trend::Red)
            }
        }
    }
}

#[async_trait]
impl Formula for AdaptiveSar {
    type Row = AdaptiveSarRow;

    async fn bootstrap(&self, input: &FormulaInput<'_>) -> Result<AdaptiveSarRow> {
        let lines = self.atr.read().await.lines(2, input.candle_time)?;
        match lines.as_slice() {
            [prev, current] => Ok(self.seed(prev, current)),
            _ => Err(TradingError::DataNotAvailable(
                "adaptive SAR needs two ATR rows".into(),
            )),
        }
    }

    async fn step(
        &self,
        prev: &AdaptiveSarRow,
        _history: &[AdaptiveSarRow],
        input: &FormulaInput<'_>,
    ) -> Result<AdaptiveSarRow> {
        let lines = self.atr.read().await.lines(1, input.candle_time)?;
        let current = lines
            .last()
            .ok_or_else(|| TradingError::DataNotAvailable("no ATR row".into()))?;

        let closes: Vec<f64> = input
            .feed
            .window(input.config.lookback, input.candle_time)
            .await?
            .iter()
            .map(|c| c.close)
            .collect();

        Ok(self.next(prev, current, &closes))
    }
}
