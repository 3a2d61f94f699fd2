//! SuperTrend
//!
//! `SuperTrendBand` computes the basic bands `(high + low) / 2 ± multiplier * ATR`
//! and ratchets them into final bands: the upper band only moves down and the
//! lower band only moves up unless the previous close broke through them.
//!
//! `SuperTrend` follows the lower band while green and the upper band while red,
//! flipping when a close crosses the band it is following.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{AtrRow, Formula, FormulaInput, SeriesHandle, SeriesRow};
use crate::error::TradingError;
use crate::models::{Bar, Trend};
use crate::Result;

pub const DEFAULT_MULTIPLIER: f64 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperTrendBandRow {
    pub ts: NaiveDateTime,
    pub bar: Bar,
    pub atr: f64,
    pub basic_upper: f64,
    pub basic_lower: f64,
    pub final_upper: f64,
    pub final_lower: f64,
}

impl SeriesRow for SuperTrendBandRow {
    fn timestamp(&self) -> NaiveDateTime {
        self.ts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuperTrendRow {
    pub ts: NaiveDateTime,
    pub bar: Bar,
    pub final_upper: f64,
    pub final_lower: f64,
    pub supertrend: f64,
    pub trend: Trend,
}

impl SeriesRow for SuperTrendRow {
    fn timestamp(&self) -> NaiveDateTime {
        self.ts
    }
}

pub struct SuperTrendBand {
    atr: SeriesHandle<AtrRow>,
    multiplier: f64,
}

impl SuperTrendBand {
    pub fn new(atr: SeriesHandle<AtrRow>, multiplier: f64) -> Self {
        Self { atr, multiplier }
    }

    fn basic(&self, atr: &AtrRow) -> (f64, f64) {
        let mid = (atr.bar.high + atr.bar.low) / 2.0;
        let offset = self.multiplier * atr.atr;
        (mid + offset, mid - offset)
    }

    pub fn seed(&self, atr: &AtrRow) -> SuperTrendBandRow {
        let (basic_upper, basic_lower) = self.basic(atr);
        SuperTrendBandRow {
            ts: atr.ts,
            bar: atr.bar,
            atr: atr.atr,
            basic_upper,
            basic_lower,
            final_upper: basic_upper,
            final_lower: basic_lower,
        }
    }

    pub fn next(&self, prev: &SuperTrendBandRow, atr: &AtrRow) -> SuperTrendBandRow {
        let (basic_upper, basic_lower) = self.basic(atr);

        let final_upper = if basic_upper < prev.final_upper || prev.bar.close > prev.final_upper {
            basic_upper
        } else {
            prev.final_upper
        };
        let final_lower = if basic_lower > prev.final_lower || prev.bar.close < prev.final_lower {
            basic_lower
        } else {
            prev.final_lower
        };

        SuperTrendBandRow {
            ts: atr.ts,
            bar: atr.bar,
            atr: atr.atr,
            basic_upper,
            basic_lower,
            final_upper,
            final_lower,
        }
    }

    async fn current_atr(&self, candle_time: NaiveDateTime) -> Result<AtrRow> {
        self.atr
            .read()
            .await
            .lines(1, candle_time)?
            .pop()
            .ok_or_else(|| TradingError::DataNotAvailable("no ATR row".into()))
    }
}

#[async_trait]
impl Formula for SuperTrendBand {
    type Row = SuperTrendBandRow;

    async fn bootstrap(&self, input: &FormulaInput<'_>) -> Result<SuperTrendBandRow> {
        let atr = self.current_atr(input.candle_time).await?;
        Ok(self.seed(&atr))
    }

    async fn step(
        &self,
        prev: &SuperTrendBandRow,
        _history: &[SuperTrendBandRow],
        input: &FormulaInput<'_>,
    ) -> Result<SuperTrendBandRow> {
        let atr = self.current_atr(input.candle_time).await?;
        Ok(self.next(prev, &atr))
    }
}

fn line(band: &SuperTrendBandRow, trend: Trend) -> SuperTrendRow {
    let supertrend = match trend {
        Trend::Green => band.final_lower,
        Trend::Red => band.final_upper,
    };

    SuperTrendRow {
        ts: band.ts,
        bar: band.bar,
        final_upper: band.final_upper,
        final_lower: band.final_lower,
        supertrend,
        trend,
    }
}

pub struct SuperTrend {
    band: SeriesHandle<SuperTrendBandRow>,
}

impl SuperTrend {
    pub fn new(band: SeriesHandle<SuperTrendBandRow>) -> Self {
        Self { band }
    }

    pub fn seed(band: &SuperTrendBandRow) -> SuperTrendRow {
        let trend = if band.bar.close > band.final_upper {
            Trend::Green
        } else {
            Trend::Red
        };
        line(band, trend)
    }

    pub fn next(prev: &SuperTrendRow, band: &SuperTrendBandRow) -> SuperTrendRow {
        let close = band.bar.close;
        let trend = match prev.trend {
            Trend::Red if close > band.final_upper => Trend::Green,
            Trend::Green if close < band.final_lower => Trend::Red,
            trend => trend,
        };
        line(band, trend)
    }

    async fn current_band(&self, candle_time: NaiveDateTime) -> Result<SuperTrendBandRow> {
        self.band
            .read()
            .await
            .lines(1, candle_time)?
            .pop()
            .ok_or_else(|| TradingError::DataNotAvailable("no SuperTrend band row".into()))
    }
}

#[async_trait]
impl Formula for SuperTrend {
    type Row = SuperTrendRow;

    async fn bootstrap(&self, input: &FormulaInput<'_>) -> Result<SuperTrendRow> {
        let band = self.current_band(input.candle_time).await?;
        Ok(Self::seed(&band))
    }

    async fn step(
        &self,
        prev: &SuperTrendRow,
        _history: &[SuperTrendRow],
        input: &FormulaInput<'_>,
    ) -> Result<SuperTrendRow> {
        let band = self.current_band(input.candle_time).await?;
        Ok(Self::next(prev, &band))
    }
}
