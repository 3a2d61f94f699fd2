//! Parabolic SAR
//!
//! Trend continuation: the extreme price (EP) follows new highs (green) or lows
//! (red) and each new extreme raises the acceleration factor (AF) by `af_step`
//! up to `af_max`; `sar = prev_sar ± af * |ep - prev_sar|`.
//!
//! Reversal: when a candle breaches the previous SAR the trend flips, AF resets to
//! `af_start`, the previous EP becomes the pivot and the breaching candle's
//! extreme becomes the new EP.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{Formula, FormulaInput, SeriesRow};
use crate::config::SarParams;
use crate::error::TradingError;
use crate::models::{Bar, Candle, Trend};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SarRow {
    pub ts: NaiveDateTime,
    pub bar: Bar,
    pub sar: f64,
    pub ep: f64,
    pub af: f64,
    pub trend: Trend,
}

impl SeriesRow for SarRow {
    fn timestamp(&self) -> NaiveDateTime {
        self.ts
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParabolicSar {
    params: SarParams,
}

impl ParabolicSar {
    pub fn new(params: SarParams) -> Self {
        Self { params }
    }

    /// First row from two candles; the starting trend is a guess from their highs
    pub fn seed(&self, first: &Candle, second: &Candle) -> SarRow {
        let af = self.params.af_start;

        let (trend, ep, sar) = if first.high < second.high {
            let ep = second.high;
            let psar = first.low.min(second.low);
            (Trend::Green, ep, psar + af * (ep - psar))
        } else {
            let ep = second.low;
            let psar = first.high.max(second.high);
            (Trend::Red, ep, psar - af * (psar - ep))
        };

        SarRow {
            ts: second.timestamp,
            bar: second.bar(),
            sar,
            ep,
            af,
            trend,
        }
    }

    /// Next row from the previous one and the newest candle
    pub fn next(&self, prev: &SarRow, candle: &Candle) -> SarRow {
        let p = &self.params;
        let row = |sar, ep, af, trend| SarRow {
            ts: candle.timestamp,
            bar: candle.bar(),
            sar,
            ep,
            af,
            trend,
        };

        match prev.trend {
            Trend::Green => {
                if candle.low < prev.sar {
                    let ep = candle.low;
                    let psar = prev.ep;
                    return row(psar - p.af_start * (psar - ep), ep, p.af_start, Trend::Red);
                }

                let (ep, af) = if candle.high > prev.ep {
                    (candle.high, (prev.af + p.af_step).min(p.af_max))
                } else {
                    (prev.ep, prev.af)
                };
                row(prev.sar + af * (ep - prev.sar), ep, af, Trend::Green)
            }
            Trend::Red => {
                if candle.high > prev.sar {
                    let ep = candle.high;
                    let psar = prev.ep;
                    return row(psar + p.af_start * (ep - psar), ep, p.af_start, Trend::Green);
                }

                let (ep, af) = if candle.low < prev.ep {
                    (candle.low, (prev.af + p.af_step).min(p.af_max))
                } else {
                    (prev.ep, prev.af)
                };
                row(prev.sar - af * (prev.sar - ep), ep, af, Trend::Red)
            }
        }
    }
}

#[async_trait]
impl Formula for ParabolicSar {
    type Row = SarRow;

    async fn bootstrap(&self, input: &FormulaInput<'_>) -> Result<SarRow> {
        let lookback = input.config.lookback.max(2);
        let candles = input.feed.window(lookback, input.candle_time).await?;

        let (first, second) = match candles.as_slice() {
            [first, second, ..] => (first, second),
            _ => {
                return Err(TradingError::DataNotAvailable(
                    "parabolic SAR needs two candles".into(),
                ))
            }
        };

        // Seed from the first two candles and walk the rest of the window
        let mut row = self.seed(first, second);
        for candle in &candles[2..] {
            row = self.next(&row, candle);
        }

        Ok(row)
    }

    async fn step(&self, prev: &SarRow, _history: &[SarRow], input: &FormulaInput<'_>) -> Result<SarRow> {
        let candle = input.feed.latest(input.candle_time).await?;
        Ok(self.next(prev, &candle))
    }
}
