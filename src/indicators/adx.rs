//! Directional Movement (DX) and Average Directional Index (ADX)
//!
//! DX smooths +DM, -DM and TR with `smoothed = prev - prev / n + current`, derives
//! +DI / -DI (rounded percentages) and `DX = round(|+DI - -DI| / (+DI + -DI) * 100)`.
//! ADX starts as the mean of `n` DX values and is then Wilder-smoothed.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{mean, Formula, FormulaInput, SeriesHandle, SeriesRow, TrueRangeRow};
use crate::error::TradingError;
use crate::models::Bar;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DxRow {
    pub ts: NaiveDateTime,
    pub bar: Bar,
    pub plus_dm: f64,
    pub minus_dm: f64,
    pub tr_n: f64,
    pub plus_dm_n: f64,
    pub minus_dm_n: f64,
    pub plus_di: f64,
    pub minus_di: f64,
    pub dx: f64,
}

impl SeriesRow for DxRow {
    fn timestamp(&self) -> NaiveDateTime {
        self.ts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdxRow {
    pub ts: NaiveDateTime,
    pub bar: Bar,
    pub plus_di: f64,
    pub minus_di: f64,
    pub dx: f64,
    pub adx: f64,
}

impl SeriesRow for AdxRow {
    fn timestamp(&self) -> NaiveDateTime {
        self.ts
    }
}

/// +DM and -DM of `current` against `prev`
fn directional_movement(prev: &Bar, current: &Bar) -> (f64, f64) {
    let high_diff = current.high - prev.high;
    let low_diff = prev.low - current.low;

    if high_diff > 0.0 && high_diff > low_diff {
        (high_diff, 0.0)
    } else if low_diff > 0.0 && low_diff > high_diff {
        (0.0, low_diff)
    } else {
        (0.0, 0.0)
    }
}

fn percent_of(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        (part / whole * 100.0).round()
    }
}

fn dx_row(
    ts: NaiveDateTime,
    bar: Bar,
    (plus_dm, minus_dm): (f64, f64),
    (tr_n, plus_dm_n, minus_dm_n): (f64, f64, f64),
) -> DxRow {
    let plus_di = percent_of(plus_dm_n, tr_n);
    let minus_di = percent_of(minus_dm_n, tr_n);

    DxRow {
        ts,
        bar,
        plus_dm,
        minus_dm,
        tr_n,
        plus_dm_n,
        minus_dm_n,
        plus_di,
        minus_di,
        dx: percent_of((plus_di - minus_di).abs(), plus_di + minus_di),
    }
}

pub struct Dx {
    true_range: SeriesHandle<TrueRangeRow>,
}

impl Dx {
    pub fn new(true_range: SeriesHandle<TrueRangeRow>) -> Self {
        Self { true_range }
    }
}

#[async_trait]
impl Formula for Dx {
    type Row = DxRow;

    async fn bootstrap(&self, input: &FormulaInput<'_>) -> Result<DxRow> {
        let lines = self
            .true_range
            .read()
            .await
            .lines(input.config.lookback, input.candle_time)?;
        let last = lines
            .last()
            .ok_or_else(|| TradingError::DataNotAvailable("no true range rows".into()))?;

        let mut sums = (0.0, 0.0, 0.0);
        let mut last_dm = (0.0, 0.0);
        for pair in lines.windows(2) {
            let (plus, minus) = directional_movement(&pair[0].bar, &pair[1].bar);
            sums.0 += pair[1].tr;
            sums.1 += plus;
            sums.2 += minus;
            last_dm = (plus, minus);
        }

        Ok(dx_row(last.ts, last.bar, last_dm, sums))
    }

    async fn step(&self, prev: &DxRow, _history: &[DxRow], input: &FormulaInput<'_>) -> Result<DxRow> {
        let n = input.config.lookback as f64;
        let lines = self.true_range.read().await.lines(1, input.candle_time)?;
        let current = lines
            .last()
            .ok_or_else(|| TradingError::DataNotAvailable("no true range row".into()))?;

        let (plus, minus) = directional_movement(&prev.bar, &current.bar);
        let smooth = |prev: f64, value: f64| prev - prev / n + value;

        Ok(dx_row(
            current.ts,
            current.bar,
            (plus, minus),
            (
                smooth(prev.tr_n, current.tr),
                smooth(prev.plus_dm_n, plus),
                smooth(prev.minus_dm_n, minus),
            ),
        ))
    }
}

pub struct Adx {
    dx: SeriesHandle<DxRow>,
}

impl Adx {
    pub fn new(dx: SeriesHandle<DxRow>) -> Self {
        Self { dx }
    }
}

#[async_trait]
impl Formula for Adx {
    type Row = AdxRow;

    async fn bootstrap(&self, input: &FormulaInput<'_>) -> Result<AdxRow> {
        let lines = self
            .dx
            .read()
            .await
            .lines(input.config.lookback, input.candle_time)?;
        let last = lines
            .last()
            .ok_or_else(|| TradingError::DataNotAvailable("no DX rows".into()))?;

        Ok(AdxRow {
            ts: last.ts,
            bar: last.bar,
            plus_di: last.plus_di,
            minus_di: last.minus_di,
            dx: last.dx,
            adx: mean(lines.iter().map(|r| r.dx)),
        })
    }

    async fn step(&self, prev: &AdxRow, _history: &[AdxRow], input: &FormulaInput<'_>) -> Result<AdxRow> {
        let n = input.config.lookback as f64;
        let lines = self.dx.read().await.lines(1, input.candle_time)?;
        let current = lines
            .last()
            .ok_or_else(|| TradingError::DataNotAvailable("no DX row".into()))?;

        Ok(AdxRow {
            ts: current.ts,
            bar: current.bar,
            plus_di: current.plus_di,
            minus_di: current.minus_di,
            dx: current.dx,
            adx: (prev.adx * (n - 1.0) + current.dx) / n,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{at, context, minute_candles};
    use crate::indicators::{Indicator, IndicatorConfig, IndicatorEngine, TrueRange};

    fn bar(high: f64, low: f64) -> Bar {
        Bar {
            high,
            low,
            ..Bar::default()
        }
    }

    #[test]
    fn test_directional_movement() {
        assert_eq!(directional_movement(&bar(10.0, 8.0), &bar(12.0, 9.0)), (2.0, 0.0));
        assert_eq!(directional_movement(&bar(10.0, 8.0), &bar(10.5, 6.0)), (0.0, 2.0));
        // inside bar
        assert_eq!(directional_movement(&bar(10.0, 8.0), &bar(9.0, 8.5)), (0.0, 0.0));
    }

    #[test]
    fn test_dx_of_pure_uptrend() {
        let row = dx_row(at(9, 20), Bar::default(), (1.0, 0.0), (4.0, 2.0, 0.0));

        assert_eq!(row.plus_di, 50.0);
        assert_eq!(row.minus_di, 0.0);
        assert_eq!(row.dx, 100.0);

        let flat = dx_row(at(9, 20), Bar::default(), (0.0, 0.0), (4.0, 0.0, 0.0));
        assert_eq!(flat.dx, 0.0);
    }

    #[tokio::test]
    async fn test_adx_chain_in_uptrend() {
        let ohlc: Vec<_> = (0..20)
            .map(|i| {
                let p = 100.0 + i as f64;
                (p, p + 1.0, p - 1.0, p + 0.5)
            })
            .collect();
        let (ctx, _) = context(minute_candles(&ohlc));
        let config = IndicatorConfig::new("IEX", 1, 3);

        let mut tr = IndicatorEngine::open("true_range", TrueRange, config.clone(), &ctx)
            .await
            .unwrap();
        let mut dx = IndicatorEngine::open("dx", Dx::new(tr.handle()), config.clone(), &ctx)
            .await
            .unwrap();
        let mut adx = IndicatorEngine::open("adx", Adx::new(dx.handle()), config, &ctx)
            .await
            .unwrap();

        for m in 17..=30 {
            let t = at(9, m);
            tr.refresh(t).await.unwrap();
            let _ = dx.refresh(t).await;
            let _ = adx.refresh(t).await;
        }

        let handle = adx.handle();
        let series = handle.read().await;
        let last = series.lines(1, at(9, 30)).unwrap().pop().unwrap();

        // every bar makes a higher high and a higher low
        assert_eq!(last.minus_di, 0.0);
        assert!(last.plus_di > 0.0);
        assert_eq!(last.dx, 100.0);
        assert!((last.adx - 100.0).abs() < 1e-9);
    }
}
