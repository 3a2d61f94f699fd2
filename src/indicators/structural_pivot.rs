//! Structural Pivot
//!
//! A small pivot high (SPH) is an anchor bar followed by two later bars that both
//! close lower and trade a lower low than the anchor. A small pivot low (SPL) is
//! the mirror image. Pivots alternate: after an SPH only an SPL is searched for,
//! and the search restarts from the bar that confirmed the last pivot.
//!
//! Rows are append-only, so a pivot is recorded on the row that confirms it and
//! carries the anchor's timestamp and prices.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{Formula, FormulaInput, SeriesRow};
use crate::models::{Bar, Candle};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PivotKind {
    High,
    Low,
}

impl PivotKind {
    pub fn opposite(&self) -> Self {
        match self {
            PivotKind::High => PivotKind::Low,
            PivotKind::Low => PivotKind::High,
        }
    }

    /// Whether `bar` confirms `anchor` as this kind of pivot
    fn confirms(&self, anchor: &Bar, bar: &Bar) -> bool {
        match self {
            PivotKind::High => bar.close < anchor.close && bar.low < anchor.low,
            PivotKind::Low => bar.close > anchor.close && bar.high > anchor.high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pivot {
    pub kind: PivotKind,
    pub anchor: NaiveDateTime,
    pub close: f64,
    pub high: f64,
    pub low: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotRow {
    pub ts: NaiveDateTime,
    pub bar: Bar,
    pub pivot: Option<Pivot>,
}

impl SeriesRow for PivotRow {
    fn timestamp(&self) -> NaiveDateTime {
        self.ts
    }
}

impl PivotRow {
    fn from_candle(candle: &Candle) -> Self {
        Self {
            ts: candle.timestamp,
            bar: candle.bar(),
            pivot: None,
        }
    }
}

/// Most recent pivot of `kind` in `rows`
pub fn last_pivot(rows: &[PivotRow], kind: PivotKind) -> Option<&Pivot> {
    rows.iter()
        .rev()
        .filter_map(|r| r.pivot.as_ref())
        .find(|p| p.kind == kind)
}

/// Find a pivot of `kind` in `rows`: an anchor and two confirming bars after it
fn find(rows: &[&PivotRow], kind: PivotKind) -> Option<Pivot> {
    for (i, anchor) in rows.iter().enumerate() {
        let confirmations = rows[i + 1..]
            .iter()
            .filter(|r| kind.confirms(&anchor.bar, &r.bar))
            .take(2)
            .count();

        if confirmations == 2 {
            return Some(Pivot {
                kind,
                anchor: anchor.ts,
                close: anchor.bar.close,
                high: anchor.bar.high,
                low: anchor.bar.low,
            });
        }
    }
    None
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StructuralPivot;

impl StructuralPivot {
    /// Append `candle` to `history` and detect a pivot confirmed by it
    pub fn next(history: &[PivotRow], candle: &Candle) -> PivotRow {
        let mut row = PivotRow::from_candle(candle);

        let pivot_at = history.iter().rposition(|r| r.pivot.is_some());
        let window: Vec<&PivotRow> = history[pivot_at.unwrap_or(0)..]
            .iter()
            .chain(std::iter::once(&row))
            .collect();

        if window.len() < 3 {
            return row;
        }

        let last_kind = pivot_at
            .and_then(|i| history[i].pivot.as_ref())
            .map(|p| p.kind);

        let pivot = match last_kind {
            Some(kind) => find(&window, kind.opposite()),
            None => find(&window, PivotKind::High).or_else(|| find(&window, PivotKind::Low)),
        };

        if let Some(pivot) = &pivot {
            tracing::debug!(
                symbol = %candle.symbol,
                "Small pivot {:?} anchored at {} confirmed at {}",
                pivot.kind,
                pivot.anchor,
                candle.timestamp
            );
        }

        row.pivot = pivot;
        row
    }
}

#[async_trait]
impl Formula for StructuralPivot {
    type Row = PivotRow;

    async fn bootstrap(&self, input: &FormulaInput<'_>) -> Result<PivotRow> {
        let candle = input.feed.latest(input.candle_time).await?;
        Ok(PivotRow::from_candle(&candle))
    }

    async fn step(&self, _prev: &PivotRow, history: &[PivotRow], input: &FormulaInput<'_>) -> Result<PivotRow> {
        let candle = input.feed.latest(input.candle_time).await?;
        Ok(Self::next(history, &candle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{at, candle, context, minute_candles};
    use crate::indicators::{Indicator, IndicatorConfig, IndicatorEngine};

    fn feed(closes: &[(f64, f64, f64)]) -> Vec<PivotRow> {
        let mut rows: Vec<PivotRow> = Vec::new();
        for (i, &(high, low, close)) in closes.iter().enumerate() {
            let c = candle(at(9, 15 + i as u32), close, high, low, close);
            let row = StructuralPivot::next(&rows, &c);
            rows.push(row);
        }
        rows
    }

    #[test]
    fn test_needs_three_bars() {
        let rows = feed(&[(10.0, 9.0, 9.5), (9.5, 8.5, 9.0)]);
        assert!(rows.iter().all(|r| r.pivot.is_none()));
    }

    #[test]
    fn test_pivot_high_then_low_alternate() {
        let rows = feed(&[
            (10.0, 9.0, 9.8),  // anchor of the SPH
            (9.7, 8.8, 9.2),   // lower close and low
            (9.6, 8.7, 9.0),   // second confirmation
            (9.4, 8.2, 8.5),   // anchor of the SPL
            (9.5, 8.4, 8.8),   // higher close and high
            (9.8, 8.9, 9.6),   // second confirmation
            (9.9, 9.0, 9.7),
        ]);

        let sph = rows[2].pivot.as_ref().unwrap();
        assert_eq!(sph.kind, PivotKind::High);
        assert_eq!(sph.anchor, at(9, 15));
        assert_eq!(sph.close, 9.8);

        let spl = rows[5].pivot.as_ref().unwrap();
        assert_eq!(spl.kind, PivotKind::Low);
        assert_eq!(spl.anchor, at(9, 18));

        assert!(rows[3].pivot.is_none());
        assert!(rows[4].pivot.is_none());
        assert!(rows[6].pivot.is_none());

        assert_eq!(last_pivot(&rows, PivotKind::High).map(|p| p.close), Some(9.8));
        assert_eq!(last_pivot(&rows, PivotKind::Low).map(|p| p.close), Some(8.5));
    }

    #[test]
    fn test_pivot_kind_is_not_repeated() {
        let rows = feed(&[
            (10.0, 9.0, 9.8),
            (9.7, 8.8, 9.2),
            (9.6, 8.7, 9.0), // SPH confirmed
            (9.5, 8.6, 8.9),
            (9.4, 8.5, 8.8),
            (9.3, 8.4, 8.7),
        ]);

        assert_eq!(rows[2].pivot.as_ref().map(|p| p.kind), Some(PivotKind::High));
        // only a low may follow a high
        assert!(rows[3..].iter().all(|r| r.pivot.is_none()));
    }

    #[test]
    fn test_pivot_low_found_first_when_no_high() {
        let rows = feed(&[(10.0, 9.0, 9.2), (10.5, 9.5, 10.2), (10.8, 9.8, 10.5)]);
        let pivot = rows[2].pivot.as_ref().unwrap();
        assert_eq!(pivot.kind, PivotKind::Low);
        assert_eq!(pivot.anchor, at(9, 15));
    }

    #[tokio::test]
    async fn test_engine_appends_pivots() {
        let candles = minute_candles(&[
            (9.8, 10.0, 9.0, 9.8),
            (9.2, 9.7, 8.8, 9.2),
            (9.0, 9.6, 8.7, 9.0),
            (8.5, 9.4, 8.2, 8.5),
        ]);
        let (ctx, _) = context(candles);
        let mut engine = IndicatorEngine::open(
            "structural_pivot",
            StructuralPivot,
            IndicatorConfig::new("IEX", 1, 1),
            &ctx,
        )
        .await
        .unwrap();

        for m in 16..=19 {
            engine.refresh(at(9, m)).await.unwrap();
        }

        let handle = engine.handle();
        let series = handle.read().await;
        assert_eq!(series.len(), 4);
        assert_eq!(
            last_pivot(series.all(), PivotKind::High).map(|p| p.anchor),
            Some(at(9, 15))
        );
    }
}
