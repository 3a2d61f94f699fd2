use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::{Strategy, StrategyContext, StrategyCore};
use crate::error::TradingError;
use crate::indicators::structural_pivot::last_pivot;
use crate::indicators::{IndicatorEngine, Pivot, PivotKind, PivotRow, SeriesHandle, StructuralPivot};
use crate::models::Side;
use crate::Result;

/// Breakout of the latest small pivots: a close above the last pivot high goes
/// long, a close below the last pivot low goes short.
pub struct StructuralPivotStrategy {
    core: StrategyCore,
    pivots: SeriesHandle<PivotRow>,
}

impl StructuralPivotStrategy {
    pub const NAME: &'static str = "StructuralPivot";

    pub async fn new(symbol: &str, interval: u32, lookback: usize, ctx: &StrategyContext) -> Result<Self> {
        let indicators = ctx.indicator_context(Self::NAME);
        let config = ctx.indicator_config(symbol, interval, lookback);

        let pivots = IndicatorEngine::open("structural_pivot", StructuralPivot, config, &indicators).await?;
        let handle = pivots.handle();

        Ok(Self {
            core: StrategyCore::new(Self::NAME, vec![Box::new(pivots)], ctx.book(symbol)),
            pivots: handle,
        })
    }
}

/// Side to move to when `close` breaks out of the pivot range
fn breakout(close: f64, sph: Option<&Pivot>, spl: Option<&Pivot>, side: Option<Side>) -> Option<Side> {
    let (sph, spl) = (sph?, spl?);

    if close < spl.close && side != Some(Side::Short) {
        Some(Side::Short)
    } else if close > sph.close && side != Some(Side::Long) {
        Some(Side::Long)
    } else {
        None
    }
}

#[async_trait]
impl Strategy for StructuralPivotStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    async fn decide(&mut self, candle_time: NaiveDateTime) -> Result<()> {
        let signal = {
            let series = self.pivots.read().await;
            let current = series
                .lines(1, candle_time)?
                .pop()
                .ok_or_else(|| TradingError::DataNotAvailable("no pivot row".into()))?;

            let rows = series.all();
            breakout(
                current.bar.close,
                last_pivot(rows, PivotKind::High),
                last_pivot(rows, PivotKind::Low),
                self.book().side(),
            )
            .map(|side| (side, current.bar.close))
        };

        let Some((side, price)) = signal else {
            return Ok(());
        };

        tracing::info!(symbol = self.symbol(), "Pivot breakout {:?} at {} ({:.2})", side, candle_time, price);

        let book = self.book_mut();
        match side {
            Side::Long => book.stop_and_reverse_enter_long(candle_time, price).await,
            Side::Short => book.stop_and_reverse_enter_short(candle_time, price).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizingConfig;
    use crate::indicators::test_support::{at, minute_candles};
    use crate::models::Action;
    use crate::strategy::test_support::strategy_context;

    fn pivot(kind: PivotKind, close: f64) -> Pivot {
        Pivot {
            kind,
            anchor: at(9, 15),
            close,
            high: close + 0.5,
            low: close - 0.5,
        }
    }

    #[test]
    fn test_breakout_needs_both_pivots() {
        let sph = pivot(PivotKind::High, 10.0);
        let spl = pivot(PivotKind::Low, 8.0);

        assert_eq!(breakout(11.0, Some(&sph), None, None), None);
        assert_eq!(breakout(7.0, None, Some(&spl), None), None);
        assert_eq!(breakout(11.0, Some(&sph), Some(&spl), None), Some(Side::Long));
        assert_eq!(breakout(7.0, Some(&sph), Some(&spl), Some(Side::Long)), Some(Side::Short));
        assert_eq!(breakout(9.0, Some(&sph), Some(&spl), None), None);
        assert_eq!(breakout(11.0, Some(&sph), Some(&spl), Some(Side::Long)), None);
    }

    #[tokio::test]
    async fn test_trades_breakouts() {
        // (high, low, close)
        let bars = [
            (10.0, 9.0, 9.8),
            (9.7, 8.8, 9.2),
            (9.6, 8.7, 9.0),
            (9.4, 8.2, 8.5),
            (9.5, 8.4, 8.8),
            (9.8, 8.9, 9.6),
            (9.9, 9.0, 9.7),
            (10.2, 9.6, 10.0),
            (9.9, 7.9, 8.0),
        ];
        let ohlc: Vec<_> = bars.iter().map(|&(h, l, c)| (c, h, l, c)).collect();
        let (ctx, ledger) = strategy_context(minute_candles(&ohlc), SizingConfig::default());
        let mut strategy = StructuralPivotStrategy::new("IEX", 1, 1, &ctx).await.unwrap();

        for m in 16..=24 {
            let t = at(9, m);
            strategy.refresh_indicators(t).await.unwrap();
            strategy.decide(t).await.unwrap();
        }

        let orders = ledger.orders().unwrap();
        let summary: Vec<_> = orders.iter().map(|o| (o.time, o.action, o.price)).collect();
        assert_eq!(
            summary,
            vec![
                (at(9, 23), Action::Buy, 10.0),
                (at(9, 24), Action::Sell, 8.0),
                (at(9, 24), Action::Sell, 8.0),
            ]
        );
        assert_eq!(strategy.book().side(), Some(Side::Short));
    }
}
