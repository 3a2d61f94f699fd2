use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::{flip, last_two, Strategy, StrategyContext, StrategyCore};
use crate::indicators::{IndicatorEngine, ParabolicSar, SarRow, SeriesHandle};
use crate::models::{Side, Trend};
use crate::Result;

/// Parabolic SAR on two timeframes.
///
/// A flip of the major SAR reverses the book. Between major flips, a minor flip
/// into the major trend enters early when not already on that side.
pub struct ParabolicSarMtfStrategy {
    core: StrategyCore,
    minor: SeriesHandle<SarRow>,
    major: SeriesHandle<SarRow>,
}

impl ParabolicSarMtfStrategy {
    pub const NAME: &'static str = "ParabolicSarMtf";

    pub async fn new(
        symbol: &str,
        minor_interval: u32,
        major_interval: u32,
        lookback: usize,
        ctx: &StrategyContext,
    ) -> Result<Self> {
        let indicators = ctx.indicator_context(Self::NAME);
        let formula = ParabolicSar::new(ctx.sar);

        let minor = IndicatorEngine::open(
            "parabolic_sar",
            formula,
            ctx.indicator_config(symbol, minor_interval, lookback),
            &indicators,
        )
        .await?;
        let major = IndicatorEngine::open(
            "parabolic_sar",
            formula,
            ctx.indicator_config(symbol, major_interval, lookback),
            &indicators,
        )
        .await?;

        let (minor_handle, major_handle) = (minor.handle(), major.handle());

        Ok(Self {
            core: StrategyCore::new(Self::NAME, vec![Box::new(minor), Box::new(major)], ctx.book(symbol)),
            minor: minor_handle,
            major: major_handle,
        })
    }
}

/// Side the book should move to, if any.
///
/// `major` holds up to the last two major rows' trends, oldest first; it may be
/// shorter right after start.
fn signal(minor_prev: Trend, minor: Trend, major: &[Trend], side: Option<Side>) -> Option<Side> {
    if let [prev, current] = major {
        if let Some(trend) = flip(*prev, *current) {
            return Some(trend.side());
        }
    }

    let major_trend = major.last()?;
    match flip(minor_prev, minor) {
        Some(trend) if trend == *major_trend && side != Some(trend.side()) => Some(trend.side()),
        _ => None,
    }
}

#[async_trait]
impl Strategy for ParabolicSarMtfStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    async fn decide(&mut self, candle_time: NaiveDateTime) -> Result<()> {
        let (minor_prev, minor) = last_two(&self.minor, candle_time).await?;
        // the major row only changes at major boundaries
        let major: Vec<Trend> = self
            .major
            .read()
            .await
            .lines_unsafe(2)
            .iter()
            .map(|r| r.trend)
            .collect();

        let Some(side) = signal(minor_prev.trend, minor.trend, &major, self.book().side()) else {
            return Ok(());
        };

        let price = minor.bar.close;
        tracing::info!(
            symbol = self.symbol(),
            "Moving {:?} at {} (minor {:?}, major {:?})",
            side,
            candle_time,
            minor.trend,
            major.last()
        );

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
    use Trend::{Green, Red};

    #[test]
    fn test_major_flip_wins() {
        assert_eq!(signal(Green, Green, &[Green, Red], None), Some(Side::Short));
        assert_eq!(signal(Red, Green, &[Green, Red], Some(Side::Long)), Some(Side::Short));
        assert_eq!(signal(Green, Green, &[Red, Green], Some(Side::Short)), Some(Side::Long));
    }

    #[test]
    fn test_minor_flip_into_major_trend_enters() {
        assert_eq!(signal(Red, Green, &[Green, Green], None), Some(Side::Long));
        assert_eq!(signal(Green, Red, &[Red], None), Some(Side::Short));
        // already there
        assert_eq!(signal(Red, Green, &[Green, Green], Some(Side::Long)), None);
    }

    #[test]
    fn test_minor_flip_against_major_is_ignored() {
        assert_eq!(signal(Green, Red, &[Green, Green], None), None);
        assert_eq!(signal(Green, Green, &[Red, Red], None), None);
        assert_eq!(signal(Red, Green, &[], None), None);
    }

    #[tokio::test]
    async fn test_major_reversal_goes_short() {
        let candles = minute_candles(&[
            (100.0, 101.0, 99.5, 100.5),
            (100.5, 101.5, 100.0, 101.0),
            (101.0, 102.0, 100.5, 101.5),
            (101.5, 103.0, 101.0, 102.5),
            (102.5, 104.0, 102.0, 103.5),
            (103.5, 105.0, 103.0, 104.5),
            (104.5, 106.0, 104.0, 105.5),
            (105.5, 107.0, 105.0, 106.5),
            (106.5, 107.5, 105.5, 106.0),
            (106.0, 106.0, 95.0, 96.0),
            (96.0, 97.0, 94.0, 95.0),
            (95.0, 96.0, 93.0, 94.0),
        ]);
        let (ctx, ledger) = strategy_context(
            candles,
            SizingConfig {
                leverage: 1.0,
                order_pct: 0.9,
                cash: 10_000.0,
            },
        );
        let mut strategy = ParabolicSarMtfStrategy::new("IEX", 1, 3, 2, &ctx).await.unwrap();

        for m in 17..=27 {
            let t = at(9, m);
            if strategy.refresh_indicators(t).await.is_ok() {
                let _ = strategy.decide(t).await;
            }
        }

        // the minor flip to red at 09:25 disagrees with the green major and is skipped
        let orders = ledger.orders().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].action, Action::Sell);
        assert_eq!(orders[0].time, at(9, 27));
        assert_eq!(orders[0].price, 94.0);
        assert_eq!(orders[0].quantity, 95);
    }
}
