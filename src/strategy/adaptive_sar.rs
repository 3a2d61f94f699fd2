use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::{flip, last_two, Strategy, StrategyContext, StrategyCore};
use crate::indicators::{
    AdaptiveSar, AdaptiveSarRow, AverageTrueRange, IndicatorEngine, SeriesHandle, TrueRange,
};
use crate::models::Trend;
use crate::Result;

/// Enters on every Adaptive SAR flip, protected by a stop at the new SAR
pub struct AdaptiveSarStrategy {
    core: StrategyCore,
    sar: SeriesHandle<AdaptiveSarRow>,
}

impl AdaptiveSarStrategy {
    pub const NAME: &'static str = "AdaptiveSar";

    pub async fn new(symbol: &str, interval: u32, lookback: usize, ctx: &StrategyContext) -> Result<Self> {
        let indicators = ctx.indicator_context(Self::NAME);
        let config = ctx.indicator_config(symbol, interval, lookback);

        let tr = IndicatorEngine::open("true_range", TrueRange, config.clone(), &indicators).await?;
        let atr = IndicatorEngine::open(
            "average_true_range",
            AverageTrueRange::new(tr.handle()),
            config.clone(),
            &indicators,
        )
        .await?;
        let sar = IndicatorEngine::open("adaptive_sar", AdaptiveSar::new(atr.handle()), config, &indicators).await?;
        let handle = sar.handle();

        Ok(Self {
            core: StrategyCore::new(
                Self::NAME,
                vec![Box::new(tr), Box::new(atr), Box::new(sar)],
                ctx.book(symbol),
            ),
            sar: handle,
        })
    }
}

#[async_trait]
impl Strategy for AdaptiveSarStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    async fn decide(&mut self, candle_time: NaiveDateTime) -> Result<()> {
        let (prev, current) = last_two(&self.sar, candle_time).await?;
        let Some(trend) = flip(prev.trend, current.trend) else {
            return Ok(());
        };

        // a flip skipped earlier (NoCash) can leave the book already there
        if self.book().side() == Some(trend.side()) {
            return Ok(());
        }

        tracing::info!(
            symbol = self.symbol(),
            "Adaptive SAR flipped {:?} at {}, stop at {:.2}",
            trend,
            candle_time,
            current.sar
        );

        let price = current.bar.close;
        let book = self.book_mut();
        match trend {
            Trend::Green => book.enter_long(candle_time, price, Some(current.sar)).await,
            Trend::Red => book.enter_short(candle_time, price, Some(current.sar)).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::Orders;
    use crate::config::SizingConfig;
    use crate::indicators::test_support::at;
    use crate::models::{Action, Side};
    use crate::strategy::test_support::{rally_then_crash, strategy_context};

    async fn run_until(strategy: &mut AdaptiveSarStrategy, last_minute: u32) {
        for m in 17..=last_minute {
            let t = at(9, m);
            if strategy.refresh_indicators(t).await.is_ok() {
                let _ = strategy.decide(t).await;
            }
        }
    }

    #[tokio::test]
    async fn test_long_with_stop_in_rally() {
        let (ctx, ledger) = strategy_context(rally_then_crash(), SizingConfig::default());
        let mut strategy = AdaptiveSarStrategy::new("IEX", 1, 3, &ctx).await.unwrap();

        run_until(&mut strategy, 31).await;

        assert_eq!(strategy.book().side(), Some(Side::Long));
        let orders = ledger.orders().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].time, at(9, 24));
        assert_eq!(orders[0].price, 106.0);

        let pending = ledger.pending_orders().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action, Action::Sell);
        assert_eq!(pending[0].trigger_price, 99.0);
    }

    #[tokio::test]
    async fn test_crash_reverses_and_moves_stop() {
        let (ctx, ledger) = strategy_context(rally_then_crash(), SizingConfig::default());
        let mut strategy = AdaptiveSarStrategy::new("IEX", 1, 3, &ctx).await.unwrap();

        run_until(&mut strategy, 32).await;

        assert_eq!(strategy.book().side(), Some(Side::Short));
        let actions: Vec<Action> = ledger.orders().unwrap().iter().map(|o| o.action).collect();
        assert_eq!(actions, vec![Action::Buy, Action::Sell, Action::Sell]);

        // the long's stop was cancelled, the short has its own
        let pending = ledger.pending_orders().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action, Action::Buy);
        assert!(pending[0].trigger_price > 91.0);
    }
}
