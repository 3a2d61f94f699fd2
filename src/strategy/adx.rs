use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::{last_two, Strategy, StrategyContext, StrategyCore};
use crate::indicators::{Adx, AdxRow, Dx, IndicatorEngine, SeriesHandle, TrueRange};
use crate::models::Side;
use crate::Result;

/// ADX level from which a trend counts as established
pub const TREND_STRENGTH: f64 = 25.0;

/// Stop-and-reverse on a +DI / -DI crossover while the ADX shows a strong trend
pub struct AdxStrategy {
    core: StrategyCore,
    adx: SeriesHandle<AdxRow>,
}

impl AdxStrategy {
    pub const NAME: &'static str = "Adx";

    pub async fn new(symbol: &str, interval: u32, lookback: usize, ctx: &StrategyContext) -> Result<Self> {
        let indicators = ctx.indicator_context(Self::NAME);
        let config = ctx.indicator_config(symbol, interval, lookback);

        let tr = IndicatorEngine::open("true_range", TrueRange, config.clone(), &indicators).await?;
        let dx = IndicatorEngine::open("dx", Dx::new(tr.handle()), config.clone(), &indicators).await?;
        let adx = IndicatorEngine::open("adx", Adx::new(dx.handle()), config, &indicators).await?;
        let handle = adx.handle();

        Ok(Self {
            core: StrategyCore::new(
                Self::NAME,
                vec![Box::new(tr), Box::new(dx), Box::new(adx)],
                ctx.book(symbol),
            ),
            adx: handle,
        })
    }
}

/// Side signalled by a directional crossover between two rows
fn crossover(prev: &AdxRow, current: &AdxRow) -> Option<Side> {
    if current.adx < TREND_STRENGTH {
        return None;
    }

    if prev.plus_di <= prev.minus_di && current.plus_di > current.minus_di {
        Some(Side::Long)
    } else if prev.plus_di >= prev.minus_di && current.plus_di < current.minus_di {
        Some(Side::Short)
    } else {
        None
    }
}

#[async_trait]
impl Strategy for AdxStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    async fn decide(&mut self, candle_time: NaiveDateTime) -> Result<()> {
        let (prev, current) = last_two(&self.adx, candle_time).await?;
        let Some(side) = crossover(&prev, &current) else {
            return Ok(());
        };

        tracing::info!(
            symbol = self.symbol(),
            "DI crossover to {:?} at {} (adx {:.1}, +DI {}, -DI {})",
            side,
            candle_time,
            current.adx,
            current.plus_di,
            current.minus_di
        );

        let price = current.bar.close;
        let book = self.book_mut();
        match side {
            Side::Long => book.stop_and_reverse_enter_long(candle_time, price).await,
            Side::Short => book.stop_and_reverse_enter_short(candle_time, price).await,
        }
    }
}
