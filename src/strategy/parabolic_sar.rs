use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::{last_two, Strategy, StrategyContext, StrategyCore};
use crate::indicators::{IndicatorEngine, ParabolicSar, SarRow, SeriesHandle};
use crate::models::Trend;
use crate::Result;

/// Stop-and-reverse on every Parabolic SAR trend change
pub struct ParabolicSarStrategy {
    core: StrategyCore,
    sar: SeriesHandle<SarRow>,
    /// Trend the book was last aligned with
    last_signal: Option<Trend>,
}

impl ParabolicSarStrategy {
    pub const NAME: &'static str = "ParabolicSar";

    pub async fn new(symbol: &str, interval: u32, lookback: usize, ctx: &StrategyContext) -> Result<Self> {
        let indicators = ctx.indicator_context(Self::NAME);
        let config = ctx.indicator_config(symbol, interval, lookback);

        let sar = IndicatorEngine::open("parabolic_sar", ParabolicSar::new(ctx.sar), config, &indicators).await?;
        let handle = sar.handle();

        Ok(Self {
            core: StrategyCore::new(Self::NAME, vec![Box::new(sar)], ctx.book(symbol)),
            sar: handle,
            last_signal: None,
        })
    }
}

#[async_trait]
impl Strategy for ParabolicSarStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    async fn decide(&mut self, candle_time: NaiveDateTime) -> Result<()> {
        let (_, current) = last_two(&self.sar, candle_time).await?;

        if self.last_signal == Some(current.trend) {
            return Ok(());
        }

        let price = current.bar.close;
        tracing::info!(
            symbol = self.symbol(),
            "SAR turned {:?} at {} (sar {:.2}, close {:.2})",
            current.trend,
            candle_time,
            current.sar,
            price
        );

        let book = self.book_mut();
        match current.trend {
            Trend::Green => book.stop_and_reverse_enter_long(candle_time, price).await?,
            Trend::Red => book.stop_and_reverse_enter_short(candle_time, price).await?,
        }

        // Only after the book accepted the signal, so a NoCash tick retries it
        self.last_signal = Some(current.trend);
        Ok(())
    }
}
