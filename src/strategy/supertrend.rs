use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::{flip, last_two, Strategy, StrategyContext, StrategyCore};
use crate::indicators::supertrend::DEFAULT_MULTIPLIER;
use crate::indicators::{
    AverageTrueRange, IndicatorEngine, SeriesHandle, SuperTrend, SuperTrendBand, SuperTrendRow, TrueRange,
};
use crate::models::Trend;
use crate::Result;

/// Stop-and-reverse whenever the close crosses the SuperTrend line
pub struct SuperTrendStrategy {
    core: StrategyCore,
    line: SeriesHandle<SuperTrendRow>,
}

impl SuperTrendStrategy {
    pub const NAME: &'static str = "SuperTrend";

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
        let band = IndicatorEngine::open(
            "super_trend_band",
            SuperTrendBand::new(atr.handle(), DEFAULT_MULTIPLIER),
            config.clone(),
            &indicators,
        )
        .await?;
        let line = IndicatorEngine::open("super_trend", SuperTrend::new(band.handle()), config, &indicators).await?;
        let handle = line.handle();

        Ok(Self {
            core: StrategyCore::new(
                Self::NAME,
                vec![Box::new(tr), Box::new(atr), Box::new(band), Box::new(line)],
                ctx.book(symbol),
            ),
            line: handle,
        })
    }
}

#[async_trait]
impl Strategy for SuperTrendStrategy {
    fn core(&self) -> &StrategyCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut StrategyCore {
        &mut self.core
    }

    async fn decide(&mut self, candle_time: NaiveDateTime) -> Result<()> {
        let (prev, current) = last_two(&self.line, candle_time).await?;
        let Some(trend) = flip(prev.trend, current.trend) else {
            return Ok(());
        };

        tracing::info!(
            symbol = self.symbol(),
            "SuperTrend turned {:?} at {} (line {:.2})",
            trend,
            candle_time,
            current.supertrend
        );

        let price = current.bar.close;
        let book = self.book_mut();
        match trend {
            Trend::Green => book.stop_and_reverse_enter_long(candle_time, price).await,
            Trend::Red => book.stop_and_reverse_enter_short(candle_time, price).await,
        }
    }
}
