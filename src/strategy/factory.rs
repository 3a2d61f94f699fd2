use super::{
    AdaptiveSarStrategy, AdxStrategy, ParabolicSarMtfStrategy, ParabolicSarStrategy, Strategy, StrategyContext,
    StructuralPivotStrategy, SuperTrendStrategy,
};
use crate::config::{StrategyKind, StrategySpec};
use crate::error::TradingError;
use crate::Result;

/// Builds configured strategies over one shared context
pub struct StrategyFactory {
    ctx: StrategyContext,
}

impl StrategyFactory {
    pub fn new(ctx: StrategyContext) -> Self {
        Self { ctx }
    }

    pub async fn build(&self, spec: &StrategySpec) -> Result<Box<dyn Strategy>> {
        let ctx = &self.ctx;
        let (symbol, interval, lookback) = (spec.symbol.as_str(), spec.interval, spec.lookback());

        let strategy: Box<dyn Strategy> = match spec.kind {
            StrategyKind::ParabolicSar => Box::new(ParabolicSarStrategy::new(symbol, interval, lookback, ctx).await?),
            StrategyKind::ParabolicSarMtf => {
                let major = spec.major_interval.ok_or_else(|| {
                    TradingError::Config(format!("{}: multi-timeframe strategy needs major_interval", symbol))
                })?;
                Box::new(ParabolicSarMtfStrategy::new(symbol, interval, major, lookback, ctx).await?)
            }
            StrategyKind::AdaptiveSar => Box::new(AdaptiveSarStrategy::new(symbol, interval, lookback, ctx).await?),
            StrategyKind::SuperTrend => Box::new(SuperTrendStrategy::new(symbol, interval, lookback, ctx).await?),
            StrategyKind::Adx => Box::new(AdxStrategy::new(symbol, interval, lookback, ctx).await?),
            StrategyKind::StructuralPivot => {
                Box::new(StructuralPivotStrategy::new(symbol, interval, lookback, ctx).await?)
            }
        };

        tracing::info!(
            strategy = strategy.name(),
            symbol,
            "Built strategy with {} indicator(s), slots {:?}",
            strategy.indicators().len(),
            strategy.allowed_time_slots().labels().first()
        );

        Ok(strategy)
    }

    pub async fn build_all(&self, specs: &[StrategySpec]) -> Result<Vec<Box<dyn Strategy>>> {
        let mut strategies = Vec::with_capacity(specs.len());
        for spec in specs {
            strategies.push(self.build(spec).await?);
        }
        Ok(strategies)
    }
}
