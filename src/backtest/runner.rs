use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::backtest::metrics::BacktestResults;
use crate::calendar::TradingCalendar;
use crate::config::RunConfig;
use crate::data::MarketData;
use crate::error::TradingError;
use crate::execution::{AutoSquareOff, BacktestLedger};
use crate::indicators::IndicatorContext;
use crate::models::Mode;
use crate::persistence::IndicatorStore;
use crate::strategy::{StrategyContext, StrategyFactory};
use crate::workers::{Scheduler, SimulatedClock, SquareOffWorker, StrategyOutcome, StrategyWorker};
use crate::Result;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum RunStatus {
    Completed,
    /// The day was not run, or a worker aborted
    Failed(String),
}

/// Outcome of one simulated session
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    pub date: NaiveDate,
    pub status: RunStatus,
    pub results: Option<BacktestResults>,
    pub strategies: Vec<StrategyOutcome>,
}

impl BacktestReport {
    fn failed(date: NaiveDate, reason: impl Into<String>) -> Self {
        Self {
            date,
            status: RunStatus::Failed(reason.into()),
            results: None,
            strategies: Vec::new(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Replays whole sessions from stored candles.
///
/// Every configured strategy gets its own worker on a simulated clock. All of them
/// share one ledger, which is squared off once every worker has finished.
pub struct BacktestRunner {
    config: RunConfig,
    calendar: Arc<TradingCalendar>,
    market_data: Arc<dyn MarketData>,
    store: Arc<dyn IndicatorStore>,
}

impl BacktestRunner {
    pub fn new(
        config: RunConfig,
        market_data: Arc<dyn MarketData>,
        store: Arc<dyn IndicatorStore>,
    ) -> Result<Self> {
        config.validate()?;
        let calendar = Arc::new(config.calendar()?);
        Ok(Self {
            config,
            calendar,
            market_data,
            store,
        })
    }

    /// Run the `days` trading days before `reference`, oldest first, keeping the days
    /// that completed. Persisted indicator rows carry forward from one day to the next.
    pub async fn run_range(&self, days: usize, reference: NaiveDateTime) -> Result<Vec<BacktestReport>> {
        let mut reports = Vec::new();

        for open in self.calendar.n_previous_trading_days(days, reference).into_iter().rev() {
            let report = self.run_day(open.date()).await?;
            match &report.status {
                RunStatus::Completed => reports.push(report),
                RunStatus::Failed(reason) => {
                    tracing::warn!("Dropping {} from the range: {}", report.date, reason);
                }
            }
        }

        tracing::info!("{} of {} day(s) completed", reports.len(), days);
        Ok(reports)
    }

    pub async fn run_day(&self, date: NaiveDate) -> Result<BacktestReport> {
        if !self.calendar.is_trading_day(date) {
            return Ok(BacktestReport::failed(date, "not a trading day"));
        }
        if let Err(e) = self.check_availability(date).await {
            tracing::warn!("Skipping {}: {}", date, e);
            return Ok(BacktestReport::failed(date, e.to_string()));
        }

        let (open, _) = self.calendar.session(date);
        let close = self.calendar.close();
        let square_off_at = self.config.square_off_time(Mode::Backtest)?;
        tracing::info!("Backtesting {} with {} strategies", date, self.config.strategies.len());

        let ledger = Arc::new(BacktestLedger::new(self.config.sizing));
        let indicators = IndicatorContext {
            strategy: String::new(),
            calendar: self.calendar.clone(),
            market_data: self.market_data.clone(),
            store: self.store.clone(),
        };
        let ctx = StrategyContext::from_config(&self.config, indicators, ledger.clone());
        let strategies = StrategyFactory::new(ctx).build_all(&self.config.strategies).await?;

        let handles: Vec<_> = strategies
            .into_iter()
            .map(|strategy| {
                StrategyWorker::new(strategy)
                    .decide_until(square_off_at)
                    .spawn(SimulatedClock::new(open), close)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = handle
                .await
                .map_err(|e| TradingError::Store(format!("strategy worker panicked: {}", e)))?;
            outcomes.push(outcome);
        }

        let square_off = AutoSquareOff::new(ledger.clone(), self.market_data.clone());
        let mut worker = SquareOffWorker::new(square_off, square_off_at);
        Scheduler::new(SimulatedClock::new(date.and_time(square_off_at)), close)
            .run(&mut worker)
            .await?;
        if let Some(report) = worker.report() {
            outcomes.iter_mut().for_each(|o| o.settle(report));
        }

        let results = ledger.results()?;
        let status = match outcomes.iter().find_map(|o| o.error.clone()) {
            Some(error) => RunStatus::Failed(error),
            None => RunStatus::Completed,
        };

        tracing::info!(
            "Backtest of {} done: {} trades, net income {:.2}",
            date,
            results.total_trades,
            results.net_income
        );

        Ok(BacktestReport {
            date,
            status,
            results: Some(results),
            strategies: outcomes,
        })
    }

    /// Every traded symbol needs candles inside the session
    async fn check_availability(&self, date: NaiveDate) -> Result<()> {
        let (open, close) = self.calendar.session(date);
        let symbols: BTreeSet<&str> = self.config.strategies.iter().map(|s| s.symbol.as_str()).collect();

        for symbol in symbols {
            let candles = self
                .market_data
                .minute_candles(symbol, open, close + Duration::minutes(1))
                .await?;
            if candles.is_empty() {
                return Err(TradingError::DataNotAvailable(format!(
                    "no candles for {} on {}",
                    symbol, date
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{MarketScenario, SyntheticDataGenerator};
    use crate::config::{StrategyKind, StrategySpec};
    use crate::data::MemoryMarketData;
    use crate::indicators::test_support::minute_candles;
    use crate::persistence::MemoryIndicatorStore;

    fn config() -> RunConfig {
        RunConfig {
            strategies: vec![StrategySpec::new(StrategyKind::ParabolicSar, "IEX", 3)],
            ..RunConfig::default()
        }
    }

    fn runner(market_data: MemoryMarketData) -> BacktestRunner {
        BacktestRunner::new(config(), Arc::new(market_data), Arc::new(MemoryIndicatorStore::new())).unwrap()
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 12, d).unwrap()
    }

    #[tokio::test]
    async fn test_weekend_is_not_run() {
        let report = runner(MemoryMarketData::new()).run_day(date(4)).await.unwrap();

        assert_eq!(report.status, RunStatus::Failed("not a trading day".into()));
        assert!(report.strategies.is_empty());
    }

    #[tokio::test]
    async fn test_missing_candles_fail_the_day() {
        let report = runner(MemoryMarketData::new()).run_day(date(3)).await.unwrap();

        assert!(!report.is_completed());
        assert!(report.results.is_none());
    }

    #[tokio::test]
    async fn test_completed_day_ends_flat() {
        let market_data = MemoryMarketData::new();
        market_data
            .insert_candles(minute_candles(&[(100.0, 100.5, 99.5, 100.0); 30]))
            .unwrap();

        let report = runner(market_data).run_day(date(3)).await.unwrap();

        assert!(report.is_completed());
        assert_eq!(report.strategies.len(), 1);
        assert_eq!(report.strategies[0].error, None);
        // results are only produced for a flat ledger
        let results = report.results.unwrap();
        assert_eq!(results.total_orders, results.total_trades * 2);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let build = |config: RunConfig| {
            BacktestRunner::new(
                config,
                Arc::new(MemoryMarketData::new()),
                Arc::new(MemoryIndicatorStore::new()),
            )
        };

        // 375 session minutes are not a multiple of 7
        let mut uneven = config();
        uneven.strategies[0].interval = 7;
        assert!(matches!(build(uneven), Err(TradingError::Config(_))));

        let mut mtf = config();
        mtf.strategies[0].kind = StrategyKind::ParabolicSarMtf;
        assert!(matches!(build(mtf), Err(TradingError::Config(_))));

        let mut inverted = config();
        inverted.strategies[0].kind = StrategyKind::ParabolicSarMtf;
        inverted.strategies[0].major_interval = Some(1);
        assert!(matches!(build(inverted), Err(TradingError::Config(_))));
    }

    #[tokio::test]
    async fn test_stored_rows_carry_across_days_in_either_order() {
        let market_data = MemoryMarketData::new();
        let mut generator = SyntheticDataGenerator::new(7);
        for d in [2, 3] {
            let open = date(d).and_hms_opt(9, 15, 0).unwrap();
            market_data
                .insert_candles(generator.generate(MarketScenario::RiseThenFall, "IEX", open, 375))
                .unwrap();
        }
        let config = config();
        assert!(!config.persistence.stateless);
        let runner = BacktestRunner::new(config, Arc::new(market_data), Arc::new(MemoryIndicatorStore::new()))
            .unwrap();

        // the later session leaves its rows in the store before the earlier one runs
        let later = runner.run_day(date(3)).await.unwrap();
        assert_eq!(later.status, RunStatus::Completed);
        let earlier = runner.run_day(date(2)).await.unwrap();
        assert_eq!(earlier.status, RunStatus::Completed);

        let reference = date(6).and_hms_opt(9, 15, 0).unwrap();
        let reports = runner.run_range(2, reference).await.unwrap();
        let dates: Vec<_> = reports.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![date(2), date(3)]);
    }

    #[tokio::test]
    async fn test_range_keeps_completed_days() {
        let market_data = MemoryMarketData::new();
        market_data
            .insert_candles(minute_candles(&[(100.0, 100.5, 99.5, 100.0); 30]))
            .unwrap();
        let reference = date(6).and_hms_opt(9, 15, 0).unwrap();

        // Friday 3rd has candles, Thursday 2nd does not
        let reports = runner(market_data).run_range(2, reference).await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].date, date(3));
    }
}
