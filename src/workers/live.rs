use std::sync::Arc;

use super::{Clock, Scheduler, SquareOffWorker, StrategyOutcome, StrategyWorker, WallClock};
use crate::calendar::TradingCalendar;
use crate::config::RunConfig;
use crate::data::MarketData;
use crate::error::TradingError;
use crate::execution::{AutoSquareOff, Orders};
use crate::indicators::IndicatorContext;
use crate::models::Mode;
use crate::persistence::IndicatorStore;
use crate::strategy::{StrategyContext, StrategyFactory};
use crate::Result;

/// Trades the current session against a live order backend.
///
/// Strategy workers run until the live square-off time. The square-off worker
/// takes over once all of them have stopped and keeps the clock until the close.
pub struct LiveRunner {
    config: RunConfig,
    calendar: Arc<TradingCalendar>,
    market_data: Arc<dyn MarketData>,
    store: Arc<dyn IndicatorStore>,
    orders: Arc<dyn Orders>,
}

impl LiveRunner {
    pub fn new(
        config: RunConfig,
        market_data: Arc<dyn MarketData>,
        store: Arc<dyn IndicatorStore>,
        orders: Arc<dyn Orders>,
    ) -> Result<Self> {
        config.validate()?;
        let calendar = Arc::new(config.calendar()?);
        Ok(Self {
            config,
            calendar,
            market_data,
            store,
            orders,
        })
    }

    /// Run today's session on the wall clock
    pub async fn run(&self) -> Result<Vec<StrategyOutcome>> {
        self.run_with(WallClock).await
    }

    pub async fn run_with<C: Clock + Clone + 'static>(&self, clock: C) -> Result<Vec<StrategyOutcome>> {
        let now = clock.now();
        if !self.calendar.is_trading_day(now.date()) {
            tracing::warn!("{} is not a trading day, nothing to do", now.date());
            return Ok(Vec::new());
        }
        let close = self.calendar.close();
        if now.time() > close {
            return Err(TradingError::OutOfMarketHours(now));
        }

        let square_off_at = self.config.square_off_time(Mode::Live)?;
        let indicators = IndicatorContext {
            strategy: String::new(),
            calendar: self.calendar.clone(),
            market_data: self.market_data.clone(),
            store: self.store.clone(),
        };
        let ctx = StrategyContext::from_config(&self.config, indicators, self.orders.clone());
        let strategies = StrategyFactory::new(ctx).build_all(&self.config.strategies).await?;
        tracing::info!(
            "Trading {} strategies from {}, square-off at {}",
            strategies.len(),
            now,
            square_off_at
        );

        let handles: Vec<_> = strategies
            .into_iter()
            .map(|strategy| {
                StrategyWorker::new(strategy)
                    .decide_until(square_off_at)
                    .spawn(clock.clone(), square_off_at)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = handle
                .await
                .map_err(|e| TradingError::Store(format!("strategy worker panicked: {}", e)))?;
            if let Some(error) = &outcome.error {
                tracing::error!(strategy = %outcome.strategy, symbol = %outcome.symbol, "{}", error);
            }
            outcomes.push(outcome);
        }

        let square_off = AutoSquareOff::new(self.orders.clone(), self.market_data.clone());
        let mut worker = SquareOffWorker::new(square_off, square_off_at);
        Scheduler::new(clock, close).run(&mut worker).await?;
        if let Some(report) = worker.report() {
            outcomes.iter_mut().for_each(|o| o.settle(report));
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SizingConfig, StrategyKind, StrategySpec};
    use crate::data::MemoryMarketData;
    use crate::execution::live::test_support::RecordingBroker;
    use crate::execution::{BacktestLedger, LiveOrders};
    use crate::indicators::test_support::{candle, minute_candles};
    use crate::models::{Action, OpenPosition};
    use crate::persistence::MemoryIndicatorStore;
    use crate::retry::RetryPolicy;
    use crate::workers::SimulatedClock;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 12, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn config() -> RunConfig {
        RunConfig {
            strategies: vec![StrategySpec::new(StrategyKind::ParabolicSar, "IEX", 3)],
            ..RunConfig::default()
        }
    }

    fn runner(broker: Arc<RecordingBroker>) -> LiveRunner {
        let config = config();
        let orders = LiveOrders::new(broker, config.sizing, RetryPolicy::immediate(1));

        LiveRunner::new(
            config,
            Arc::new(MemoryMarketData::new()),
            Arc::new(MemoryIndicatorStore::new()),
            Arc::new(orders),
        )
        .unwrap()
    }

    /// Long from 09:24, reversed short at 09:27, last traded at 90 in the afternoon
    fn rise_then_fall() -> MemoryMarketData {
        let mut candles = minute_candles(&[
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
        ]);
        candles.push(candle(at(3, 15, 0), 90.0, 90.0, 90.0, 90.0));

        let market_data = MemoryMarketData::new();
        market_data.insert_candles(candles).unwrap();
        market_data
    }

    #[tokio::test]
    async fn test_squares_off_open_positions_at_live_time() {
        let broker = Arc::new(RecordingBroker::default());
        *broker.positions.lock().unwrap() = vec![OpenPosition {
            symbol: "IEX".into(),
            quantity: 12,
            average_price: 100.0,
        }];

        let outcomes = runner(broker.clone())
            .run_with(SimulatedClock::new(at(3, 15, 10)))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].error, None);
        assert_eq!(broker.calls(), vec!["Sell IEX 12".to_string()]);
    }

    #[tokio::test]
    async fn test_square_off_runs_after_every_strategy_order() {
        let ledger = Arc::new(BacktestLedger::new(SizingConfig {
            leverage: 1.0,
            order_pct: 0.9,
            cash: 10_000.0,
        }));
        let runner = LiveRunner::new(
            config(),
            Arc::new(rise_then_fall()),
            Arc::new(MemoryIndicatorStore::new()),
            ledger.clone(),
        )
        .unwrap();

        let outcomes = runner.run_with(SimulatedClock::new(at(3, 9, 15))).await.unwrap();

        let orders = ledger.orders().unwrap();
        let times: Vec<_> = orders.iter().map(|o| o.time).collect();
        assert_eq!(times, vec![at(3, 9, 24), at(3, 9, 27), at(3, 9, 27), at(3, 15, 16)]);

        let close = &orders[3];
        assert_eq!((close.action, close.quantity, close.price), (Action::Buy, 93, 90.0));
        assert_eq!(ledger.net_quantity("IEX").unwrap(), 0);

        // long lost 840, the squared-off short made 558
        assert_eq!(outcomes[0].error, None);
        assert_eq!(outcomes[0].net_income, -282.0);
        assert_eq!(outcomes[0].open_position, None);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let orders = Arc::new(BacktestLedger::new(SizingConfig::default()));
        let build = |config: RunConfig| {
            LiveRunner::new(
                config,
                Arc::new(MemoryMarketData::new()),
                Arc::new(MemoryIndicatorStore::new()),
                orders.clone(),
            )
        };

        // 375 session minutes are not a multiple of 7
        let mut uneven = config();
        uneven.strategies[0].interval = 7;
        assert!(matches!(build(uneven), Err(TradingError::Config(_))));

        let mut mtf = config();
        mtf.strategies[0].kind = StrategyKind::ParabolicSarMtf;
        assert!(matches!(build(mtf), Err(TradingError::Config(_))));

        assert!(build(config()).is_ok());
    }

    #[tokio::test]
    async fn test_weekend_does_nothing() {
        let broker = Arc::new(RecordingBroker::default());

        let outcomes = runner(broker.clone())
            .run_with(SimulatedClock::new(at(4, 10, 0)))
            .await
            .unwrap();

        assert!(outcomes.is_empty());
        assert!(broker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_after_close_is_rejected() {
        let result = runner(Arc::new(RecordingBroker::default()))
            .run_with(SimulatedClock::new(at(3, 15, 45)))
            .await;

        assert!(matches!(result, Err(TradingError::OutOfMarketHours(_))));
    }
}
