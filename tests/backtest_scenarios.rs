use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use intraday::backtest::{BacktestRunner, MarketScenario, RunStatus, SyntheticDataGenerator};
use intraday::config::{SizingConfig, StrategyKind, StrategySpec};
use intraday::data::MemoryMarketData;
use intraday::execution::{AutoSquareOff, BacktestLedger, LedgerEvent, Orders};
use intraday::persistence::MemoryIndicatorStore;
use intraday::workers::{Scheduler, SimulatedClock, SquareOffWorker};
use intraday::{Action, Candle, RunConfig, Side};
use std::sync::Arc;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("intraday=debug"))
        .with_test_writer()
        .try_init()
        .ok();
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 12, 3).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    day().and_hms_opt(h, m, 0).unwrap()
}

fn minute_candles(symbol: &str, ohlc: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
    ohlc.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Candle {
            symbol: symbol.to_string(),
            timestamp: at(9, 15) + Duration::minutes(i as i64),
            open,
            high,
            low,
            close,
            volume: 100.0,
        })
        .collect()
}

/// Ten minutes of steady gains followed by a one-minute collapse
fn rise_then_fall() -> Vec<Candle> {
    minute_candles(
        "IEX",
        &[
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
        ],
    )
}

fn config(strategies: Vec<StrategySpec>, sizing: SizingConfig) -> RunConfig {
    let mut config = RunConfig {
        strategies,
        sizing,
        ..RunConfig::default()
    };
    config.persistence.stateless = true;
    config
}

fn runner(config: RunConfig, market_data: MemoryMarketData) -> BacktestRunner {
    BacktestRunner::new(
        config,
        Arc::new(market_data),
        Arc::new(MemoryIndicatorStore::new()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_parabolic_sar_long_then_short_then_flat() {
    init_logging();
    let market_data = MemoryMarketData::new();
    market_data.insert_candles(rise_then_fall()).unwrap();
    // a single afternoon print the square-off prices against
    market_data
        .insert_candles(vec![Candle {
            symbol: "IEX".into(),
            timestamp: at(15, 0),
            open: 90.0,
            high: 90.0,
            low: 90.0,
            close: 90.0,
            volume: 100.0,
        }])
        .unwrap();

    let sizing = SizingConfig {
        leverage: 1.0,
        order_pct: 0.9,
        cash: 10_000.0,
    };
    let config = config(
        vec![StrategySpec::new(StrategyKind::ParabolicSar, "IEX", 3)],
        sizing,
    );

    let report = runner(config, market_data).run_day(day()).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    let results = report.results.unwrap();
    assert_eq!(results.total_orders, 4);
    assert_eq!(results.trades.len(), 2);

    let long = &results.trades[0];
    assert_eq!(long.side, Side::Long);
    assert_eq!(long.entry_time, at(9, 24));
    assert_eq!(long.quantity, 84);
    assert_eq!(long.entry_price, 106.0);
    assert_eq!(long.exit_price, 96.0);
    assert_eq!(long.net, -840.0);

    let short = &results.trades[1];
    assert_eq!(short.side, Side::Short);
    assert_eq!(short.entry_time, at(9, 27));
    assert_eq!(short.quantity, 93);
    assert_eq!(short.entry_price, 96.0);
    // squared off at the last known close
    assert_eq!(short.exit_time, at(15, 25));
    assert_eq!(short.exit_price, 90.0);
    assert_eq!(short.net, 558.0);

    assert_eq!(results.net_income, -282.0);
    // the strategy's own exit plus its squared-off short
    assert_eq!(report.strategies[0].net_income, -282.0);
    assert_eq!(report.strategies[0].open_position, None);
}

#[tokio::test]
async fn test_day_without_candles_is_not_run() {
    init_logging();
    let config = config(
        vec![StrategySpec::new(StrategyKind::ParabolicSar, "IEX", 3)],
        SizingConfig::default(),
    );

    let report = runner(config, MemoryMarketData::new()).run_day(day()).await.unwrap();

    assert!(matches!(report.status, RunStatus::Failed(_)));
    assert!(report.results.is_none());
    assert!(report.strategies.is_empty());
}

#[tokio::test]
async fn test_square_off_cancels_stops_before_closing() {
    init_logging();
    let ledger = Arc::new(BacktestLedger::new(SizingConfig::default()));
    let buy = ledger.place(at(10, 0), "IEX", Action::Buy, 10, 100.0).await.unwrap();
    let stop = ledger
        .place_stop_loss(at(10, 0), "IEX", Action::Sell, 10, 95.0)
        .await
        .unwrap();

    let square_off = AutoSquareOff::new(ledger.clone(), Arc::new(MemoryMarketData::new()));
    let mut worker = SquareOffWorker::new(square_off, NaiveTime::from_hms_opt(15, 25, 0).unwrap());
    Scheduler::new(SimulatedClock::new(at(15, 0)), NaiveTime::from_hms_opt(15, 30, 0).unwrap())
        .run(&mut worker)
        .await
        .unwrap();

    let journal = ledger.journal().unwrap();
    assert_eq!(journal.len(), 4);
    assert!(matches!(&journal[0], LedgerEvent::Placed { order_id, .. } if *order_id == buy));
    assert!(matches!(&journal[1], LedgerEvent::StopPlaced { order_id, .. } if *order_id == stop));
    assert!(matches!(&journal[2], LedgerEvent::Cancelled { order_id } if *order_id == stop));
    assert!(matches!(
        &journal[3],
        LedgerEvent::Placed { action: Action::Sell, quantity: 10, .. }
    ));
    assert!(ledger.pending_orders().await.unwrap().is_empty());
    assert_eq!(ledger.net_quantity("IEX").unwrap(), 0);
}

#[tokio::test]
async fn test_synthetic_session_ends_flat_for_every_strategy() {
    init_logging();
    let config = config(
        vec![
            StrategySpec::new(StrategyKind::ParabolicSar, "IEX", 3),
            StrategySpec::new(StrategyKind::SuperTrend, "SBIN", 5),
            StrategySpec::new(StrategyKind::AdaptiveSar, "TCS", 3),
            StrategySpec::new(StrategyKind::Adx, "INFY", 5),
            StrategySpec::new(StrategyKind::StructuralPivot, "ITC", 3),
        ],
        SizingConfig::default(),
    );

    let market_data = MemoryMarketData::new();
    let mut generator = SyntheticDataGenerator::new(11);
    for spec in &config.strategies {
        market_data
            .insert_candles(generator.generate(MarketScenario::RiseThenFall, &spec.symbol, at(9, 15), 375))
            .unwrap();
    }

    let report = runner(config, market_data).run_day(day()).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.strategies.len(), 5);
    assert!(report.strategies.iter().all(|o| o.error.is_none()));

    let results = report.results.unwrap();
    assert_eq!(results.total_orders % 2, 0);
    assert!(results.trades.iter().all(|t| t.exit_time <= at(15, 25)));

    let sar_trades: Vec<_> = results.trades.iter().filter(|t| t.symbol == "IEX").collect();
    assert!(sar_trades.iter().any(|t| t.side == Side::Short));
    assert_eq!(sar_trades.last().map(|t| t.exit_time), Some(at(15, 25)));
}

#[tokio::test]
async fn test_range_skips_days_without_data() {
    init_logging();
    let config = config(
        vec![StrategySpec::new(StrategyKind::ParabolicSar, "IEX", 3)],
        SizingConfig::default(),
    );

    let market_data = MemoryMarketData::new();
    let mut generator = SyntheticDataGenerator::new(3);
    // Thursday and Friday; Wednesday stays empty
    for date in [2, 3] {
        let open = NaiveDate::from_ymd_opt(2021, 12, date)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap();
        market_data
            .insert_candles(generator.generate(MarketScenario::Uptrend, "IEX", open, 375))
            .unwrap();
    }

    let reference = NaiveDate::from_ymd_opt(2021, 12, 6)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap();
    let reports = runner(config, market_data).run_range(3, reference).await.unwrap();

    let dates: Vec<_> = reports.iter().map(|r| r.date).collect();
    assert_eq!(
        dates,
        vec![
            NaiveDate::from_ymd_opt(2021, 12, 2).unwrap(),
            NaiveDate::from_ymd_opt(2021, 12, 3).unwrap(),
        ]
    );
    assert!(reports.iter().all(|r| r.is_completed()));
}
