use anyhow::{bail, Context};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use intraday::api::{ConfigSessionProvider, KiteClient, SessionProvider};
use intraday::backtest::{BacktestReport, BacktestRunner, MarketScenario, SyntheticDataGenerator};
use intraday::data::{MarketData, MemoryMarketData, PostgresMarketData};
use intraday::execution::LiveOrders;
use intraday::persistence::{IndicatorStore, MemoryIndicatorStore, RedisIndicatorStore};
use intraday::workers::LiveRunner;
use intraday::RunConfig;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "intraday", about = "Intraday indicator strategies with auto square-off")]
struct Cli {
    /// Configuration file (defaults to config/intraday.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay past sessions against the simulated ledger
    Backtest {
        /// Single day to replay
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Number of trading days before today to replay
        #[arg(long, default_value_t = 1)]
        days: usize,
        /// Generate candles instead of reading the market data store
        #[arg(long)]
        synthetic: Option<Scenario>,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Trade today's session through the broker
    Trade,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Scenario {
    Uptrend,
    Downtrend,
    RiseThenFall,
    Sideways,
}

impl From<Scenario> for MarketScenario {
    fn from(scenario: Scenario) -> Self {
        match scenario {
            Scenario::Uptrend => MarketScenario::Uptrend,
            Scenario::Downtrend => MarketScenario::Downtrend,
            Scenario::RiseThenFall => MarketScenario::RiseThenFall,
            Scenario::Sideways => MarketScenario::Sideways,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let config = RunConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if config.strategies.is_empty() {
        bail!("no strategies configured");
    }

    match cli.command {
        Command::Backtest {
            date,
            days,
            synthetic,
            seed,
        } => backtest(config, date, days, synthetic, seed).await,
        Command::Trade => trade(config).await,
    }
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("intraday=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn backtest(
    config: RunConfig,
    date: Option<NaiveDate>,
    days: usize,
    synthetic: Option<Scenario>,
    seed: u64,
) -> anyhow::Result<()> {
    let calendar = config.calendar()?;
    let now = Local::now().naive_local();
    let dates: Vec<NaiveDate> = match date {
        Some(date) => vec![date],
        None => calendar
            .n_previous_trading_days(days, now)
            .into_iter()
            .map(|open| open.date())
            .collect(),
    };

    let market_data: Arc<dyn MarketData> = match synthetic {
        Some(scenario) => Arc::new(synthetic_market_data(&config, &dates, scenario.into(), seed)?),
        None => connect_market_data(&config).await,
    };
    let store = connect_indicator_store(&config).await;
    let runner = BacktestRunner::new(config, market_data, store)?;

    let reports = match date {
        Some(date) => vec![runner.run_day(date).await?],
        None => runner.run_range(days, now).await?,
    };

    let mut total = 0.0;
    for report in &reports {
        print_report(report);
        total += report.results.as_ref().map_or(0.0, |r| r.net_income);
    }
    println!("\nNet income over {} day(s): {:.2}", reports.len(), total);

    Ok(())
}

async fn trade(config: RunConfig) -> anyhow::Result<()> {
    let session = ConfigSessionProvider::new(config.broker.clone())
        .authorized_session()
        .await?;
    let client = KiteClient::new(&config.broker, session)?;

    let instruments = client.instruments().await.context("failed to load instruments")?;
    for spec in &config.strategies {
        if instruments.token(&spec.symbol).is_none() {
            bail!("{} is not listed on {}", spec.symbol, instruments.exchange());
        }
    }
    tracing::info!("Loaded {} instruments", instruments.len());

    let orders = Arc::new(LiveOrders::new(Arc::new(client), config.sizing, config.retry));
    let market_data = connect_market_data(&config).await;
    let store = connect_indicator_store(&config).await;

    let outcomes = LiveRunner::new(config, market_data, store, orders)?.run().await?;
    for outcome in &outcomes {
        match &outcome.error {
            Some(error) => println!("{} {}: aborted: {}", outcome.strategy, outcome.symbol, error),
            None => println!(
                "{} {}: net income {:.2}",
                outcome.strategy, outcome.symbol, outcome.net_income
            ),
        }
    }

    Ok(())
}

/// One synthetic session per date for every configured symbol
fn synthetic_market_data(
    config: &RunConfig,
    dates: &[NaiveDate],
    scenario: MarketScenario,
    seed: u64,
) -> anyhow::Result<MemoryMarketData> {
    let calendar = config.calendar()?;
    let minutes = calendar.session_minutes() as usize;
    let symbols: BTreeSet<&str> = config.strategies.iter().map(|s| s.symbol.as_str()).collect();
    let market_data = MemoryMarketData::new();
    let mut generator = SyntheticDataGenerator::new(seed);

    for date in dates {
        let (open, _) = calendar.session(*date);
        for symbol in &symbols {
            market_data.insert_candles(generator.generate(scenario, symbol, open, minutes))?;
        }
    }

    tracing::info!(
        "Generated {:?} sessions for {} symbol(s) over {} day(s)",
        scenario,
        symbols.len(),
        dates.len()
    );
    Ok(market_data)
}

async fn connect_market_data(config: &RunConfig) -> Arc<dyn MarketData> {
    let Some(url) = config.persistence.database_url.as_deref() else {
        tracing::warn!("No database_url configured, using an empty in-memory market data store");
        return Arc::new(MemoryMarketData::new());
    };

    match PostgresMarketData::new(url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!("Failed to connect to Postgres ({}), using in-memory market data", e);
            Arc::new(MemoryMarketData::new())
        }
    }
}

async fn connect_indicator_store(config: &RunConfig) -> Arc<dyn IndicatorStore> {
    let Some(url) = config.persistence.redis_url.as_deref() else {
        return Arc::new(MemoryIndicatorStore::new());
    };

    match RedisIndicatorStore::new(url, config.retry).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!("Failed to connect to Redis ({}), indicator rows will not survive the run", e);
            Arc::new(MemoryIndicatorStore::new())
        }
    }
}

fn print_report(report: &BacktestReport) {
    match &report.results {
        Some(results) => results.print_report(&format!("Backtest {} ({:?})", report.date, report.status)),
        None => println!("\n=== Backtest {} ({:?}) ===", report.date, report.status),
    }

    for outcome in &report.strategies {
        println!(
            "  {:<16} {:<10} {:>10.2}{}",
            outcome.strategy,
            outcome.symbol,
            outcome.net_income,
            outcome.error.as_deref().map(|e| format!("  ({})", e)).unwrap_or_default()
        );
    }
}
