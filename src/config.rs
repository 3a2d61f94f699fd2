use chrono::{NaiveDate, NaiveTime};
use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::calendar::{default_holidays, TradingCalendar};
use crate::error::TradingError;
use crate::models::Mode;
use crate::retry::RetryPolicy;
use crate::Result;

const DEFAULT_CONFIG_FILE: &str = "config/intraday";
const ENV_PREFIX: &str = "INTRADAY";

/// Run configuration: built-in defaults, then an optional TOML file, then
/// `INTRADAY__SECTION__FIELD` environment overrides.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RunConfig {
    pub mode: Mode,
    pub market: MarketConfig,
    pub sizing: SizingConfig,
    pub retry: RetryPolicy,
    pub scheduler: SchedulerConfig,
    pub persistence: PersistenceConfig,
    pub broker: BrokerConfig,
    pub sar: SarParams,
    pub strategies: Vec<StrategySpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    pub open: String,
    pub close: String,
    pub holidays: Vec<NaiveDate>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            open: "09:15".to_string(),
            close: "15:30".to_string(),
            holidays: default_holidays(),
        }
    }
}

/// Order sizing: `floor(cash * leverage * order_pct / price)`
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct SizingConfig {
    pub leverage: f64,
    pub order_pct: f64,
    /// Notional cash pool of the simulation backend
    pub cash: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            leverage: 5.0,
            order_pct: 0.5,
            cash: 10_000.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// New entries are refused this many minutes before the close
    pub entry_cutoff_minutes: u32,
    pub square_off_backtest: String,
    pub square_off_live: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            entry_cutoff_minutes: 20,
            square_off_backtest: "15:25".to_string(),
            square_off_live: "15:16".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub redis_url: Option<String>,
    pub database_url: Option<String>,
    pub rows_to_keep: usize,
    /// Skip loading stored indicator rows at start
    pub stateless: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            database_url: None,
            rows_to_keep: 50,
            stateless: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub api_key: String,
    pub access_token: String,
    pub base_url: String,
    pub exchange: String,
    pub requests_per_second: u32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            access_token: String::new(),
            base_url: "https://api.kite.trade".to_string(),
            exchange: "NSE".to_string(),
            requests_per_second: 10,
        }
    }
}

/// Parabolic SAR acceleration factor schedule
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SarParams {
    pub af_start: f64,
    pub af_step: f64,
    pub af_max: f64,
}

impl Default for SarParams {
    fn default() -> Self {
        Self {
            af_start: 0.02,
            af_step: 0.02,
            af_max: 0.20,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    ParabolicSar,
    ParabolicSarMtf,
    AdaptiveSar,
    SuperTrend,
    Adx,
    StructuralPivot,
}

impl StrategyKind {
    /// Bootstrap window used when a strategy entry does not set one
    pub fn default_lookback(&self) -> usize {
        match self {
            StrategyKind::ParabolicSar | StrategyKind::ParabolicSarMtf => 2,
            StrategyKind::AdaptiveSar | StrategyKind::SuperTrend => 7,
            StrategyKind::Adx => 14,
            StrategyKind::StructuralPivot => 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StrategySpec {
    pub kind: StrategyKind,
    pub symbol: String,
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Higher timeframe of the multi-timeframe SAR strategy
    #[serde(default)]
    pub major_interval: Option<u32>,
    #[serde(default)]
    pub lookback: Option<usize>,
}

fn default_interval() -> u32 {
    1
}

impl StrategySpec {
    pub fn new(kind: StrategyKind, symbol: impl Into<String>, interval: u32) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
            interval,
            major_interval: None,
            lookback: None,
        }
    }

    pub fn lookback(&self) -> usize {
        self.lookback.unwrap_or_else(|| self.kind.default_lookback())
    }
}

impl RunConfig {
    /// Load from `path` if given, otherwise from `config/intraday.toml` when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let builder = config::Config::builder();
        let builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let config = Self::from_builder(builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        ))?;

        tracing::info!(
            "Loaded configuration: mode {:?}, {} strategies",
            config.mode,
            config.strategies.len()
        );

        Ok(config)
    }

    pub(crate) fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: RunConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let calendar = self.calendar()?;
        let session = calendar.session_minutes();
        if session <= 0 {
            return Err(TradingError::Config(format!(
                "market close {} is not after open {}",
                self.market.close, self.market.open
            )));
        }

        if self.sizing.leverage <= 0.0 {
            return Err(TradingError::Config("leverage must be positive".into()));
        }
        if self.sizing.order_pct <= 0.0 || self.sizing.order_pct > 1.0 {
            return Err(TradingError::Config(
                "order_pct must be within (0, 1]".into(),
            ));
        }
        if self.sizing.cash <= 0.0 {
            return Err(TradingError::Config("simulated cash must be positive".into()));
        }
        if self.persistence.rows_to_keep == 0 {
            return Err(TradingError::Config("rows_to_keep must be positive".into()));
        }
        if self.retry.tries == 0 {
            return Err(TradingError::Config("retry tries must be positive".into()));
        }

        let sar = self.sar;
        if sar.af_start <= 0.0 || sar.af_step <= 0.0 || sar.af_max < sar.af_start {
            return Err(TradingError::Config(format!("invalid SAR parameters {:?}", sar)));
        }

        for mode in [Mode::Backtest, Mode::Live] {
            let time = self.square_off_time(mode)?;
            if time < calendar.open() || time > calendar.close() {
                return Err(TradingError::Config(format!(
                    "square-off time {} is outside market hours",
                    time
                )));
            }
        }

        for spec in &self.strategies {
            validate_interval(&spec.symbol, spec.interval, session)?;

            if let Some(major) = spec.major_interval {
                validate_interval(&spec.symbol, major, session)?;
                if major <= spec.interval {
                    return Err(TradingError::Config(format!(
                        "{}: major interval {} must exceed minor interval {}",
                        spec.symbol, major, spec.interval
                    )));
                }
            } else if spec.kind == StrategyKind::ParabolicSarMtf {
                return Err(TradingError::Config(format!(
                    "{}: multi-timeframe strategy needs major_interval",
                    spec.symbol
                )));
            }

            if spec.lookback() == 0 {
                return Err(TradingError::Config(format!(
                    "{}: lookback must be positive",
                    spec.symbol
                )));
            }
        }

        Ok(())
    }

    pub fn calendar(&self) -> Result<TradingCalendar> {
        Ok(TradingCalendar::new(
            parse_time("market.open", &self.market.open)?,
            parse_time("market.close", &self.market.close)?,
            self.market.holidays.clone(),
        ))
    }

    pub fn square_off_time(&self, mode: Mode) -> Result<NaiveTime> {
        match mode {
            Mode::Backtest => parse_time(
                "scheduler.square_off_backtest",
                &self.scheduler.square_off_backtest,
            ),
            Mode::Live => parse_time("scheduler.square_off_live", &self.scheduler.square_off_live),
        }
    }
}

fn validate_interval(symbol: &str, interval: u32, session: i64) -> Result<()> {
    if interval == 0 || session % interval as i64 != 0 {
        return Err(TradingError::Config(format!(
            "{}: interval {} does not divide the {} minute session",
            symbol, interval, session
        )));
    }
    Ok(())
}

/// Parse `HH:MM`
pub fn parse_time(field: &str, value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| TradingError::Config(format!("{} = {:?}: {}", field, value, e)))
}
