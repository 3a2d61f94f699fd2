pub mod metrics;
pub mod runner;
pub mod synthetic;

pub use metrics::{BacktestResults, TradeRecord};
pub use runner::{BacktestReport, BacktestRunner, RunStatus};
pub use synthetic::{MarketScenario, SyntheticDataGenerator};
