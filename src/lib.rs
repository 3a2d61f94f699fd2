// Core modules
pub mod api;
pub mod backtest;
pub mod calendar;
pub mod config;
pub mod data;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod persistence;
pub mod retry;
pub mod strategy;
pub mod workers;

// Re-export commonly used types
pub use calendar::TradingCalendar;
pub use config::RunConfig;
pub use error::TradingError;
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, TradingError>;
