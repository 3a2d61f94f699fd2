use chrono::NaiveDateTime;

/// Every failure the engine can surface.
///
/// The variants fall into three groups that callers treat differently:
/// - tick-scoped (`DataNotAvailable`, `NoCash`): the scheduler abandons the current
///   tick and carries on with the next one
/// - transient I/O (`Transient`): retried with backoff at the call site, fatal once
///   the retry budget is spent
/// - everything else is fatal for the owning worker
#[derive(Debug, thiserror::Error)]
pub enum TradingError {
    #[error("data not available: {0}")]
    DataNotAvailable(String),

    #[error("not enough cash for {symbol}: margin {margin:.2}, price {price:.2}")]
    NoCash {
        symbol: String,
        margin: f64,
        price: f64,
    },

    #[error("outside of market hours: {0}")]
    OutOfMarketHours(NaiveDateTime),

    #[error("invariant violated for {symbol}: {reason}")]
    InvariantViolation { symbol: String, reason: String },

    #[error("transient failure in {operation}: {reason}")]
    Transient { operation: String, reason: String },

    #[error("broker rejected {operation}: {reason}")]
    Broker { operation: String, reason: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("worker {worker} aborted for {symbol} at {candle_time}: {source}")]
    WorkerAborted {
        worker: String,
        symbol: String,
        candle_time: NaiveDateTime,
        #[source]
        source: Box<TradingError>,
    },
}

impl TradingError {
    pub fn invariant(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    pub fn transient(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transient {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors that cost one tick and nothing more.
    pub fn is_tick_scoped(&self) -> bool {
        matches!(self, Self::DataNotAvailable(_) | Self::NoCash { .. })
    }

    /// Errors worth another attempt after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

impl From<serde_json::Error> for TradingError {
    fn from(e: serde_json::Error) -> Self {
        Self::Store(format!("serialization: {}", e))
    }
}

impl From<redis::RedisError> for TradingError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_timeout() || e.is_connection_dropped() {
            Self::transient("redis", e)
        } else {
            Self::Store(e.to_string())
        }
    }
}

impl From<sqlx::Error> for TradingError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::transient("postgres", e)
            }
            other => Self::Store(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for TradingError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(TradingError::DataNotAvailable("gap".into()).is_tick_scoped());
        assert!(TradingError::NoCash {
            symbol: "IEX".into(),
            margin: 10.0,
            price: 100.0
        }
        .is_tick_scoped());

        let fatal = TradingError::invariant("IEX", "already long");
        assert!(!fatal.is_tick_scoped());
        assert!(!fatal.is_transient());

        assert!(TradingError::transient("place_order", "timeout").is_transient());
    }

    #[test]
    fn test_worker_aborted_keeps_context() {
        let err = TradingError::WorkerAborted {
            worker: "ParabolicSar".into(),
            symbol: "IEX".into(),
            candle_time: chrono::NaiveDate::from_ymd_opt(2021, 12, 3)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            source: Box::new(TradingError::invariant("IEX", "two short positions")),
        };

        let text = err.to_string();
        assert!(text.contains("IEX"));
        assert!(text.contains("2021-12-03 10:00:00"));
        assert!(text.contains("two short positions"));
    }
}
