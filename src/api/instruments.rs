use std::collections::HashMap;

use crate::error::TradingError;
use crate::Result;

/// Bidirectional symbol <-> instrument token lookup for one exchange
#[derive(Debug, Clone, Default)]
pub struct InstrumentResolver {
    exchange: String,
    by_symbol: HashMap<String, u64>,
    by_token: HashMap<u64, String>,
}

impl InstrumentResolver {
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            ..Self::default()
        }
    }

    /// Parse the broker's instrument dump, keeping rows of this exchange only.
    ///
    /// The header must name `instrument_token`, `tradingsymbol` and `exchange` columns.
    pub fn from_csv(exchange: impl Into<String>, csv: &str) -> Result<Self> {
        let mut resolver = Self::new(exchange);
        let mut lines = csv.lines();

        let header: Vec<&str> = lines
            .next()
            .ok_or_else(|| TradingError::Broker {
                operation: "instruments".into(),
                reason: "empty instrument dump".into(),
            })?
            .split(',')
            .map(str::trim)
            .collect();

        let column = |name: &str| {
            header.iter().position(|h| *h == name).ok_or_else(|| TradingError::Broker {
                operation: "instruments".into(),
                reason: format!("instrument dump has no {} column", name),
            })
        };
        let (token_col, symbol_col, exchange_col) =
            (column("instrument_token")?, column("tradingsymbol")?, column("exchange")?);

        for line in lines.filter(|l| !l.trim().is_empty()) {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let (Some(token), Some(symbol), Some(exchange)) =
                (fields.get(token_col), fields.get(symbol_col), fields.get(exchange_col))
            else {
                tracing::debug!("Skipping short instrument row: {}", line);
                continue;
            };
            if *exchange != resolver.exchange {
                continue;
            }

            match token.parse::<u64>() {
                Ok(token) => resolver.insert(symbol, token),
                Err(_) => tracing::debug!("Skipping instrument row with bad token: {}", line),
            }
        }

        tracing::info!(
            exchange = %resolver.exchange,
            "Loaded {} instruments",
            resolver.len()
        );

        Ok(resolver)
    }

    pub fn insert(&mut self, symbol: &str, token: u64) {
        self.by_symbol.insert(symbol.to_string(), token);
        self.by_token.insert(token, symbol.to_string());
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn token(&self, symbol: &str) -> Option<u64> {
        self.by_symbol.get(symbol).copied()
    }

    pub fn symbol(&self, token: u64) -> Option<&str> {
        self.by_token.get(&token).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_symbol.is_empty()
    }
}
