use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Candle period. Only minute candles are supported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Period {
    #[default]
    Minute,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Minute => "MIN",
        }
    }
}

/// OHLCV candle. `timestamp` is the start of the candle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn bar(&self) -> Bar {
        Bar {
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }
}

/// Price fields of a candle without its identity, embedded in indicator rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Single traded price event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    pub fn opposite(&self) -> Self {
        match self {
            Action::Buy => Action::Sell,
            Action::Sell => Action::Buy,
        }
    }

    /// +1 for buys, -1 for sells
    pub fn sign(&self) -> i64 {
        match self {
            Action::Buy => 1,
            Action::Sell => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Action that opens a position on this side
    pub fn entry_action(&self) -> Action {
        match self {
            Side::Long => Action::Buy,
            Side::Short => Action::Sell,
        }
    }

    pub fn exit_action(&self) -> Action {
        self.entry_action().opposite()
    }
}

/// Trend colour carried by the SAR / SuperTrend family of indicators
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Trend {
    Green,
    Red,
}

impl Trend {
    pub fn side(&self) -> Side {
        match self {
            Trend::Green => Side::Long,
            Trend::Red => Side::Short,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Backtest,
    Live,
}

/// Append-only ledger row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    pub order_id: String,
    pub time: NaiveDateTime,
    pub action: Action,
    pub symbol: String,
    pub quantity: u64,
    pub price: f64,
}

/// Trade row: opened by one order, closed by the netting order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    pub quantity: u64,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub exit_price: Option<f64>,
    pub exit_time: Option<NaiveDateTime>,
    pub realized_net: Option<f64>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.exit_time.is_none()
    }

    /// Realized net if this position were closed at `exit_price`
    pub fn net_at(&self, exit_price: f64) -> f64 {
        let qty = self.quantity as f64;
        match self.side {
            Side::Long => (exit_price - self.entry_price) * qty,
            Side::Short => (self.entry_price - exit_price) * qty,
        }
    }
}

/// An open position as reported by an order backend.
///
/// `quantity` is signed: positive for longs, negative for shorts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenPosition {
    pub symbol: String,
    pub quantity: i64,
    pub average_price: f64,
}
