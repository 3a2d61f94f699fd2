use chrono::{Duration, NaiveDateTime, NaiveTime};
use std::sync::Arc;

use crate::error::TradingError;
use crate::execution::Orders;
use crate::models::{Action, Position, Side};
use crate::Result;

/// One open entry held by a strategy
#[derive(Debug, Clone, PartialEq)]
pub struct BookEntry {
    pub order_id: String,
    pub quantity: u64,
    pub price: f64,
    pub candle_time: NaiveDateTime,
    /// Protective stop placed with the entry, cancelled on exit
    pub stop_order_id: Option<String>,
}

/// Per-strategy position bookkeeping on top of a shared `Orders` backend.
///
/// At most one long and one short entry exist at a time and never both at once.
pub struct TradeBook {
    symbol: String,
    orders: Arc<dyn Orders>,
    entry_cutoff: NaiveTime,
    longs: Vec<BookEntry>,
    shorts: Vec<BookEntry>,
    net_income: f64,
}

impl TradeBook {
    /// `cutoff_minutes` before `close` no new entries are taken
    pub fn new(symbol: impl Into<String>, orders: Arc<dyn Orders>, close: NaiveTime, cutoff_minutes: u32) -> Self {
        Self {
            symbol: symbol.into(),
            orders,
            entry_cutoff: close - Duration::minutes(cutoff_minutes as i64),
            longs: Vec::new(),
            shorts: Vec::new(),
            net_income: 0.0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn long_positions(&self) -> &[BookEntry] {
        &self.longs
    }

    pub fn short_positions(&self) -> &[BookEntry] {
        &self.shorts
    }

    /// Realized net of every exit taken through this book
    pub fn net_income(&self) -> f64 {
        self.net_income
    }

    /// The entry still held, as a trade row without an exit
    pub fn open_position(&self) -> Option<Position> {
        let (side, entry) = match (self.longs.last(), self.shorts.last()) {
            (Some(entry), _) => (Side::Long, entry),
            (_, Some(entry)) => (Side::Short, entry),
            _ => return None,
        };

        Some(Position {
            symbol: self.symbol.clone(),
            side,
            quantity: entry.quantity,
            entry_price: entry.price,
            entry_time: entry.candle_time,
            exit_price: None,
            exit_time: None,
            realized_net: None,
        })
    }

    pub fn side(&self) -> Option<Side> {
        match (self.longs.is_empty(), self.shorts.is_empty()) {
            (false, _) => Some(Side::Long),
            (_, false) => Some(Side::Short),
            _ => None,
        }
    }

    /// New entries are allowed up to the cut-off; exits always are
    pub fn can_order(&self, candle_time: NaiveDateTime) -> bool {
        candle_time.time() <= self.entry_cutoff
    }

    pub async fn enter_long(&mut self, candle_time: NaiveDateTime, price: f64, stop_loss: Option<f64>) -> Result<()> {
        self.enter(Side::Long, candle_time, price, stop_loss).await
    }

    pub async fn enter_short(&mut self, candle_time: NaiveDateTime, price: f64, stop_loss: Option<f64>) -> Result<()> {
        self.enter(Side::Short, candle_time, price, stop_loss).await
    }

    /// Go long unless already long, closing a short first
    pub async fn stop_and_reverse_enter_long(&mut self, candle_time: NaiveDateTime, price: f64) -> Result<()> {
        if self.side() == Some(Side::Long) {
            return Ok(());
        }
        self.enter(Side::Long, candle_time, price, None).await
    }

    /// Go short unless already short, closing a long first
    pub async fn stop_and_reverse_enter_short(&mut self, candle_time: NaiveDateTime, price: f64) -> Result<()> {
        if self.side() == Some(Side::Short) {
            return Ok(());
        }
        self.enter(Side::Short, candle_time, price, None).await
    }

    async fn enter(
        &mut self,
        side: Side,
        candle_time: NaiveDateTime,
        price: f64,
        stop_loss: Option<f64>,
    ) -> Result<()> {
        let (same, opposite) = match side {
            Side::Long => (self.longs.len(), self.shorts.len()),
            Side::Short => (self.shorts.len(), self.longs.len()),
        };

        if same != 0 {
            return Err(TradingError::invariant(
                &self.symbol,
                format!("entering {:?} at {} when already {:?}", side, candle_time, side),
            ));
        }
        if opposite > 1 {
            return Err(TradingError::invariant(
                &self.symbol,
                format!("{} opposite positions open, cannot pick one to close", opposite),
            ));
        }

        // Sizing first: a NoCash here must leave the book untouched
        let quantity = if self.can_order(candle_time) {
            Some(self.orders.compute_quantity(&self.symbol, price).await?)
        } else {
            None
        };

        // The entry action of `side` is the exit action of the opposite side
        self.exit(side.entry_action(), candle_time, price).await?;

        let Some(quantity) = quantity else {
            tracing::warn!(
                symbol = %self.symbol,
                "Market close nearing at {}, not taking a new {:?} position",
                candle_time,
                side
            );
            return Ok(());
        };

        tracing::info!(symbol = %self.symbol, "Entering {:?} position at {}", side, candle_time);

        let order_id = self
            .orders
            .place(candle_time, &self.symbol, side.entry_action(), quantity, price)
            .await?;

        let stop_order_id = match stop_loss {
            Some(trigger) => Some(
                self.orders
                    .place_stop_loss(candle_time, &self.symbol, side.exit_action(), quantity, trigger)
                    .await?,
            ),
            None => None,
        };

        let entry = BookEntry {
            order_id,
            quantity,
            price,
            candle_time,
            stop_order_id,
        };
        match side {
            Side::Long => self.longs.push(entry),
            Side::Short => self.shorts.push(entry),
        }

        Ok(())
    }

    /// Close the single open entry that `action` exits, if any
    async fn exit(&mut self, action: Action, candle_time: NaiveDateTime, price: f64) -> Result<()> {
        let entries = match action {
            Action::Buy => &mut self.shorts,
            Action::Sell => &mut self.longs,
        };
        let Some(entry) = entries.pop() else {
            return Ok(());
        };

        tracing::info!(
            symbol = %self.symbol,
            "Exiting {} at {} with {:?}",
            entry.quantity,
            candle_time,
            action
        );

        if let Some(stop) = &entry.stop_order_id {
            self.orders.cancel_order(stop).await?;
        }

        self.orders
            .place(candle_time, &self.symbol, action, entry.quantity, price)
            .await?;

        let net = match action {
            Action::Sell => (price - entry.price) * entry.quantity as f64,
            Action::Buy => (entry.price - price) * entry.quantity as f64,
        };
        self.net_income += net;

        Ok(())
    }
}
