// Order execution: sizing, the simulated ledger, the live broker backend and square-off
pub mod ledger;
pub mod live;
pub mod square_off;

pub use ledger::{BacktestLedger, LedgerEvent};
pub use live::{BrokerApi, LiveOrders, OrderKind, OrderRequest};
pub use square_off::AutoSquareOff;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::SizingConfig;
use crate::error::TradingError;
use crate::models::{Action, OpenPosition};
use crate::Result;

/// A stop order waiting for its trigger price
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingOrder {
    pub order_id: String,
    pub symbol: String,
    pub action: Action,
    pub quantity: u64,
    pub trigger_price: f64,
}

/// Units affordable for one order: `floor(cash * leverage * order_pct / price)`.
///
/// Fails with `NoCash` when not even one unit fits or the price gives no finite size.
pub fn quantity_for(symbol: &str, cash: f64, sizing: &SizingConfig, price: f64) -> Result<u64> {
    let margin = cash * sizing.leverage * sizing.order_pct;
    let quantity = if price > 0.0 {
        (margin / price).floor()
    } else {
        0.0
    };

    if !quantity.is_finite() || quantity < 1.0 {
        return Err(TradingError::NoCash {
            symbol: symbol.to_string(),
            margin,
            price,
        });
    }

    Ok(quantity as u64)
}

/// Order backend shared by every strategy trading one account.
///
/// Implemented by the simulated `BacktestLedger` and by `LiveOrders` over a broker.
#[async_trait]
pub trait Orders: Send + Sync {
    async fn compute_quantity(&self, symbol: &str, price: f64) -> Result<u64>;

    /// Market order; returns the order id
    async fn place(
        &self,
        candle_time: NaiveDateTime,
        symbol: &str,
        action: Action,
        quantity: u64,
        price: f64,
    ) -> Result<String>;

    /// Stop-loss market order that stays pending until triggered or cancelled
    async fn place_stop_loss(
        &self,
        candle_time: NaiveDateTime,
        symbol: &str,
        action: Action,
        quantity: u64,
        trigger_price: f64,
    ) -> Result<String>;

    /// Open positions split into (longs, shorts)
    async fn open_positions(&self) -> Result<(Vec<OpenPosition>, Vec<OpenPosition>)>;

    async fn pending_orders(&self) -> Result<Vec<PendingOrder>>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Cancel every pending order; returns the cancelled ids
    async fn cancel_pending_orders(&self) -> Result<Vec<String>> {
        let pending = self.pending_orders().await?;
        let mut cancelled = Vec::with_capacity(pending.len());

        for order in pending {
            self.cancel_order(&order.order_id).await?;
            cancelled.push(order.order_id);
        }

        Ok(cancelled)
    }
}
