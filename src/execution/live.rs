use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{quantity_for, Orders, PendingOrder};
use crate::config::SizingConfig;
use crate::models::{Action, OpenPosition};
use crate::retry::{retry, RetryPolicy};
use crate::Result;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderKind {
    Market,
    /// Stop-loss market order fired at `trigger_price`
    StopLossMarket,
}

/// One intraday order as sent to the broker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub action: Action,
    pub quantity: u64,
    pub kind: OrderKind,
    pub trigger_price: Option<f64>,
}

impl OrderRequest {
    pub fn market(symbol: &str, action: Action, quantity: u64) -> Self {
        Self {
            symbol: symbol.to_string(),
            action,
            quantity,
            kind: OrderKind::Market,
            trigger_price: None,
        }
    }

    pub fn stop_loss(symbol: &str, action: Action, quantity: u64, trigger_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            action,
            quantity,
            kind: OrderKind::StopLossMarket,
            trigger_price: Some(trigger_price.floor()),
        }
    }
}

/// Broker order API. Every call may fail transiently.
#[async_trait]
pub trait BrokerApi: Send + Sync {
    async fn place_order(&self, request: &OrderRequest) -> Result<String>;

    async fn cancel_order(&self, order_id: &str) -> Result<()>;

    /// Day positions with signed quantities
    async fn positions(&self) -> Result<Vec<OpenPosition>>;

    /// Orders still waiting to fill or trigger
    async fn pending_orders(&self) -> Result<Vec<PendingOrder>>;

    async fn available_cash(&self) -> Result<f64>;
}

/// Order backend for live trading; every broker call runs under the retry policy
pub struct LiveOrders {
    broker: Arc<dyn BrokerApi>,
    sizing: SizingConfig,
    retry: RetryPolicy,
}

impl LiveOrders {
    pub fn new(broker: Arc<dyn BrokerApi>, sizing: SizingConfig, retry: RetryPolicy) -> Self {
        Self {
            broker,
            sizing,
            retry,
        }
    }

    async fn submit(&self, request: OrderRequest) -> Result<String> {
        let order_id = retry(&self.retry, "place_order", || self.broker.place_order(&request)).await?;

        tracing::info!(
            symbol = %request.symbol,
            order_id = %order_id,
            "{:?} {:?} order for {} placed",
            request.action,
            request.kind,
            request.quantity
        );

        Ok(order_id)
    }
}

#[async_trait]
impl Orders for LiveOrders {
    async fn compute_quantity(&self, symbol: &str, price: f64) -> Result<u64> {
        let cash = retry(&self.retry, "available_cash", || self.broker.available_cash()).await?;
        quantity_for(symbol, cash, &self.sizing, price)
    }

    async fn place(
        &self,
        _candle_time: NaiveDateTime,
        symbol: &str,
        action: Action,
        quantity: u64,
        _price: f64,
    ) -> Result<String> {
        self.submit(OrderRequest::market(symbol, action, quantity)).await
    }

    async fn place_stop_loss(
        &self,
        _candle_time: NaiveDateTime,
        symbol: &str,
        action: Action,
        quantity: u64,
        trigger_price: f64,
    ) -> Result<String> {
        self.submit(OrderRequest::stop_loss(symbol, action, quantity, trigger_price))
            .await
    }

    async fn open_positions(&self) -> Result<(Vec<OpenPosition>, Vec<OpenPosition>)> {
        let positions = retry(&self.retry, "positions", || self.broker.positions()).await?;
        if positions.is_empty() {
            tracing::warn!("No positions for the day");
        }

        let (longs, rest): (Vec<_>, Vec<_>) = positions.into_iter().partition(|p| p.quantity > 0);
        let shorts = rest.into_iter().filter(|p| p.quantity < 0).collect();

        Ok((longs, shorts))
    }

    async fn pending_orders(&self) -> Result<Vec<PendingOrder>> {
        retry(&self.retry, "pending_orders", || self.broker.pending_orders()).await
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        retry(&self.retry, "cancel_order", || self.broker.cancel_order(order_id)).await?;
        tracing::info!(order_id, "Cancelled order");
        Ok(())
    }
}
