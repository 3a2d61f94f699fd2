use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::Orders;
use crate::data::MarketData;
use crate::models::{Action, OpenPosition};
use crate::Result;

/// What one square-off did
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SquareOffReport {
    pub cancelled: Vec<String>,
    pub closed: Vec<String>,
    /// Price each closed symbol was squared off at
    pub exit_prices: BTreeMap<String, f64>,
}

/// Forced end-of-session flattening of every open position
pub struct AutoSquareOff {
    orders: Arc<dyn Orders>,
    market_data: Arc<dyn MarketData>,
}

impl AutoSquareOff {
    pub fn new(orders: Arc<dyn Orders>, market_data: Arc<dyn MarketData>) -> Self {
        Self {
            orders,
            market_data,
        }
    }

    /// Cancel pending orders, then close longs with sells and shorts with buys.
    ///
    /// Pending stops go first so none of them can fire against a position that is
    /// being closed here.
    pub async fn square_off(&self, candle_time: NaiveDateTime) -> Result<SquareOffReport> {
        let cancelled = self.orders.cancel_pending_orders().await?;
        if cancelled.is_empty() {
            tracing::info!("No pending orders to cancel");
        } else {
            tracing::info!("Cancelled {} pending order(s): {:?}", cancelled.len(), cancelled);
        }

        let (longs, shorts) = self.orders.open_positions().await?;
        if longs.is_empty() && shorts.is_empty() {
            tracing::info!("No open positions at {}", candle_time);
        }

        let mut closed = Vec::with_capacity(longs.len() + shorts.len());
        let mut exit_prices = BTreeMap::new();
        for position in longs.iter().chain(shorts.iter()) {
            let action = if position.quantity > 0 {
                Action::Sell
            } else {
                Action::Buy
            };
            let price = self.reference_price(position, candle_time).await?;

            self.orders
                .place(
                    candle_time,
                    &position.symbol,
                    action,
                    position.quantity.unsigned_abs(),
                    price,
                )
                .await?;

            tracing::info!(
                symbol = %position.symbol,
                "Squared off {} at {:.2}",
                position.quantity,
                price
            );
            closed.push(position.symbol.clone());
            exit_prices.insert(position.symbol.clone(), price);
        }

        Ok(SquareOffReport {
            cancelled,
            closed,
            exit_prices,
        })
    }

    /// Latest close up to `candle_time`, or the entry price when there is none
    async fn reference_price(&self, position: &OpenPosition, candle_time: NaiveDateTime) -> Result<f64> {
        let start = candle_time.date().and_time(NaiveTime::MIN);
        let end = candle_time + Duration::minutes(1);

        let price = self
            .market_data
            .last_price(&position.symbol, start, end)
            .await?
            .unwrap_or(position.average_price);

        Ok(price)
    }
}
