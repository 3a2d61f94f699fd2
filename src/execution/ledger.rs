use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{quantity_for, Orders, PendingOrder};
use crate::backtest::BacktestResults;
use crate::config::SizingConfig;
use crate::error::TradingError;
use crate::models::{Action, OpenPosition, OrderRecord, Position, Side};
use crate::Result;

/// Audit trail of ledger mutations in the order they happened
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LedgerEvent {
    Placed {
        order_id: String,
        symbol: String,
        action: Action,
        quantity: u64,
    },
    StopPlaced {
        order_id: String,
        symbol: String,
        action: Action,
        quantity: u64,
    },
    Cancelled {
        order_id: String,
    },
}

/// Index of the open trade row and its signed quantity
#[derive(Debug, Clone, Copy)]
struct ActiveEntry {
    trade: usize,
    quantity: i64,
}

#[derive(Debug, Default)]
struct LedgerState {
    orders: Vec<OrderRecord>,
    trades: Vec<Position>,
    active: HashMap<String, ActiveEntry>,
    pending: Vec<PendingOrder>,
    journal: Vec<LedgerEvent>,
}

/// Simulated order backend.
///
/// Orders fill immediately at the requested price. An order either opens a trade
/// for a symbol with no active position, or exactly nets the active one.
pub struct BacktestLedger {
    sizing: SizingConfig,
    state: Mutex<LedgerState>,
}

impl BacktestLedger {
    pub fn new(sizing: SizingConfig) -> Self {
        Self {
            sizing,
            state: Mutex::new(LedgerState::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|_| TradingError::Store("ledger lock poisoned".into()))
    }

    /// Every order placed so far
    pub fn orders(&self) -> Result<Vec<OrderRecord>> {
        Ok(self.lock()?.orders.clone())
    }

    /// Every trade row, open or closed
    pub fn trades(&self) -> Result<Vec<Position>> {
        Ok(self.lock()?.trades.clone())
    }

    pub fn journal(&self) -> Result<Vec<LedgerEvent>> {
        Ok(self.lock()?.journal.clone())
    }

    /// Signed open quantity for `symbol`, 0 when flat
    pub fn net_quantity(&self, symbol: &str) -> Result<i64> {
        Ok(self
            .lock()?
            .active
            .get(symbol)
            .map(|e| e.quantity)
            .unwrap_or(0))
    }

    /// Aggregate results. Every position must have been squared off.
    pub fn results(&self) -> Result<BacktestResults> {
        let state = self.lock()?;

        if let Some(symbol) = state.active.keys().next() {
            return Err(TradingError::invariant(
                symbol.clone(),
                format!("{} position(s) still open at the end of the session", state.active.len()),
            ));
        }

        Ok(BacktestResults::from_ledger(&state.orders, &state.trades))
    }
}

#[async_trait]
impl Orders for BacktestLedger {
    async fn compute_quantity(&self, symbol: &str, price: f64) -> Result<u64> {
        quantity_for(symbol, self.sizing.cash, &self.sizing, price)
    }

    async fn place(
        &self,
        candle_time: NaiveDateTime,
        symbol: &str,
        action: Action,
        quantity: u64,
        price: f64,
    ) -> Result<String> {
        if quantity == 0 {
            return Err(TradingError::invariant(symbol, "order with zero quantity"));
        }

        let mut state = self.lock()?;
        let signed = action.sign() * quantity as i64;

        match state.active.get(symbol).copied() {
            Some(entry) if entry.quantity.signum() == signed.signum() => {
                return Err(TradingError::invariant(
                    symbol,
                    format!("{:?} of {} while already holding {}", action, quantity, entry.quantity),
                ));
            }
            Some(entry) if entry.quantity + signed != 0 => {
                return Err(TradingError::invariant(
                    symbol,
                    format!(
                        "{:?} of {} does not net the open quantity {}",
                        action, quantity, entry.quantity
                    ),
                ));
            }
            Some(entry) => {
                let trade = &mut state.trades[entry.trade];
                let net = trade.net_at(price);
                trade.exit_price = Some(price);
                trade.exit_time = Some(candle_time);
                trade.realized_net = Some(net);
                state.active.remove(symbol);

                tracing::info!(symbol, "Closed trade at {:.2}, net {:.2}", price, net);
            }
            None => {
                let side = match action {
                    Action::Buy => Side::Long,
                    Action::Sell => Side::Short,
                };
                state.trades.push(Position {
                    symbol: symbol.to_string(),
                    side,
                    quantity,
                    entry_price: price,
                    entry_time: candle_time,
                    exit_price: None,
                    exit_time: None,
                    realized_net: None,
                });
                let trade = state.trades.len() - 1;
                state.active.insert(
                    symbol.to_string(),
                    ActiveEntry {
                        trade,
                        quantity: signed,
                    },
                );
            }
        }

        let order_id = Uuid::new_v4().to_string();
        state.orders.push(OrderRecord {
            order_id: order_id.clone(),
            time: candle_time,
            action,
            symbol: symbol.to_string(),
            quantity,
            price,
        });
        state.journal.push(LedgerEvent::Placed {
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            action,
            quantity,
        });

        tracing::info!(
            symbol,
            "{:?} {} at {:.2} ({})",
            action,
            quantity,
            price,
            candle_time
        );

        Ok(order_id)
    }

    async fn place_stop_loss(
        &self,
        _candle_time: NaiveDateTime,
        symbol: &str,
        action: Action,
        quantity: u64,
        trigger_price: f64,
    ) -> Result<String> {
        let mut state = self.lock()?;
        let order_id = Uuid::new_v4().to_string();

        state.pending.push(PendingOrder {
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            action,
            quantity,
            trigger_price: trigger_price.floor(),
        });
        state.journal.push(LedgerEvent::StopPlaced {
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            action,
            quantity,
        });

        tracing::info!(symbol, "{:?} stop loss for {} at {:.2}", action, quantity, trigger_price.floor());

        Ok(order_id)
    }

    async fn open_positions(&self) -> Result<(Vec<OpenPosition>, Vec<OpenPosition>)> {
        let state = self.lock()?;
        let (longs, shorts): (Vec<_>, Vec<_>) = state
            .active
            .iter()
            .map(|(symbol, entry)| OpenPosition {
                symbol: symbol.clone(),
                quantity: entry.quantity,
                average_price: state.trades[entry.trade].entry_price,
            })
            .partition(|p| p.quantity > 0);

        Ok((longs, shorts))
    }

    async fn pending_orders(&self) -> Result<Vec<PendingOrder>> {
        Ok(self.lock()?.pending.clone())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let mut state = self.lock()?;
        let before = state.pending.len();
        state.pending.retain(|o| o.order_id != order_id);

        if state.pending.len() == before {
            return Err(TradingError::Broker {
                operation: "cancel_order".into(),
                reason: format!("no pending order {}", order_id),
            });
        }

        state.journal.push(LedgerEvent::Cancelled {
            order_id: order_id.to_string(),
        });
        Ok(())
    }
}
