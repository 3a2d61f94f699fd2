use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use tokio::task::JoinHandle;

use super::{Clock, Scheduler, Worker};
use crate::execution::square_off::SquareOffReport;
use crate::models::Position;
use crate::strategy::Strategy;
use crate::Result;

/// How one strategy worker ended
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StrategyOutcome {
    pub strategy: String,
    pub symbol: String,
    /// Realized net of the strategy's own exits, plus its square-off once settled
    pub net_income: f64,
    /// Entry left for the square-off to close
    pub open_position: Option<Position>,
    /// Fatal error that aborted the worker
    pub error: Option<String>,
}

impl StrategyOutcome {
    /// Fold the forced close of the open position into `net_income`
    pub fn settle(&mut self, square_off: &SquareOffReport) {
        let Some(position) = self.open_position.take() else {
            return;
        };

        match square_off.exit_prices.get(&position.symbol) {
            Some(price) => self.net_income += position.net_at(*price),
            None => {
                tracing::warn!(
                    strategy = %self.strategy,
                    symbol = %self.symbol,
                    "Open {:?} position was not squared off",
                    position.side
                );
                self.open_position = Some(position);
            }
        }
    }
}

/// Refreshes one strategy's indicators and lets it decide on every allowed slot
pub struct StrategyWorker {
    strategy: Box<dyn Strategy>,
    /// No decisions from this time on; the square-off owns the positions then
    decide_until: Option<NaiveTime>,
    name: String,
}

impl StrategyWorker {
    pub fn new(strategy: Box<dyn Strategy>) -> Self {
        let name = format!("{}:{}", strategy.name(), strategy.symbol());
        Self {
            strategy,
            decide_until: None,
            name,
        }
    }

    pub fn decide_until(mut self, time: NaiveTime) -> Self {
        self.decide_until = Some(time);
        self
    }

    pub fn outcome(&self, result: &Result<()>) -> StrategyOutcome {
        StrategyOutcome {
            strategy: self.strategy.name().to_string(),
            symbol: self.strategy.symbol().to_string(),
            net_income: self.strategy.book().net_income(),
            open_position: self.strategy.book().open_position(),
            error: result.as_ref().err().map(|e| e.to_string()),
        }
    }

    /// Run on its own task until the close, then report
    pub fn spawn<C: Clock + 'static>(mut self, clock: C, close: NaiveTime) -> JoinHandle<StrategyOutcome> {
        tokio::spawn(async move {
            let mut scheduler = Scheduler::new(clock, close);
            let result = scheduler.run(&mut self).await;
            self.outcome(&result)
        })
    }
}

#[async_trait]
impl Worker for StrategyWorker {
    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self) -> &str {
        self.strategy.symbol()
    }

    async fn on_tick(&mut self, candle_time: NaiveDateTime) -> Result<()> {
        if !self.strategy.allowed_time_slots().contains(candle_time) {
            return Ok(());
        }

        self.strategy.refresh_indicators(candle_time).await?;

        if self.decide_until.is_some_and(|until| candle_time.time() >= until) {
            return Ok(());
        }

        tracing::debug!(worker = %self.name, "Evaluating at {}", candle_time);
        self.strategy.decide(candle_time).await
    }

    async fn stop(&mut self, candle_time: NaiveDateTime) -> Result<()> {
        tracing::info!(
            worker = %self.name,
            "Stopping at {} with net income {:.2}",
            candle_time,
            self.strategy.book().net_income()
        );
        self.strategy.persist().await
    }
}
