// Minute-by-minute scheduling of strategy and square-off workers
pub mod clock;
pub mod live;
pub mod square_off_worker;
pub mod strategy_worker;

pub use clock::{Clock, SimulatedClock, WallClock};
pub use live::LiveRunner;
pub use square_off_worker::SquareOffWorker;
pub use strategy_worker::{StrategyOutcome, StrategyWorker};

use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};

use crate::error::TradingError;
use crate::Result;

/// A unit of work driven once per minute by a `Scheduler`
#[async_trait]
pub trait Worker: Send {
    fn name(&self) -> &str;

    fn symbol(&self) -> &str;

    async fn on_tick(&mut self, candle_time: NaiveDateTime) -> Result<()>;

    /// Called once after the last tick of the session
    async fn stop(&mut self, candle_time: NaiveDateTime) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Stopped,
}

/// Ticks a worker every minute from the clock's start until the market close (inclusive).
///
/// Tick-scoped errors skip the tick. Any other error aborts the worker and comes back
/// wrapped in `WorkerAborted`.
pub struct Scheduler<C: Clock> {
    clock: C,
    close: NaiveTime,
    state: WorkerState,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C, close: NaiveTime) -> Self {
        Self {
            clock,
            close,
            state: WorkerState::Idle,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub async fn run<W: Worker + ?Sized>(&mut self, worker: &mut W) -> Result<()> {
        self.state = WorkerState::Running;
        tracing::info!(
            worker = worker.name(),
            symbol = worker.symbol(),
            "Worker running from {}",
            self.clock.now()
        );

        let mut candle_time = self.clock.now();
        while candle_time.time() <= self.close {
            match worker.on_tick(candle_time).await {
                Ok(()) => {}
                Err(e) if e.is_tick_scoped() => {
                    tracing::debug!(
                        worker = worker.name(),
                        symbol = worker.symbol(),
                        "Skipping {}: {}",
                        candle_time,
                        e
                    );
                }
                Err(e) => return Err(self.abort(worker, candle_time, e)),
            }

            self.clock.wait().await;
            self.clock.advance();
            candle_time = self.clock.now();
        }

        self.state = WorkerState::Stopped;
        if let Err(e) = worker.stop(candle_time).await {
            return Err(self.abort(worker, candle_time, e));
        }

        tracing::info!(
            worker = worker.name(),
            symbol = worker.symbol(),
            "Worker stopped at {}",
            candle_time
        );
        Ok(())
    }

    fn abort<W: Worker + ?Sized>(&mut self, worker: &W, candle_time: NaiveDateTime, e: TradingError) -> TradingError {
        self.state = WorkerState::Stopped;
        tracing::error!(
            worker = worker.name(),
            symbol = worker.symbol(),
            "Aborting at {}: {}",
            candle_time,
            e
        );

        TradingError::WorkerAborted {
            worker: worker.name().to_string(),
            symbol: worker.symbol().to_string(),
            candle_time,
            source: Box::new(e),
        }
    }
}
