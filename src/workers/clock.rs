use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDateTime, Timelike};

use crate::calendar::truncate_to_minute;

/// Source of candle times for a scheduler
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current candle time, seconds zeroed
    fn now(&self) -> NaiveDateTime;

    /// Block until the next minute may be processed
    async fn wait(&self);

    /// Step to the next minute
    fn advance(&mut self);
}

/// Backtest clock: starts at a given minute and moves one minute per step without delay
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    now: NaiveDateTime,
}

impl SimulatedClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: truncate_to_minute(start),
        }
    }
}

#[async_trait]
impl Clock for SimulatedClock {
    fn now(&self) -> NaiveDateTime {
        self.now
    }

    async fn wait(&self) {}

    fn advance(&mut self) {
        self.now += Duration::minutes(1);
    }
}

/// Live clock: reads local time and sleeps to the top of the next minute
#[derive(Debug, Clone, Default)]
pub struct WallClock;

impl WallClock {
    /// Time left until the next minute starts
    fn until_next_minute(now: NaiveDateTime) -> std::time::Duration {
        let into_minute = now.second() as u64 * 1_000 + (now.nanosecond() / 1_000_000) as u64;
        std::time::Duration::from_millis(60_000u64.saturating_sub(into_minute).max(1))
    }
}

#[async_trait]
impl Clock for WallClock {
    fn now(&self) -> NaiveDateTime {
        truncate_to_minute(Local::now().naive_local())
    }

    async fn wait(&self) {
        let delay = Self::until_next_minute(Local::now().naive_local());
        tracing::debug!("Sleeping {:?} until the next minute", delay);
        tokio::time::sleep(delay).await;
    }

    /// Real time moves on its own
    fn advance(&mut self) {}
}
