use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};

use super::Worker;
use crate::execution::square_off::SquareOffReport;
use crate::execution::AutoSquareOff;
use crate::Result;

/// Squares off once the clock reaches `at`
pub struct SquareOffWorker {
    square_off: AutoSquareOff,
    at: NaiveTime,
    report: Option<SquareOffReport>,
}

impl SquareOffWorker {
    pub fn new(square_off: AutoSquareOff, at: NaiveTime) -> Self {
        Self {
            square_off,
            at,
            report: None,
        }
    }

    pub fn report(&self) -> Option<&SquareOffReport> {
        self.report.as_ref()
    }

    async fn run_once(&mut self, candle_time: NaiveDateTime) -> Result<()> {
        tracing::info!("Auto square-off at {}", candle_time);
        let report = self.square_off.square_off(candle_time).await?;
        tracing::info!(
            "Square-off done: {} cancelled, {} closed",
            report.cancelled.len(),
            report.closed.len()
        );
        self.report = Some(report);
        Ok(())
    }
}

#[async_trait]
impl Worker for SquareOffWorker {
    fn name(&self) -> &str {
        "AutoSquareOff"
    }

    fn symbol(&self) -> &str {
        "*"
    }

    async fn on_tick(&mut self, candle_time: NaiveDateTime) -> Result<()> {
        if self.report.is_none() && candle_time.time() >= self.at {
            self.run_once(candle_time).await?;
        }
        Ok(())
    }

    async fn stop(&mut self, candle_time: NaiveDateTime) -> Result<()> {
        if self.report.is_none() {
            tracing::warn!("Square-off time {} never reached, squaring off at stop", self.at);
            self.run_once(candle_time).await?;
        }
        Ok(())
    }
}
