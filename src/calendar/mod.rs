//! Trading calendar: candle boundaries that respect market hours, weekends and holidays.
//!
//! Candles are labelled by their start time. At candle time `t` the most recent
//! complete candle of an `n` minute interval is the one starting at `t - n`, which
//! is why every sequence starts one interval before the reference time.

pub mod slots;

pub use slots::TimeSlots;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use std::collections::BTreeSet;

use crate::error::TradingError;
use crate::models::Period;
use crate::Result;

/// Length of the default session in minutes (09:15 to 15:30)
pub const SESSION_MINUTES: u32 = 375;

#[derive(Debug, Clone)]
pub struct TradingCalendar {
    open: NaiveTime,
    close: NaiveTime,
    holidays: BTreeSet<NaiveDate>,
}

impl Default for TradingCalendar {
    fn default() -> Self {
        Self::new(
            NaiveTime::from_hms_opt(9, 15, 0).unwrap_or_default(),
            NaiveTime::from_hms_opt(15, 30, 0).unwrap_or_default(),
            default_holidays(),
        )
    }
}

/// Exchange holidays shipped with the default configuration
pub fn default_holidays() -> Vec<NaiveDate> {
    [(2021, 10, 15), (2021, 11, 4), (2021, 11, 5), (2021, 11, 19)]
        .iter()
        .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
        .collect()
}

impl TradingCalendar {
    pub fn new(open: NaiveTime, close: NaiveTime, holidays: Vec<NaiveDate>) -> Self {
        Self {
            open,
            close,
            holidays: holidays.into_iter().collect(),
        }
    }

    pub fn open(&self) -> NaiveTime {
        self.open
    }

    pub fn close(&self) -> NaiveTime {
        self.close
    }

    pub fn session_minutes(&self) -> i64 {
        (self.close - self.open).num_minutes()
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.is_holiday(date)
    }

    /// Session open and close on `date`
    pub fn session(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        (date.and_time(self.open), date.and_time(self.close))
    }

    /// Nearest trading day strictly before `date`
    pub fn previous_trading_date(&self, date: NaiveDate) -> NaiveDate {
        let mut cursor = date;
        loop {
            cursor = match cursor.pred_opt() {
                Some(d) => d,
                None => return cursor,
            };
            if self.is_trading_day(cursor) {
                return cursor;
            }
        }
    }

    /// `count` candle boundaries before `reference`, most recent first.
    ///
    /// Each element is one interval before the previous one; when a step would leave
    /// the session the cursor continues from the previous trading day's close.
    pub fn sequence(
        &self,
        period: Period,
        interval: u32,
        count: usize,
        reference: NaiveDateTime,
    ) -> Result<Vec<NaiveDateTime>> {
        let reference = truncate_to_minute(reference);
        if reference.time() > self.close {
            return Err(TradingError::OutOfMarketHours(reference));
        }

        let delta = time_delta(period, interval)?;
        let mut sequence = Vec::with_capacity(count);
        let mut cursor = reference;

        for _ in 0..count {
            let mut candidate = cursor - delta;

            if candidate.date() != cursor.date()
                || candidate.time() < self.open
                || !self.is_trading_day(candidate.date())
            {
                let date = self.previous_trading_date(cursor.date());
                candidate = date.and_time(self.close) - delta;
            }

            sequence.push(candidate);
            cursor = candidate;
        }

        Ok(sequence)
    }

    /// Start of the most recent complete candle at `reference`
    pub fn previous_time(
        &self,
        period: Period,
        interval: u32,
        reference: NaiveDateTime,
    ) -> Result<NaiveDateTime> {
        self.sequence(period, interval, 1, reference)?
            .into_iter()
            .next()
            .ok_or(TradingError::OutOfMarketHours(reference))
    }

    /// Minutes of the day on which an `interval` candle completes:
    /// open + interval, open + 2 * interval, ... up to the close.
    pub fn allowed_time_slots(&self, period: Period, interval: u32) -> Result<TimeSlots> {
        let delta = time_delta(period, interval)?;
        let day = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default();
        let end = day.and_time(self.close);
        let mut cursor = day.and_time(self.open) + delta;
        let mut times = Vec::new();

        while cursor <= end {
            times.push(cursor.time());
            cursor += delta;
        }

        Ok(TimeSlots::from_times(times))
    }

    /// Most recent trading day as of `now`.
    ///
    /// On weekends, holidays, or a Monday before the open this resolves through
    /// `sequence` anchored just before the open; otherwise it is `now` itself.
    pub fn previous_trading_day(&self, now: NaiveDateTime) -> Result<NaiveDateTime> {
        let before_open_monday = now.weekday() == Weekday::Mon && now.time() < self.open;

        if !self.is_trading_day(now.date()) || before_open_monday {
            let anchor = self
                .open
                .overflowing_sub_signed(Duration::minutes(5))
                .0;
            return self.previous_time(Period::Minute, 1, now.date().and_time(anchor));
        }

        Ok(now)
    }

    /// Session openings of the `n` trading days before `reference`'s date, most recent first
    pub fn n_previous_trading_days(&self, n: usize, reference: NaiveDateTime) -> Vec<NaiveDateTime> {
        let mut days = Vec::with_capacity(n);
        let mut date = reference.date();

        for _ in 0..n {
            date = self.previous_trading_date(date);
            days.push(date.and_time(self.open));
        }

        days
    }
}

/// Expected boundaries that are missing from `actual`
pub fn missing_times(actual: &[NaiveDateTime], expected: &[NaiveDateTime]) -> Vec<NaiveDateTime> {
    let actual: BTreeSet<&NaiveDateTime> = actual.iter().collect();
    expected
        .iter()
        .filter(|t| !actual.contains(t))
        .copied()
        .collect()
}

pub fn time_delta(period: Period, interval: u32) -> Result<Duration> {
    if interval == 0 {
        return Err(TradingError::Config("candle interval must be positive".into()));
    }
    match period {
        Period::Minute => Ok(Duration::minutes(interval as i64)),
    }
}

pub fn truncate_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_sequence_within_session() {
        let calendar = TradingCalendar::default();
        let seq = calendar
            .sequence(Period::Minute, 1, 7, at(2021, 9, 28, 14, 55))
            .unwrap();

        let expected: Vec<_> = (1..=7).map(|k| at(2021, 9, 28, 14, 55 - k)).collect();
        assert_eq!(seq, expected);
    }

    #[test]
    fn test_sequence_zeroes_seconds() {
        let calendar = TradingCalendar::default();
        let reference = NaiveDate::from_ymd_opt(2021, 9, 28)
            .unwrap()
            .and_hms_opt(14, 55, 59)
            .unwrap();

        let seq = calendar.sequence(Period::Minute, 1, 1, reference).unwrap();
        assert_eq!(seq, vec![at(2021, 9, 28, 14, 54)]);
    }

    #[test]
    fn test_sequence_crosses_to_previous_day() {
        let calendar = TradingCalendar::default();
        // Wednesday 09:18 with 3 minute candles
        let seq = calendar
            .sequence(Period::Minute, 3, 3, at(2021, 12, 1, 9, 18))
            .unwrap();

        assert_eq!(
            seq,
            vec![
                at(2021, 12, 1, 9, 15),
                at(2021, 11, 30, 15, 27),
                at(2021, 11, 30, 15, 24),
            ]
        );
    }

    #[test]
    fn test_sequence_skips_weekend() {
        let calendar = TradingCalendar::default();
        // Monday 2021-12-06
        let seq = calendar
            .sequence(Period::Minute, 1, 2, at(2021, 12, 6, 9, 16))
            .unwrap();

        assert_eq!(seq, vec![at(2021, 12, 6, 9, 15), at(2021, 12, 3, 15, 29)]);
    }

    #[test]
    fn test_sequence_skips_holidays() {
        let calendar = TradingCalendar::default();
        // Monday 2021-11-08: previous Friday 11-05 and Thursday 11-04 are holidays
        let seq = calendar
            .sequence(Period::Minute, 5, 2, at(2021, 11, 8, 9, 20))
            .unwrap();

        assert_eq!(seq, vec![at(2021, 11, 8, 9, 15), at(2021, 11, 3, 15, 25)]);
    }

    #[test]
    fn test_sequence_out_of_market_hours() {
        let calendar = TradingCalendar::default();

        assert!(matches!(
            calendar.sequence(Period::Minute, 1, 2, at(2021, 12, 1, 15, 31)),
            Err(TradingError::OutOfMarketHours(_))
        ));
        assert!(matches!(
            calendar.sequence(Period::Minute, 1, 2, at(2021, 12, 1, 16, 0)),
            Err(TradingError::OutOfMarketHours(_))
        ));
        assert!(calendar
            .sequence(Period::Minute, 1, 2, at(2021, 12, 1, 15, 30))
            .is_ok());
    }

    #[test]
    fn test_sequence_properties_over_a_week() {
        let calendar = TradingCalendar::default();
        let intervals = [1u32, 3, 5, 15];

        for day in 1..=5 {
            for interval in intervals {
                let mut reference = at(2021, 11, day, 9, 15);
                while reference.time() <= calendar.close() {
                    if calendar.is_trading_day(reference.date()) {
                        let seq = calendar
                            .sequence(Period::Minute, interval, 40, reference)
                            .unwrap();

                        assert_eq!(seq.len(), 40);
                        for pair in seq.windows(2) {
                            assert!(pair[0] > pair[1]);
                        }
                        for t in &seq {
                            assert!(t.time() >= calendar.open() && t.time() <= calendar.close());
                            assert!(calendar.is_trading_day(t.date()), "{} is not a trading day", t);
                        }
                    }
                    reference += Duration::minutes(7);
                }
            }
        }
    }

    #[test]
    fn test_allowed_time_slots() {
        let calendar = TradingCalendar::default();

        let one = calendar.allowed_time_slots(Period::Minute, 1).unwrap();
        assert_eq!(one.len(), 375);
        assert_eq!(one.labels().first().unwrap(), "09:16");
        assert_eq!(one.labels().last().unwrap(), "15:30");

        let fifteen = calendar.allowed_time_slots(Period::Minute, 15).unwrap();
        assert_eq!(fifteen.labels().first().unwrap(), "09:30");
        assert_eq!(fifteen.labels()[1], "09:45");
        assert_eq!(fifteen.labels().last().unwrap(), "15:30");
        assert!(fifteen.contains(at(2021, 12, 1, 15, 15)));
        assert!(!fifteen.contains(at(2021, 12, 1, 15, 16)));
    }

    #[test]
    fn test_previous_trading_day() {
        let calendar = TradingCalendar::default();

        // Saturday resolves to Friday's last candle
        let saturday = at(2021, 12, 4, 11, 0);
        assert_eq!(
            calendar.previous_trading_day(saturday).unwrap(),
            at(2021, 12, 3, 15, 29)
        );

        // Monday before the open
        let monday = at(2021, 12, 6, 8, 0);
        assert_eq!(
            calendar.previous_trading_day(monday).unwrap().date(),
            NaiveDate::from_ymd_opt(2021, 12, 3).unwrap()
        );

        // Tuesday during the session is today
        let tuesday = at(2021, 12, 7, 11, 0);
        assert_eq!(calendar.previous_trading_day(tuesday).unwrap(), tuesday);
    }

    #[test]
    fn test_n_previous_trading_days() {
        let calendar = TradingCalendar::default();
        let days = calendar.n_previous_trading_days(3, at(2021, 11, 8, 9, 15));

        assert_eq!(
            days,
            vec![
                at(2021, 11, 3, 9, 15),
                at(2021, 11, 2, 9, 15),
                at(2021, 11, 1, 9, 15),
            ]
        );
    }

    #[test]
    fn test_missing_times() {
        let expected = vec![at(2021, 12, 1, 9, 15), at(2021, 12, 1, 9, 16)];
        let actual = vec![at(2021, 12, 1, 9, 15)];

        assert_eq!(missing_times(&actual, &expected), vec![at(2021, 12, 1, 9, 16)]);
    }
}
