use chrono::{NaiveDateTime, NaiveTime, Timelike};
use std::collections::BTreeSet;

/// Minutes of the day at which a candle boundary of some interval occurs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSlots {
    slots: BTreeSet<NaiveTime>,
}

impl TimeSlots {
    pub fn from_times(times: impl IntoIterator<Item = NaiveTime>) -> Self {
        Self {
            slots: times.into_iter().map(minute_of).collect(),
        }
    }

    /// True if `candle_time` (seconds ignored) falls on one of the slots
    pub fn contains(&self, candle_time: NaiveDateTime) -> bool {
        self.slots.contains(&minute_of(candle_time.time()))
    }

    /// Union of both slot sets
    pub fn merge(&self, other: &TimeSlots) -> TimeSlots {
        Self {
            slots: self.slots.union(&other.slots).copied().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// `HH:MM` labels in ascending order
    pub fn labels(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|t| t.format("%H:%M").to_string())
            .collect()
    }
}

fn minute_of(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}
