use chrono::{Duration, NaiveDateTime};
use std::collections::BTreeMap;

use crate::calendar::truncate_to_minute;
use crate::models::{Candle, Tick};

/// One-minute candles built from ticks, ordered by time
pub fn candles_from_ticks(symbol: &str, ticks: &[Tick]) -> Vec<Candle> {
    let mut buckets: BTreeMap<NaiveDateTime, Candle> = BTreeMap::new();

    for tick in ticks {
        let minute = truncate_to_minute(tick.timestamp);
        buckets
            .entry(minute)
            .and_modify(|c| {
                c.high = c.high.max(tick.price);
                c.low = c.low.min(tick.price);
                c.close = tick.price;
                c.volume += tick.volume;
            })
            .or_insert_with(|| Candle {
                symbol: symbol.to_string(),
                timestamp: minute,
                open: tick.price,
                high: tick.price,
                low: tick.price,
                close: tick.price,
                volume: tick.volume,
            });
    }

    buckets.into_values().collect()
}

/// Aggregate the one-minute candles in `[start, start + width)` into one candle.
///
/// `minutes` must be sorted by time. Returns `None` if the bucket is empty.
pub fn bucket(symbol: &str, minutes: &[Candle], start: NaiveDateTime, width: Duration) -> Option<Candle> {
    let end = start + width;
    let mut inside = minutes
        .iter()
        .filter(|c| c.timestamp >= start && c.timestamp < end);

    let first = inside.next()?;
    let mut candle = Candle {
        symbol: symbol.to_string(),
        timestamp: start,
        ..first.clone()
    };

    for c in inside {
        candle.high = candle.high.max(c.high);
        candle.low = candle.low.min(c.low);
        candle.close = c.close;
        candle.volume += c.volume;
    }

    Some(candle)
}
