use crate::models::Candle;
use chrono::{Duration, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Intraday price paths for synthetic sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady rise, +0.2% a minute with noise
    Uptrend,
    /// Steady fall, -0.2% a minute with noise
    Downtrend,
    /// Rise over the first half, fall over the second
    RiseThenFall,
    /// Mean-reverting chop around the base price
    Sideways,
}

/// Generates one-minute candles from a seeded RNG so runs are reproducible
pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
}

impl SyntheticDataGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 100.0,
            base_volume: 10_000.0,
        }
    }

    pub fn with_base_price(mut self, price: f64) -> Self {
        self.base_price = price;
        self
    }

    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    /// `minutes` consecutive one-minute candles for `symbol` starting at `start`
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        symbol: &str,
        start: NaiveDateTime,
        minutes: usize,
    ) -> Vec<Candle> {
        let mut candles = Vec::with_capacity(minutes);
        let mut price = self.base_price;
        let turn = minutes / 2;

        for i in 0..minutes {
            let open = price;
            price = match scenario {
                MarketScenario::Uptrend => self.drift(price, 0.002),
                MarketScenario::Downtrend => self.drift(price, -0.002),
                MarketScenario::RiseThenFall if i < turn => self.drift(price, 0.002),
                MarketScenario::RiseThenFall => self.drift(price, -0.002),
                MarketScenario::Sideways => {
                    // 10% pull back to the base each minute
                    let reversion = (self.base_price - price) * 0.1;
                    price + reversion + price * self.rng.gen_range(-0.002..0.002)
                }
            };

            let timestamp = start + Duration::minutes(i as i64);
            candles.push(self.create_candle(symbol, timestamp, open, price));
        }

        candles
    }

    /// Move by `rate` with noise well below the drift so the direction holds
    fn drift(&mut self, price: f64, rate: f64) -> f64 {
        let noise = self.rng.gen_range(-0.0005..0.0005);
        price * (1.0 + rate + noise)
    }

    fn create_candle(&mut self, symbol: &str, timestamp: NaiveDateTime, open: f64, close: f64) -> Candle {
        let wick = open.max(close) * self.rng.gen_range(0.0..0.001);
        let volume = self.base_volume * self.rng.gen_range(0.5..1.5);

        Candle {
            symbol: symbol.to_string(),
            timestamp,
            open,
            high: open.max(close) + wick,
            low: open.min(close) - wick,
            close,
            volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn open() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 12, 3)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap()
    }

    #[test]
    fn test_generate_uptrend() {
        let mut gen = SyntheticDataGenerator::new(42);
        let candles = gen.generate(MarketScenario::Uptrend, "IEX", open(), 60);

        assert_eq!(candles.len(), 60);
        assert!(candles.windows(2).all(|w| w[1].close > w[0].close));
    }

    #[test]
    fn test_generate_downtrend() {
        let mut gen = SyntheticDataGenerator::new(42);
        let candles = gen.generate(MarketScenario::Downtrend, "IEX", open(), 60);

        assert!(candles.windows(2).all(|w| w[1].close < w[0].close));
    }

    #[test]
    fn test_rise_then_fall_peaks_in_the_middle() {
        let mut gen = SyntheticDataGenerator::new(7);
        let candles = gen.generate(MarketScenario::RiseThenFall, "IEX", open(), 40);

        let peak = candles
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.close.total_cmp(&b.1.close))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 19);
    }

    #[test]
    fn test_generate_sideways() {
        let mut gen = SyntheticDataGenerator::new(42);
        let candles = gen.generate(MarketScenario::Sideways, "IEX", open(), 375);

        let base = gen.base_price();
        for candle in &candles {
            assert!(
                candle.close > base * 0.95 && candle.close < base * 1.05,
                "Sideways should stay near base: {} vs {}",
                candle.close,
                base
            );
        }
    }

    #[test]
    fn test_same_seed_same_candles() {
        let a = SyntheticDataGenerator::new(1).generate(MarketScenario::Sideways, "IEX", open(), 30);
        let b = SyntheticDataGenerator::new(1).generate(MarketScenario::Sideways, "IEX", open(), 30);
        assert_eq!(a, b);
    }

    #[test]
    fn test_minute_timestamps_and_ohlc_consistency() {
        let mut gen = SyntheticDataGenerator::new(42);
        let candles = gen.generate(MarketScenario::RiseThenFall, "IEX", open(), 100);

        assert_eq!(candles[0].timestamp, open());
        for (i, candle) in candles.iter().enumerate() {
            assert_eq!(candle.timestamp, open() + Duration::minutes(i as i64));
            assert!(candle.high >= candle.close.max(candle.open));
            assert!(candle.low <= candle.close.min(candle.open));
        }
    }
}
