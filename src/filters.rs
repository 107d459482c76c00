use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::BotError;
use crate::Result;

// Absorbs float representation error, well below one step in scaled units.
const STEP_EPSILON: f64 = 1e-6;

/// Trading rules for one symbol, fetched once per run from the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymbolFilters {
    pub min_qty: f64,
    pub max_qty: f64,
    pub step_size: f64,
    pub min_notional: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub tick_size: f64,
}

impl SymbolFilters {
    /// Size an order quantity so the exchange will accept it: raise to the
    /// minimum quantity, raise to the minimum notional at the given price,
    /// then round down to the step size.
    pub fn normalize_quantity(&self, raw_qty: f64, price: f64) -> f64 {
        let mut qty = raw_qty.max(self.min_qty);
        if price > 0.0 && price * qty < self.min_notional {
            qty = self.min_notional / price;
        }
        round_down_to_step(qty, self.step_size)
    }

    /// Round a price to the nearest multiple of the tick size.
    pub fn normalize_price(&self, raw_price: f64) -> f64 {
        if self.tick_size <= 0.0 {
            return raw_price;
        }
        (raw_price / self.tick_size).round() * self.tick_size
    }
}

fn round_down_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    ((value / step) + STEP_EPSILON).floor() * step
}

/// Per-symbol trading rules cached for the run.
///
/// Orders for a symbol without cached filters would be rejected by the
/// exchange, so a lookup miss is fatal.
#[derive(Debug, Clone, Default)]
pub struct FilterCache {
    filters: HashMap<String, SymbolFilters>,
}

impl FilterCache {
    pub fn new(filters: HashMap<String, SymbolFilters>) -> Self {
        Self { filters }
    }

    pub fn get(&self, symbol: &str) -> Result<&SymbolFilters> {
        self.filters
            .get(symbol)
            .ok_or_else(|| BotError::UnknownSymbolFilters(symbol.to_string()))
    }

    pub fn normalize_quantity(&self, symbol: &str, raw_qty: f64, price: f64) -> Result<f64> {
        Ok(self.get(symbol)?.normalize_quantity(raw_qty, price))
    }

    pub fn normalize_price(&self, symbol: &str, raw_price: f64) -> Result<f64> {
        Ok(self.get(symbol)?.normalize_price(raw_price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> SymbolFilters {
        SymbolFilters {
            min_qty: 0.01,
            max_qty: 9_000.0,
            step_size: 0.01,
            min_notional: 10.0,
            min_price: 0.01,
            max_price: 1_000_000.0,
            tick_size: 0.01,
        }
    }

    #[test]
    fn test_rounds_down_to_step() {
        let qty = filters().normalize_quantity(1.2345, 100.0);
        assert!((qty - 1.23).abs() < 1e-9);
    }

    #[test]
    fn test_raises_to_min_qty() {
        let qty = filters().normalize_quantity(0.001, 20_000.0);
        assert!((qty - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_raises_to_min_notional() {
        // 0.02 * 100 = 2 quote units, below the 10 minimum
        let qty = filters().normalize_quantity(0.02, 100.0);
        assert!((qty - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_quantity_idempotent() {
        let f = filters();
        for raw in [0.001, 0.02, 0.123, 1.2345, 7.77777, 42.0] {
            let once = f.normalize_quantity(raw, 100.0);
            let twice = f.normalize_quantity(once, 100.0);
            assert_eq!(once, twice, "raw quantity {}", raw);
        }
    }

    #[test]
    fn test_normalize_quantity_idempotent_fine_step() {
        let f = SymbolFilters {
            min_qty: 0.00001,
            max_qty: 9_000.0,
            step_size: 0.00001,
            min_notional: 5.0,
            min_price: 0.01,
            max_price: 1_000_000.0,
            tick_size: 0.01,
        };
        for raw in [0.000123, 0.00017, 0.0301, 0.123456789] {
            let once = f.normalize_quantity(raw, 97_000.0);
            let twice = f.normalize_quantity(once, 97_000.0);
            assert_eq!(once, twice, "raw quantity {}", raw);
        }
    }

    #[test]
    fn test_normalize_price_rounds_to_tick() {
        let f = filters();
        assert!((f.normalize_price(100.006) - 100.01).abs() < 1e-9);
        assert!((f.normalize_price(100.004) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_step_passes_through() {
        let mut f = filters();
        f.step_size = 0.0;
        f.tick_size = 0.0;
        assert_eq!(f.normalize_quantity(1.2345, 100.0), 1.2345);
        assert_eq!(f.normalize_price(100.006), 100.006);
    }

    #[test]
    fn test_cache_lookup_miss_is_fatal() {
        let cache = FilterCache::default();
        let err = cache.normalize_quantity("DOGEUSDT", 1.0, 0.1).unwrap_err();
        assert!(matches!(err, BotError::UnknownSymbolFilters(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_cache_hit() {
        let mut map = HashMap::new();
        map.insert("BTCUSDT".to_string(), filters());
        let cache = FilterCache::new(map);

        let qty = cache.normalize_quantity("BTCUSDT", 1.2345, 100.0).unwrap();
        assert!((qty - 1.23).abs() < 1e-9);
    }
}
