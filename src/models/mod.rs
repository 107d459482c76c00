use serde::{Deserialize, Serialize};

/// Lifecycle of one entry lot.
///
/// Transitions are monotonic: `Buying -> Bought -> Selling -> Sold`. A
/// position never regresses, and a `Buying` position that fails to fill is
/// discarded rather than persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Buying,
    Bought,
    Selling,
    Sold,
}

/// One entry lot bought on a dip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Order id assigned by the exchange on fill; absent until bought
    pub id: Option<u64>,
    pub symbol: String,
    /// Base-asset amount, normalized to the exchange step size
    pub quantity: f64,
    /// Fill price at acquisition, quote per base unit
    pub buy_price: f64,
    /// Trailing trigger: sell once price falls back below this
    pub sell_target: f64,
    /// Fill price at liquidation, 0 until sold
    pub sold_price: f64,
    /// Realized profit in quote units, computed at sale
    pub profit: f64,
    pub status: PositionStatus,
}

impl Position {
    /// A buy attempt that has been submitted but not confirmed. Never
    /// persisted; promoted via [`Position::filled`] or dropped.
    pub fn entry(symbol: &str, quantity: f64) -> Self {
        Self {
            id: None,
            symbol: symbol.to_string(),
            quantity,
            buy_price: 0.0,
            sell_target: 0.0,
            sold_price: 0.0,
            profit: 0.0,
            status: PositionStatus::Buying,
        }
    }

    /// Promote a `Buying` attempt with the exchange-reported fill. The
    /// trailing target starts at the fill price.
    pub fn filled(mut self, order_id: u64, executed_qty: f64, fill_price: f64) -> Self {
        self.id = Some(order_id);
        self.quantity = executed_qty;
        self.buy_price = fill_price;
        self.sell_target = fill_price;
        self.status = PositionStatus::Bought;
        self
    }

    /// Compute the next state of this position for a new market price.
    ///
    /// A `Bought` position whose target is undercut flips to `Selling`;
    /// otherwise the target ratchets up to the price. All other states are
    /// unchanged.
    pub fn advanced(&self, price: f64) -> Position {
        let mut next = self.clone();
        if self.status == PositionStatus::Bought {
            if price < self.sell_target {
                next.status = PositionStatus::Selling;
            } else {
                next.sell_target = price;
            }
        }
        next
    }

    /// Open means holding inventory: bought or waiting to liquidate.
    pub fn is_open(&self) -> bool {
        matches!(
            self.status,
            PositionStatus::Bought | PositionStatus::Selling
        )
    }
}

/// Spot balance as reported by the exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub available: f64,
    pub on_order: f64,
}

/// Per-asset balance tracked across the run. `initial` is captured on the
/// first run of a pair and never overwritten on resume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub initial: f64,
    pub available: f64,
    pub on_order: f64,
}

/// Single fill of a market order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Fill {
    pub price: f64,
    pub qty: f64,
}

/// Recognized terminal states of a submitted market order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Filled,
    PartiallyFilled,
    /// Recognized non-fill outcome (expired, canceled, rejected); the order
    /// simply did not execute this tick
    NotFilled(String),
}

/// Result of a market order as reported by the exchange.
#[derive(Debug, Clone)]
pub struct OrderOutcome {
    pub order_id: u64,
    pub status: OrderStatus,
    /// Executed base quantity; authoritative over the requested quantity
    pub executed_qty: f64,
    pub cumulative_quote_qty: f64,
    pub fills: Vec<Fill>,
}

impl OrderOutcome {
    pub fn is_fill(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Filled | OrderStatus::PartiallyFilled
        )
    }

    /// Volume-weighted fill price across the fills array, falling back to
    /// cumulative quote volume over executed quantity.
    pub fn avg_fill_price(&self) -> Option<f64> {
        let qty: f64 = self.fills.iter().map(|f| f.qty).sum();
        if qty > 0.0 {
            let quote: f64 = self.fills.iter().map(|f| f.price * f.qty).sum();
            return Some(quote / qty);
        }
        if self.executed_qty > 0.0 && self.cumulative_quote_qty > 0.0 {
            return Some(self.cumulative_quote_qty / self.executed_qty);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bought(buy_price: f64, sell_target: f64) -> Position {
        Position {
            id: Some(42),
            symbol: "BTCUSDT".to_string(),
            quantity: 0.5,
            buy_price,
            sell_target,
            sold_price: 0.0,
            profit: 0.0,
            status: PositionStatus::Bought,
        }
    }

    #[test]
    fn test_target_ratchets_while_price_climbs() {
        let position = bought(100.0, 100.0);

        let position = position.advanced(101.0);
        assert_eq!(position.status, PositionStatus::Bought);
        assert_eq!(position.sell_target, 101.0);

        let position = position.advanced(105.0);
        assert_eq!(position.sell_target, 105.0);

        // Equal price holds the target and stays bought
        let position = position.advanced(105.0);
        assert_eq!(position.status, PositionStatus::Bought);
        assert_eq!(position.sell_target, 105.0);
    }

    #[test]
    fn test_pullback_below_target_flips_to_selling() {
        let position = bought(100.0, 105.0);

        let position = position.advanced(104.9);
        assert_eq!(position.status, PositionStatus::Selling);
        // Target is frozen at the high water mark
        assert_eq!(position.sell_target, 105.0);
    }

    #[test]
    fn test_sold_position_never_regresses() {
        let mut position = bought(100.0, 105.0);
        position.status = PositionStatus::Sold;
        position.sold_price = 105.0;

        let next = position.advanced(90.0);
        assert_eq!(next.status, PositionStatus::Sold);

        let next = position.advanced(200.0);
        assert_eq!(next.status, PositionStatus::Sold);
        assert_eq!(next.sell_target, 105.0);
    }

    #[test]
    fn test_selling_position_stays_selling() {
        let mut position = bought(100.0, 105.0);
        position.status = PositionStatus::Selling;

        // Price recovering above the target does not un-mark the candidate
        let next = position.advanced(110.0);
        assert_eq!(next.status, PositionStatus::Selling);
    }

    #[test]
    fn test_entry_fill_promotion() {
        let attempt = Position::entry("ETHUSDT", 0.05);
        assert_eq!(attempt.status, PositionStatus::Buying);
        assert_eq!(attempt.id, None);

        let position = attempt.filled(77, 0.04, 2_500.0);
        assert_eq!(position.status, PositionStatus::Bought);
        assert_eq!(position.id, Some(77));
        assert_eq!(position.quantity, 0.04);
        assert_eq!(position.buy_price, 2_500.0);
        assert_eq!(position.sell_target, 2_500.0);
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&PositionStatus::Selling).unwrap();
        assert_eq!(json, "\"SELLING\"");

        let status: PositionStatus = serde_json::from_str("\"BOUGHT\"").unwrap();
        assert_eq!(status, PositionStatus::Bought);
    }

    #[test]
    fn test_avg_fill_price_weighted() {
        let outcome = OrderOutcome {
            order_id: 1,
            status: OrderStatus::Filled,
            executed_qty: 3.0,
            cumulative_quote_qty: 0.0,
            fills: vec![
                Fill { price: 10.0, qty: 1.0 },
                Fill { price: 13.0, qty: 2.0 },
            ],
        };
        assert_eq!(outcome.avg_fill_price(), Some(12.0));
    }

    #[test]
    fn test_avg_fill_price_fallback_to_quote_volume() {
        let outcome = OrderOutcome {
            order_id: 1,
            status: OrderStatus::Filled,
            executed_qty: 2.0,
            cumulative_quote_qty: 190.0,
            fills: Vec::new(),
        };
        assert_eq!(outcome.avg_fill_price(), Some(95.0));
    }
}
