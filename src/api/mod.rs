pub mod binance;

pub use binance::BinanceClient;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::filters::SymbolFilters;
use crate::models::{AssetBalance, OrderOutcome};
use crate::Result;

/// Narrow gateway to the exchange.
///
/// Every call is fallible; a non-success outcome means "no fill this tick"
/// and is never retried within the same tick.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Current market price for a symbol, quote per base unit.
    async fn get_price(&self, symbol: &str) -> Result<f64>;

    /// Spot balances for every asset on the account.
    async fn get_balances(&self) -> Result<HashMap<String, AssetBalance>>;

    /// Trading-rule filters for the given symbols.
    async fn get_filters(&self, symbols: &[String]) -> Result<HashMap<String, SymbolFilters>>;

    /// Submit a market buy for `quantity` of the base asset.
    async fn market_buy(&self, symbol: &str, quantity: f64) -> Result<OrderOutcome>;

    /// Submit a market sell for `quantity` of the base asset.
    async fn market_sell(&self, symbol: &str, quantity: f64) -> Result<OrderOutcome>;
}
