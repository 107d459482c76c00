use chrono::Utc;

use crate::api::Exchange;
use crate::engine::Ledger;
use crate::filters::FilterCache;
use crate::models::{OrderStatus, Position};
use crate::persistence::StateStore;
use crate::Result;

/// Per-pair trading parameters, fixed for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub base_asset: String,
    pub quote_asset: String,
    /// Concatenated trading pair, e.g. BTC + USDT -> BTCUSDT
    pub symbol: String,
    /// Quote-currency budget for each buy
    pub order_amount: f64,
    /// Percent drop versus the last observed price that triggers a buy
    pub percent_drop: f64,
}

impl SessionConfig {
    pub fn new(base_asset: &str, quote_asset: &str, order_amount: f64, percent_drop: f64) -> Self {
        let base_asset = base_asset.to_uppercase();
        let quote_asset = quote_asset.to_uppercase();
        let symbol = format!("{}{}", base_asset, quote_asset);
        Self {
            base_asset,
            quote_asset,
            symbol,
            order_amount,
            percent_drop,
        }
    }
}

/// A buy sized and cleared for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyPlan {
    pub quantity: f64,
    pub percent_drop: f64,
}

/// An aggregated liquidation of one or more positions.
#[derive(Debug, Clone, PartialEq)]
pub struct SellPlan {
    pub quantity: f64,
    pub indices: Vec<usize>,
}

/// Decide whether this tick buys the dip.
///
/// Only considered while price is falling versus the ledger's reference
/// price; the drop must reach the configured threshold and the available
/// quote balance must cover the budget (a short balance skips the buy, it is
/// not an error). At most one plan per tick.
pub fn plan_buy(
    ledger: &Ledger,
    filters: &FilterCache,
    config: &SessionConfig,
    price: f64,
) -> Result<Option<BuyPlan>> {
    if ledger.last_price <= 0.0 || price >= ledger.last_price {
        return Ok(None);
    }

    let percent_drop = 100.0 * (ledger.last_price - price) / ledger.last_price;
    if percent_drop < config.percent_drop {
        tracing::debug!(
            "Drop of {:.2}% below the {:.2}% threshold, holding",
            percent_drop,
            config.percent_drop
        );
        return Ok(None);
    }

    let available = ledger.available_quote(&config.quote_asset);
    if available < config.order_amount {
        tracing::info!(
            "Buy skipped: {:.8} {} available, need {:.8}",
            available,
            config.quote_asset,
            config.order_amount
        );
        return Ok(None);
    }

    let quantity =
        filters.normalize_quantity(&config.symbol, config.order_amount / price, price)?;
    if quantity <= 0.0 {
        return Ok(None);
    }

    Ok(Some(BuyPlan {
        quantity,
        percent_drop,
    }))
}

/// Collect the positions to liquidate into one aggregated market sell.
pub fn plan_sell(
    ledger: &Ledger,
    filters: &FilterCache,
    config: &SessionConfig,
    price: f64,
    force: bool,
) -> Result<Option<SellPlan>> {
    let indices = ledger.sell_candidates(force);
    if indices.is_empty() {
        return Ok(None);
    }

    let total: f64 = indices.iter().map(|&i| ledger.positions[i].quantity).sum();
    let quantity = filters.normalize_quantity(&config.symbol, total, price)?;
    if quantity <= 0.0 {
        return Ok(None);
    }

    Ok(Some(SellPlan { quantity, indices }))
}

/// One running trading pair: the gateway, the store, the cached exchange
/// filters and the ledger, driven tick by tick.
pub struct TradeSession<E: Exchange, S: StateStore> {
    exchange: E,
    store: S,
    config: SessionConfig,
    filters: FilterCache,
    ledger: Ledger,
}

impl<E: Exchange, S: StateStore> TradeSession<E, S> {
    /// Build a session: load or initialize the ledger, fetch the trading
    /// rules once, and capture balances (fixing `initial` on a fresh run).
    pub async fn bootstrap(
        exchange: E,
        mut store: S,
        config: SessionConfig,
        resume: bool,
    ) -> Result<Self> {
        let (mut ledger, resumed) = if resume {
            Ledger::load_or_init(&mut store).await?
        } else {
            (Ledger::fresh(Utc::now()), false)
        };

        if resume && !resumed {
            tracing::info!("No persisted state for {}, starting fresh", config.symbol);
        }

        let filters = FilterCache::new(exchange.get_filters(&[config.symbol.clone()]).await?);
        // Orders would be rejected without the symbol's rules, so fail now
        filters.get(&config.symbol)?;

        let fetched = exchange.get_balances().await?;
        ledger.capture_balances(
            &fetched,
            &[config.base_asset.as_str(), config.quote_asset.as_str()],
        );
        ledger.persist_all(&mut store).await?;

        tracing::info!(
            "Session ready for {} ({} open positions, {:.8} {} available)",
            config.symbol,
            ledger.open_positions().len(),
            ledger.available_quote(&config.quote_asset),
            config.quote_asset
        );

        Ok(Self {
            exchange,
            store,
            config,
            filters,
            ledger,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub async fn current_price(&self) -> Result<f64> {
        self.exchange.get_price(&self.config.symbol).await
    }

    /// One trading iteration against a fetched price: sell evaluation first,
    /// then the buy decision, then a balance refresh, then the new reference
    /// price is persisted.
    pub async fn tick(&mut self, price: f64) -> Result<()> {
        self.ledger.apply_price(price);
        self.ledger.persist_positions(&mut self.store).await?;
        self.run_sell(price, false).await?;

        if let Some(plan) = plan_buy(&self.ledger, &self.filters, &self.config, price)? {
            self.execute_buy(plan, price).await?;
        }

        self.refresh_balances().await?;

        self.ledger.last_price = price;
        self.ledger.persist_last_price(&mut self.store).await?;
        Ok(())
    }

    /// Run the sell path once at the current market price, outside the loop.
    /// Returns the price the evaluation ran at.
    pub async fn sell_once(&mut self, force: bool) -> Result<f64> {
        let price = self.current_price().await?;
        self.ledger.apply_price(price);
        self.ledger.persist_positions(&mut self.store).await?;
        self.run_sell(price, force).await?;
        self.refresh_balances().await?;
        Ok(price)
    }

    /// Submit the aggregated sell for this tick's candidates, if any.
    ///
    /// A recognized non-fill or a transient transport failure leaves the
    /// candidates `Selling` for the next tick; fatal rejections propagate.
    async fn run_sell(&mut self, price: f64, force: bool) -> Result<()> {
        let Some(plan) = plan_sell(&self.ledger, &self.filters, &self.config, price, force)?
        else {
            return Ok(());
        };

        tracing::info!(
            "Selling {:.8} {} across {} position(s)",
            plan.quantity,
            self.config.symbol,
            plan.indices.len()
        );

        match self
            .exchange
            .market_sell(&self.config.symbol, plan.quantity)
            .await
        {
            Ok(outcome) if outcome.is_fill() => {
                let fill_price = outcome.avg_fill_price().unwrap_or(price);
                self.ledger
                    .apply_sell_fill(&plan.indices, outcome.executed_qty, fill_price);
                self.ledger.persist_trade(&mut self.store).await?;
            }
            Ok(outcome) => {
                if let OrderStatus::NotFilled(reason) = outcome.status {
                    tracing::warn!("Sell not filled this tick ({}), will retry", reason);
                }
            }
            Err(e) if e.is_transient() => {
                tracing::warn!("Sell failed this tick ({}), will retry", e);
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Submit the planned buy. The attempt rides as an unpersisted `Buying`
    /// position and is discarded unless the exchange confirms a fill.
    async fn execute_buy(&mut self, plan: BuyPlan, price: f64) -> Result<()> {
        tracing::info!(
            "Price dropped {:.2}%, buying {:.8} {}",
            plan.percent_drop,
            plan.quantity,
            self.config.symbol
        );

        let attempt = Position::entry(&self.config.symbol, plan.quantity);

        match self
            .exchange
            .market_buy(&self.config.symbol, plan.quantity)
            .await
        {
            Ok(outcome) if outcome.is_fill() => {
                let fill_price = outcome.avg_fill_price().unwrap_or(price);
                let position = attempt.filled(outcome.order_id, outcome.executed_qty, fill_price);
                self.ledger.record_buy(position);
                self.ledger.persist_trade(&mut self.store).await?;
            }
            Ok(outcome) => {
                if let OrderStatus::NotFilled(reason) = outcome.status {
                    tracing::warn!("Buy not filled ({}), attempt discarded", reason);
                }
            }
            Err(e) if e.is_transient() => {
                tracing::warn!("Buy failed this tick ({}), attempt discarded", e);
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Pull fresh balances from the exchange and persist them.
    async fn refresh_balances(&mut self) -> Result<()> {
        let fetched = self.exchange.get_balances().await?;
        self.ledger.capture_balances(
            &fetched,
            &[self.config.base_asset.as_str(), self.config.quote_asset.as_str()],
        );
        self.ledger.persist_balances(&mut self.store).await
    }
}
