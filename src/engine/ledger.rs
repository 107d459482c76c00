use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::BotError;
use crate::models::{AssetBalance, Balance, Position, PositionStatus};
use crate::persistence::{
    read_json, write_json, StateStore, KEY_BALANCES, KEY_CUMULATIVE_PROFIT, KEY_LAST_PRICE,
    KEY_POSITIONS, KEY_START_TIME,
};
use crate::Result;

/// Persisted run state for one trading pair.
///
/// Mutated only by the decision engine and the balance refresh; every
/// mutation is written back to the store before the next network call.
#[derive(Debug, Clone)]
pub struct Ledger {
    /// Entry lots in acquisition order
    pub positions: Vec<Position>,
    pub balances: HashMap<String, Balance>,
    /// Realized profit accumulated at each sale, never recomputed
    pub cumulative_profit: f64,
    /// Reference point for the next percent-change decision
    pub last_price: f64,
    pub start_time: DateTime<Utc>,
}

impl Ledger {
    pub fn fresh(start_time: DateTime<Utc>) -> Self {
        Self {
            positions: Vec::new(),
            balances: HashMap::new(),
            cumulative_profit: 0.0,
            last_price: 0.0,
            start_time,
        }
    }

    /// Load the persisted ledger, or initialize a fresh one when the pair has
    /// never been traded. Returns the ledger and whether it was resumed.
    ///
    /// A missing `positions` key signals a fresh run. If `positions` exists
    /// but a sibling key is gone, the state is half-written and resuming
    /// would guess, so that is fatal.
    pub async fn load_or_init<S: StateStore>(store: &mut S) -> Result<(Self, bool)> {
        let positions: Option<Vec<Position>> = read_json(store, KEY_POSITIONS).await?;
        let Some(positions) = positions else {
            return Ok((Self::fresh(Utc::now()), false));
        };

        let balances = read_json(store, KEY_BALANCES)
            .await?
            .ok_or_else(|| BotError::MissingStateKey(KEY_BALANCES.to_string()))?;
        let cumulative_profit = read_json(store, KEY_CUMULATIVE_PROFIT)
            .await?
            .ok_or_else(|| BotError::MissingStateKey(KEY_CUMULATIVE_PROFIT.to_string()))?;
        let last_price = read_json(store, KEY_LAST_PRICE)
            .await?
            .ok_or_else(|| BotError::MissingStateKey(KEY_LAST_PRICE.to_string()))?;
        let start_time = read_json(store, KEY_START_TIME)
            .await?
            .ok_or_else(|| BotError::MissingStateKey(KEY_START_TIME.to_string()))?;

        let ledger = Self {
            positions,
            balances,
            cumulative_profit,
            last_price,
            start_time,
        };

        tracing::info!(
            "Resumed ledger: {} positions ({} open), cumulative profit {:.8}",
            ledger.positions.len(),
            ledger.open_positions().len(),
            ledger.cumulative_profit
        );

        Ok((ledger, true))
    }

    /// Persist everything (fresh runs and resume snapshots).
    pub async fn persist_all<S: StateStore>(&self, store: &mut S) -> Result<()> {
        self.persist_trade(store).await?;
        write_json(store, KEY_LAST_PRICE, &self.last_price).await?;
        write_json(store, KEY_START_TIME, &self.start_time).await
    }

    /// Persist the state a buy or sell touches: positions, balances and the
    /// profit accumulator.
    pub async fn persist_trade<S: StateStore>(&self, store: &mut S) -> Result<()> {
        write_json(store, KEY_POSITIONS, &self.positions).await?;
        write_json(store, KEY_BALANCES, &self.balances).await?;
        write_json(store, KEY_CUMULATIVE_PROFIT, &self.cumulative_profit).await
    }

    pub async fn persist_positions<S: StateStore>(&self, store: &mut S) -> Result<()> {
        write_json(store, KEY_POSITIONS, &self.positions).await
    }

    pub async fn persist_balances<S: StateStore>(&self, store: &mut S) -> Result<()> {
        write_json(store, KEY_BALANCES, &self.balances).await
    }

    pub async fn persist_last_price<S: StateStore>(&self, store: &mut S) -> Result<()> {
        write_json(store, KEY_LAST_PRICE, &self.last_price).await
    }

    /// Advance every position against a new market price, computing the next
    /// position list in one pass.
    pub fn apply_price(&mut self, price: f64) {
        self.positions = self.positions.iter().map(|p| p.advanced(price)).collect();
    }

    /// Indices of the positions to liquidate: the `Selling` candidates, or
    /// every open position under force-sell.
    pub fn sell_candidates(&self, force: bool) -> Vec<usize> {
        self.positions
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                if force {
                    p.is_open()
                } else {
                    p.status == PositionStatus::Selling
                }
            })
            .map(|(i, _)| i)
            .collect()
    }

    /// Settle an aggregated sell fill across the batch.
    ///
    /// The exchange-reported executed quantity is distributed pro-rata by
    /// requested quantity; each position realizes its share at the fill
    /// price and the profit accumulator grows by exactly that amount.
    pub fn apply_sell_fill(&mut self, indices: &[usize], executed_qty: f64, fill_price: f64) {
        let requested: f64 = indices.iter().map(|&i| self.positions[i].quantity).sum();
        if requested <= 0.0 {
            return;
        }

        for &i in indices {
            let position = &mut self.positions[i];
            let executed_share = executed_qty * position.quantity / requested;
            position.profit = executed_share * (fill_price - position.buy_price);
            position.sold_price = fill_price;
            position.status = PositionStatus::Sold;
            self.cumulative_profit += position.profit;

            tracing::info!(
                "Sold {:.8} {} @ {:.8} (bought @ {:.8}, profit {:.8})",
                executed_share,
                position.symbol,
                fill_price,
                position.buy_price,
                position.profit
            );
        }
    }

    pub fn record_buy(&mut self, position: Position) {
        tracing::info!(
            "Bought {:.8} {} @ {:.8} (target {:.8})",
            position.quantity,
            position.symbol,
            position.buy_price,
            position.sell_target
        );
        self.positions.push(position);
    }

    /// Fold freshly fetched exchange balances into the tracked assets.
    /// `initial` is captured the first time an asset shows up and kept
    /// untouched afterwards.
    pub fn capture_balances(
        &mut self,
        fetched: &HashMap<String, AssetBalance>,
        assets: &[&str],
    ) {
        for asset in assets {
            let current = fetched.get(*asset).copied().unwrap_or_default();
            let entry = self
                .balances
                .entry(asset.to_string())
                .or_insert_with(|| Balance {
                    initial: current.available,
                    ..Balance::default()
                });
            entry.available = current.available;
            entry.on_order = current.on_order;
        }
    }

    pub fn open_positions(&self) -> Vec<&Position> {
        self.positions.iter().filter(|p| p.is_open()).collect()
    }

    pub fn available_quote(&self, quote_asset: &str) -> f64 {
        self.balances
            .get(quote_asset)
            .map(|b| b.available)
            .unwrap_or(0.0)
    }
}
