use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::api::Exchange;
use crate::config::{Credentials, Environment};
use crate::error::BotError;
use crate::filters::SymbolFilters;
use crate::models::{AssetBalance, Fill, OrderOutcome, OrderStatus};
use crate::Result;

const PRODUCTION_BASE: &str = "https://api.binance.com";
const TESTNET_BASE: &str = "https://testnet.binance.vision";

// Rejection codes that keep failing until an operator steps in:
// -1013 filter failure, -2014/-2015 API key problems.
const FATAL_REJECTION_CODES: &[i64] = &[-1013, -2014, -2015];

type HmacSha256 = Hmac<Sha256>;

/// Client for the Binance spot REST API (v3).
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct TickerPriceRaw {
    price: String,
}

#[derive(Debug, Deserialize)]
struct AccountRaw {
    balances: Vec<AccountBalanceRaw>,
}

#[derive(Debug, Deserialize)]
struct AccountBalanceRaw {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoRaw {
    symbols: Vec<SymbolInfoRaw>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfoRaw {
    symbol: String,
    // Filter objects vary by filterType, picked apart by hand below
    filters: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRaw {
    order_id: u64,
    status: String,
    executed_qty: String,
    // Binance's own spelling
    #[serde(default)]
    cummulative_quote_qty: Option<String>,
    #[serde(default)]
    fills: Vec<FillRaw>,
}

#[derive(Debug, Deserialize)]
struct FillRaw {
    price: String,
    qty: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorRaw {
    code: i64,
    msg: String,
}

// ============== Implementation ==============

impl BinanceClient {
    pub fn new(environment: Environment, credentials: Credentials) -> Self {
        let base_url = match environment {
            Environment::Production => PRODUCTION_BASE,
            Environment::Testnet => TESTNET_BASE,
        };
        Self::with_base_url(base_url.to_string(), credentials)
    }

    /// Point the client at an arbitrary base URL (used by tests).
    pub fn with_base_url(base_url: String, credentials: Credentials) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key: credentials.api_key,
            api_secret: credentials.api_secret,
        }
    }

    fn sign(&self, query: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| BotError::Config(format!("failed to initialize HMAC: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_url(&self, path: &str, query: &str) -> Result<String> {
        let query = format!("{}&timestamp={}", query, Utc::now().timestamp_millis());
        let signature = self.sign(&query)?;
        Ok(format!(
            "{}{}?{}&signature={}",
            self.base_url, path, query, signature
        ))
    }

    async fn parse_response<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json().await?);
        }

        let body = resp.text().await.unwrap_or_default();
        if let Ok(api_err) = serde_json::from_str::<ApiErrorRaw>(&body) {
            if FATAL_REJECTION_CODES.contains(&api_err.code) {
                return Err(BotError::OrderRejected(format!(
                    "{} (code {})",
                    api_err.msg, api_err.code
                )));
            }
            return Err(BotError::Exchange(format!(
                "{} (code {})",
                api_err.msg, api_err.code
            )));
        }
        Err(BotError::Exchange(format!("HTTP {}: {}", status, body)))
    }

    async fn submit_market_order(
        &self,
        symbol: &str,
        side: &str,
        quantity: f64,
    ) -> Result<OrderOutcome> {
        let query = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&newClientOrderId={}&newOrderRespType=FULL",
            symbol,
            side,
            quantity,
            Uuid::new_v4().simple()
        );
        let url = self.signed_url("/api/v3/order", &query)?;

        let resp = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        let raw: OrderRaw = Self::parse_response(resp).await?;

        tracing::debug!(
            symbol = %symbol,
            side = %side,
            order_id = raw.order_id,
            status = %raw.status,
            "Market order response"
        );

        order_outcome(raw)
    }
}

fn parse_f64(raw: &str, what: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|_| BotError::Parse(format!("bad {} in exchange response: {:?}", what, raw)))
}

fn order_outcome(raw: OrderRaw) -> Result<OrderOutcome> {
    let status = match raw.status.as_str() {
        "FILLED" => OrderStatus::Filled,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "NEW" | "EXPIRED" | "CANCELED" | "REJECTED" => OrderStatus::NotFilled(raw.status),
        other => return Err(BotError::UnexpectedOrderStatus(other.to_string())),
    };

    let mut fills = Vec::with_capacity(raw.fills.len());
    for fill in &raw.fills {
        fills.push(Fill {
            price: parse_f64(&fill.price, "fill price")?,
            qty: parse_f64(&fill.qty, "fill quantity")?,
        });
    }

    Ok(OrderOutcome {
        order_id: raw.order_id,
        status,
        executed_qty: parse_f64(&raw.executed_qty, "executed quantity")?,
        cumulative_quote_qty: match raw.cummulative_quote_qty {
            Some(ref v) => parse_f64(v, "quote volume")?,
            None => 0.0,
        },
        fills,
    })
}

fn filter_field(filters: &[serde_json::Value], filter_type: &str, field: &str) -> Option<f64> {
    filters
        .iter()
        .find(|f| f.get("filterType").and_then(|v| v.as_str()) == Some(filter_type))
        .and_then(|f| f.get(field))
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
}

fn symbol_filters(info: &SymbolInfoRaw) -> SymbolFilters {
    let lot = |field| filter_field(&info.filters, "LOT_SIZE", field).unwrap_or(0.0);
    let price = |field| filter_field(&info.filters, "PRICE_FILTER", field).unwrap_or(0.0);
    // Newer exchangeInfo uses NOTIONAL, older MIN_NOTIONAL
    let min_notional = filter_field(&info.filters, "NOTIONAL", "minNotional")
        .or_else(|| filter_field(&info.filters, "MIN_NOTIONAL", "minNotional"))
        .unwrap_or(0.0);

    SymbolFilters {
        min_qty: lot("minQty"),
        max_qty: lot("maxQty"),
        step_size: lot("stepSize"),
        min_notional,
        min_price: price("minPrice"),
        max_price: price("maxPrice"),
        tick_size: price("tickSize"),
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn get_price(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/api/v3/ticker/price?symbol={}", self.base_url, symbol);
        let resp = self.client.get(&url).send().await?;
        let raw: TickerPriceRaw = Self::parse_response(resp).await?;
        parse_f64(&raw.price, "price")
    }

    async fn get_balances(&self) -> Result<HashMap<String, AssetBalance>> {
        let url = self.signed_url("/api/v3/account", "omitZeroBalances=true")?;
        let resp = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        let raw: AccountRaw = Self::parse_response(resp).await?;

        let mut balances = HashMap::with_capacity(raw.balances.len());
        for entry in &raw.balances {
            balances.insert(
                entry.asset.clone(),
                AssetBalance {
                    available: parse_f64(&entry.free, "free balance")?,
                    on_order: parse_f64(&entry.locked, "locked balance")?,
                },
            );
        }
        Ok(balances)
    }

    async fn get_filters(&self, symbols: &[String]) -> Result<HashMap<String, SymbolFilters>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("symbols", serde_json::to_string(symbols)?)])
            .send()
            .await?;
        let raw: ExchangeInfoRaw = Self::parse_response(resp).await?;

        Ok(raw
            .symbols
            .iter()
            .map(|info| (info.symbol.clone(), symbol_filters(info)))
            .collect())
    }

    async fn market_buy(&self, symbol: &str, quantity: f64) -> Result<OrderOutcome> {
        self.submit_market_order(symbol, "BUY", quantity).await
    }

    async fn market_sell(&self, symbol: &str, quantity: f64) -> Result<OrderOutcome> {
        self.submit_market_order(symbol, "SELL", quantity).await
    }
}
