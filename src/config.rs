use crate::error::BotError;
use crate::Result;

const DEFAULT_PERCENT_DROP: f64 = 5.0;
const DEFAULT_POLL_INTERVAL_MS: u64 = 30_000;
const DEFAULT_ERROR_BACKOFF_MS: u64 = 5_000;
const DEFAULT_MIN_ORDER_AMOUNT: f64 = 10.0;
const DEFAULT_MAX_ORDER_AMOUNT: f64 = 1_000.0;

/// Which exchange endpoint and credential pair to trade against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Environment {
    /// Live exchange with real funds
    Production,
    /// Sandboxed test endpoint
    Testnet,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

/// Runtime options sourced from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Percent drop versus the last observed price that triggers a buy
    pub percent_drop: f64,
    /// Sleep between polling iterations, in milliseconds
    pub poll_interval_ms: u64,
    /// Sleep after a failed tick before retrying, in milliseconds
    pub error_backoff_ms: u64,
    /// Smallest order amount the operator may configure, in quote units
    pub min_order_amount: f64,
    /// Largest order amount the operator may configure, in quote units
    pub max_order_amount: f64,
}

impl Settings {
    /// Read settings from environment variables. Absent variables fall back
    /// to defaults; present-but-invalid values are configuration errors.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            percent_drop: parse_var("APP_PERCENT_DROP", DEFAULT_PERCENT_DROP)?,
            poll_interval_ms: parse_var("APP_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?,
            error_backoff_ms: parse_var("APP_ERROR_BACKOFF_MS", DEFAULT_ERROR_BACKOFF_MS)?,
            min_order_amount: parse_var("APP_MIN_ORDER_AMOUNT", DEFAULT_MIN_ORDER_AMOUNT)?,
            max_order_amount: parse_var("APP_MAX_ORDER_AMOUNT", DEFAULT_MAX_ORDER_AMOUNT)?,
        })
    }

    /// Validate the per-buy order amount against the configured bounds.
    pub fn validate_order_amount(&self, amount: f64) -> Result<()> {
        if !amount.is_finite() || amount < self.min_order_amount || amount > self.max_order_amount
        {
            return Err(BotError::Config(format!(
                "order amount {} outside allowed range [{}, {}]",
                amount, self.min_order_amount, self.max_order_amount
            )));
        }
        Ok(())
    }
}

/// Credential pair for the selected environment.
///
/// Variable names follow the deployment convention: `APP_BINANCE_APIKEY` /
/// `APP_BINANCE_SECRET` for production, the `_TESTNET_` pair for the sandbox.
pub fn credentials_for(environment: Environment) -> Result<Credentials> {
    let (key_var, secret_var) = match environment {
        Environment::Production => ("APP_BINANCE_APIKEY", "APP_BINANCE_SECRET"),
        Environment::Testnet => ("APP_BINANCE_TESTNET_APIKEY", "APP_BINANCE_TESTNET_SECRET"),
    };

    Ok(Credentials {
        api_key: require_var(key_var)?,
        api_secret: require_var(secret_var)?,
    })
}

pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn require_var(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BotError::Config(format!("{} not found in environment", name)))
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| BotError::Config(format!("invalid value for {}: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            percent_drop: 5.0,
            poll_interval_ms: 30_000,
            error_backoff_ms: 5_000,
            min_order_amount: 10.0,
            max_order_amount: 1_000.0,
        }
    }

    #[test]
    fn test_order_amount_within_range() {
        assert!(settings().validate_order_amount(50.0).is_ok());
        assert!(settings().validate_order_amount(10.0).is_ok());
        assert!(settings().validate_order_amount(1_000.0).is_ok());
    }

    #[test]
    fn test_order_amount_outside_range() {
        assert!(settings().validate_order_amount(5.0).is_err());
        assert!(settings().validate_order_amount(5_000.0).is_err());
        assert!(settings().validate_order_amount(f64::NAN).is_err());
    }
}
