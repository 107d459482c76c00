use thiserror::Error;

/// Errors raised by the bot.
///
/// The split that matters at runtime is transient versus fatal: transient
/// errors cost one tick and the loop keeps going, fatal errors terminate the
/// process with a non-zero exit because continuing would risk mis-sized
/// orders or drifting state.
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exchange error: {0}")]
    Exchange(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Order rejected by exchange: {0}")]
    OrderRejected(String),

    #[error("Unexpected order status: {0}")]
    UnexpectedOrderStatus(String),

    #[error("No trading filters cached for symbol {0}")]
    UnknownSymbolFilters(String),

    #[error("Persisted state key missing: {0}")]
    MissingStateKey(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BotError {
    /// Transient errors skip the current tick; the loop retries on the next
    /// one. Everything else is fatal.
    pub fn is_transient(&self) -> bool {
        matches!(self, BotError::Exchange(_) | BotError::Http(_))
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BotError::Exchange("timeout".to_string()).is_transient());
        assert!(!BotError::Exchange("timeout".to_string()).is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(BotError::Config("bad amount".to_string()).is_fatal());
        assert!(BotError::UnknownSymbolFilters("BTCUSDT".to_string()).is_fatal());
        assert!(BotError::MissingStateKey("balances".to_string()).is_fatal());
        assert!(BotError::UnexpectedOrderStatus("PENDING_CANCEL".to_string()).is_fatal());
        assert!(BotError::OrderRejected("bad filter".to_string()).is_fatal());
        assert!(BotError::Store("connection refused".to_string()).is_fatal());
    }
}
