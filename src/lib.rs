// Core modules
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod models;
pub mod persistence;
pub mod report;

// Re-export commonly used types
pub use engine::{Ledger, SessionConfig, TradeSession};
pub use error::BotError;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, BotError>;
