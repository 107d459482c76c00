pub mod ledger;
pub mod runner;
pub mod session;

pub use ledger::Ledger;
pub use session::{plan_buy, plan_sell, BuyPlan, SellPlan, SessionConfig, TradeSession};
