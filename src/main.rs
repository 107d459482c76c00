use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::time::Duration;

use spotbot::api::BinanceClient;
use spotbot::config::{credentials_for, redis_url, Environment, Settings};
use spotbot::engine::{runner, SessionConfig, TradeSession};
use spotbot::error::BotError;
use spotbot::persistence::RedisStore;
use spotbot::report;

#[derive(Parser)]
#[command(
    name = "spotbot",
    version,
    about = "Crypto spot trading bot: buys the dips, sells the rallies"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trading loop for a pair
    Trade {
        /// Ticker symbol of the crypto to trade, e.g. BTC, ETH, MATIC
        market1: String,
        /// Ticker symbol to pair with, usually a stable coin like USDT or DAI
        market2: String,
        /// Quote-currency amount to spend on each buy
        amount: String,
        /// Exchange environment to trade against
        #[arg(value_enum)]
        environment: Environment,
        /// Restart the process from the last persisted state
        #[arg(short, long)]
        resume: bool,
    },
    /// Run the sell path once at the current market price
    Sell {
        /// Ticker symbol of the crypto to trade
        market1: String,
        /// Ticker symbol of the pairing currency
        market2: String,
        /// Exchange environment to trade against
        #[arg(value_enum)]
        environment: Environment,
        /// Liquidate every open position regardless of sell targets
        #[arg(short, long)]
        force: bool,
    },
}

fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "spotbot=info".to_string()),
        )
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    setup_logging();

    println!("{}", "WELCOME TO SPOTBOT - CRYPTO SPOT TRADING".yellow().bold());

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("{} {}", "✗".red().bold(), e.to_string().red());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env().context("reading settings from environment")?;

    match cli.command {
        Commands::Trade {
            market1,
            market2,
            amount,
            environment,
            resume,
        } => {
            let amount: f64 = amount
                .parse()
                .map_err(|_| BotError::Config(format!("order amount is not a number: {}", amount)))?;
            settings.validate_order_amount(amount)?;

            let config = SessionConfig::new(&market1, &market2, amount, settings.percent_drop);
            let exchange = BinanceClient::new(environment, credentials_for(environment)?);
            let store = RedisStore::connect(&redis_url(), &config.symbol).await?;

            let mut session = TradeSession::bootstrap(exchange, store, config, resume)
                .await
                .context("bootstrapping trading session")?;
            runner::run(
                &mut session,
                Duration::from_millis(settings.poll_interval_ms),
                Duration::from_millis(settings.error_backoff_ms),
            )
            .await?;
        }
        Commands::Sell {
            market1,
            market2,
            environment,
            force,
        } => {
            let config = SessionConfig::new(&market1, &market2, 0.0, settings.percent_drop);
            let exchange = BinanceClient::new(environment, credentials_for(environment)?);
            let store = RedisStore::connect(&redis_url(), &config.symbol).await?;

            let mut session = TradeSession::bootstrap(exchange, store, config, true)
                .await
                .context("bootstrapping sell session")?;
            let price = session.sell_once(force).await?;
            report::status(session.ledger(), price, session.ledger().last_price);
        }
    }

    Ok(())
}
