use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::engine::Ledger;

/// Elapsed run time as `HH:MM:SS`.
pub fn elapsed_hms(start: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - start).num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn signed(value: f64) -> colored::ColoredString {
    let text = format!("{:+.8}", value);
    if value > 0.0 {
        text.green()
    } else if value < 0.0 {
        text.red()
    } else {
        text.normal()
    }
}

/// Print the per-tick status block: elapsed time, cumulative profit,
/// balances and the price move since the last tick.
pub fn status(ledger: &Ledger, price: f64, reference_price: f64) {
    let delta = if reference_price > 0.0 {
        price - reference_price
    } else {
        0.0
    };

    println!(
        "{} elapsed {} | price {:.8} ({}) | profit {} | open {}",
        "◆".cyan(),
        elapsed_hms(ledger.start_time, Utc::now()),
        price,
        signed(delta),
        signed(ledger.cumulative_profit),
        ledger.open_positions().len()
    );

    let mut assets: Vec<_> = ledger.balances.iter().collect();
    assets.sort_by(|a, b| a.0.cmp(b.0));
    for (asset, balance) in assets {
        println!(
            "  {:<6} available {:.8} | on order {:.8} | initial {:.8}",
            asset, balance.available, balance.on_order, balance.initial
        );
    }
}
