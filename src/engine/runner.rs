use tokio::time::Duration;

use crate::api::Exchange;
use crate::engine::TradeSession;
use crate::persistence::StateStore;
use crate::report;
use crate::Result;

/// Drive a session until shutdown: fetch the price, run one tick, report,
/// sleep, repeat.
///
/// Transient errors cost the tick, back off, and the loop keeps going; a
/// fetch that returns no usable price skips the tick's trading logic but
/// still sleeps. Fatal errors propagate and end the run. Ctrl-C is the
/// shutdown signal, observed while sleeping between ticks.
pub async fn run<E: Exchange, S: StateStore>(
    session: &mut TradeSession<E, S>,
    poll_interval: Duration,
    error_backoff: Duration,
) -> Result<()> {
    tracing::info!(
        "Polling {} every {:?} (ctrl-c to stop)",
        session.config().symbol,
        poll_interval
    );

    loop {
        let mut sleep_for = poll_interval;

        match session.current_price().await {
            Ok(price) if price > 0.0 => {
                let reference_price = session.ledger().last_price;
                match session.tick(price).await {
                    Ok(()) => report::status(session.ledger(), price, reference_price),
                    Err(e) if e.is_transient() => {
                        tracing::warn!("Tick skipped: {}", e);
                        sleep_for = error_backoff;
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(price) => {
                tracing::warn!("Unusable price {} from exchange, skipping tick", price);
            }
            Err(e) if e.is_transient() => {
                tracing::warn!("Price fetch failed: {}", e);
                sleep_for = error_backoff;
            }
            Err(e) => return Err(e),
        }

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown requested, stopping loop");
                return Ok(());
            }
        }
    }
}
