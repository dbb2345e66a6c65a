//! Polling driver for the candle feed
//!
//! Owns a [`CandleFeed`] inside a single task, pulls from the configured
//! [`CandleSource`] at a fixed interval and publishes snapshots over a
//! watch channel. Fetch errors are swallowed here: the series goes stale
//! and the consumer decides what to do about it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{CandleFeed, CandleSeries, CandleSource};
use crate::clock;
use crate::config::FeedConfig;

/// Spawn the poller task.
///
/// `symbol_rx` carries the active symbol; switching it clears the series
/// so a late response for the old symbol can never corrupt the new one.
/// The task ends when every `symbol_rx` sender is dropped.
pub fn spawn_poller(
    source: Arc<dyn CandleSource>,
    mut symbol_rx: watch::Receiver<String>,
    cfg: FeedConfig,
) -> (watch::Receiver<CandleSeries>, JoinHandle<()>) {
    let initial_symbol = symbol_rx.borrow().clone();
    let mut feed = CandleFeed::new(initial_symbol, cfg.max_candles);
    let (series_tx, series_rx) = watch::channel(feed.snapshot());

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(cfg.poll_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            symbol = %feed.symbol(),
            poll_interval_secs = cfg.poll_interval_secs,
            "Candle poller started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let symbol = feed.symbol().to_string();
                    match source.fetch_last(&symbol, cfg.fetch_count).await {
                        Ok(batch) => {
                            let now = clock::now_ms();
                            if feed.apply_batch(&symbol, &batch, now) {
                                let _ = series_tx.send(feed.snapshot());
                            }
                            if feed.is_stale(now, cfg.staleness_ms as i64) {
                                debug!(symbol = %symbol, "Candle series still stale after fetch");
                            }
                        }
                        Err(e) => {
                            // Stale data, not an error path: the engine
                            // simply sees no new candles.
                            warn!(symbol = %symbol, error = %e, "Candle fetch failed");
                        }
                    }
                }
                changed = symbol_rx.changed() => {
                    match changed {
                        Ok(()) => {
                            let symbol = symbol_rx.borrow_and_update().clone();
                            feed.set_symbol(symbol);
                            let _ = series_tx.send(feed.snapshot());
                        }
                        Err(_) => {
                            info!("Symbol channel closed, candle poller stopping");
                            break;
                        }
                    }
                }
            }
        }
    });

    (series_rx, handle)
}
