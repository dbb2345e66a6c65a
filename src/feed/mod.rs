//! Candle feed adapter
//!
//! Normalizes candle batches arriving from any transport (periodic pull
//! or push) into one canonical, deduplicated, timestamp-ascending series
//! for the active symbol. Upstream timestamps may be seconds or
//! milliseconds; everything past this boundary is milliseconds.
//!
//! Transport failures never reach the lifecycle engine as errors: the
//! series simply stops advancing and `last_updated_ms` lets callers
//! treat it as stale.

mod poller;
mod source;

pub use poller::spawn_poller;
pub use source::{CandleSource, SimulatedSource};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::types::Candle;

/// Raw candle as the upstream source sends it. `ts` unit is not
/// guaranteed (seconds or milliseconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCandle {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Normalize an upstream timestamp to epoch milliseconds.
///
/// Values above 1e12 are already milliseconds (1e12 ms is 2001; no
/// market feed predates it, and 1e12 seconds is the year 33658).
pub fn normalize_ts_ms(ts: i64) -> i64 {
    if ts > 1_000_000_000_000 {
        ts
    } else {
        ts * 1000
    }
}

/// Immutable snapshot of the canonical series, published to consumers
#[derive(Debug, Clone, Default)]
pub struct CandleSeries {
    /// Symbol the series belongs to
    pub symbol: String,
    /// Candles in ascending open-time order, deduplicated by open time
    pub candles: Vec<Candle>,
    /// Wall-clock ms of the last successful update (0 = never)
    pub last_updated_ms: i64,
}

impl CandleSeries {
    /// Find the candle whose open time equals `target_open_ms`
    pub fn find_by_open_ms(&self, target_open_ms: i64) -> Option<&Candle> {
        self.candles
            .iter()
            .find(|c| c.open_time_ms == target_open_ms)
    }
}

/// Stateful adapter owning the canonical series for one symbol at a time
pub struct CandleFeed {
    symbol: String,
    candles: BTreeMap<i64, Candle>,
    max_len: usize,
    last_updated_ms: i64,
    retro_changes: u64,
}

impl CandleFeed {
    pub fn new(symbol: impl Into<String>, max_len: usize) -> Self {
        Self {
            symbol: symbol.into(),
            candles: BTreeMap::new(),
            max_len,
            last_updated_ms: 0,
            retro_changes: 0,
        }
    }

    /// Retroactive changes to closed bars seen since the last symbol
    /// switch; anything above zero means the upstream rewrote history.
    pub fn retro_change_count(&self) -> u64 {
        self.retro_changes
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Switch the active symbol, dropping the old series entirely
    pub fn set_symbol(&mut self, symbol: impl Into<String>) {
        let symbol = symbol.into();
        if symbol != self.symbol {
            debug!(from = %self.symbol, to = %symbol, "Feed symbol switched, series cleared");
            self.symbol = symbol;
            self.candles.clear();
            self.last_updated_ms = 0;
            self.retro_changes = 0;
        }
    }

    /// Ingest a batch tagged with a symbol.
    ///
    /// Batches for any other symbol are discarded silently: a stale
    /// subscription race after a symbol switch must not corrupt the
    /// displayed series. Returns true when the series changed.
    pub fn apply_batch(&mut self, symbol: &str, batch: &[RawCandle], now_ms: i64) -> bool {
        if symbol != self.symbol {
            debug!(
                got = %symbol,
                active = %self.symbol,
                "Discarding candle batch for inactive symbol"
            );
            return false;
        }

        let mut changed = false;

        for raw in batch {
            let open_time_ms = normalize_ts_ms(raw.ts);
            let candle = Candle::new(open_time_ms, raw.open, raw.high, raw.low, raw.close);
            // The newest key moves as the batch lands, so a bar that
            // first appeared earlier in this same batch still counts as
            // the still-open one.
            let newest = self.candles.keys().next_back().copied();

            match self.candles.get(&open_time_ms) {
                Some(existing) if *existing == candle => continue,
                Some(existing) => {
                    // Replacing the newest (still-open) bar is normal;
                    // a retroactive change to an older bar is an
                    // upstream anomaly we tolerate but log.
                    if Some(open_time_ms) != newest {
                        self.retro_changes += 1;
                        warn!(
                            symbol = %self.symbol,
                            open_time_ms,
                            old_close = existing.close,
                            new_close = candle.close,
                            "Closed candle changed retroactively"
                        );
                    }
                    self.candles.insert(open_time_ms, candle);
                    changed = true;
                }
                None => {
                    self.candles.insert(open_time_ms, candle);
                    changed = true;
                }
            }
        }

        while self.candles.len() > self.max_len {
            self.candles.pop_first();
        }

        self.last_updated_ms = now_ms;
        changed
    }

    /// True when no successful update happened within `staleness_ms`
    pub fn is_stale(&self, now_ms: i64, staleness_ms: i64) -> bool {
        self.last_updated_ms == 0 || now_ms - self.last_updated_ms > staleness_ms
    }

    /// Snapshot the canonical series for consumers
    pub fn snapshot(&self) -> CandleSeries {
        CandleSeries {
            symbol: self.symbol.clone(),
            candles: self.candles.values().cloned().collect(),
            last_updated_ms: self.last_updated_ms,
        }
    }
}
