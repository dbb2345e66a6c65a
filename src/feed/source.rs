//! Candle source seam
//!
//! The HTTP/WebSocket client that actually talks to the market API is an
//! external collaborator; the engine only needs this trait. The
//! simulated source below drives the demo binary and tests end to end.

use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::RawCandle;
use crate::clock;

/// Pull transport for recent candles of one symbol
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Fetch the last `n` candles for `symbol`, oldest first. The bar
    /// currently forming may be included with its evolving OHLC.
    async fn fetch_last(&self, symbol: &str, n: usize) -> Result<Vec<RawCandle>>;
}

/// Random-walk candle generator aligned to a timeframe.
///
/// Bars are generated lazily per aligned bucket and then frozen, except
/// the newest bucket whose close keeps drifting until the bucket rolls
/// over, which mirrors how a real feed echoes the still-open bar.
pub struct SimulatedSource {
    timeframe_secs: u32,
    state: Mutex<WalkState>,
}

struct WalkState {
    bars: BTreeMap<i64, RawCandle>,
    last_close: f64,
}

impl SimulatedSource {
    pub fn new(timeframe_secs: u32, start_price: f64) -> Self {
        Self {
            timeframe_secs,
            state: Mutex::new(WalkState {
                bars: BTreeMap::new(),
                last_close: start_price,
            }),
        }
    }

    fn step(last_close: f64) -> f64 {
        let mut rng = rand::thread_rng();
        let drift: f64 = rng.gen_range(-0.0008..0.0008);
        (last_close * (1.0 + drift)).max(0.0001)
    }

    fn bucket_open_ms(&self, ts_ms: i64) -> i64 {
        let interval_ms = self.timeframe_secs as i64 * 1000;
        ts_ms.div_euclid(interval_ms) * interval_ms
    }
}

#[async_trait]
impl CandleSource for SimulatedSource {
    async fn fetch_last(&self, _symbol: &str, n: usize) -> Result<Vec<RawCandle>> {
        let now = clock::now_ms();
        let interval_ms = self.timeframe_secs as i64 * 1000;
        let current_open = self.bucket_open_ms(now);

        let mut state = self.state.lock().expect("walk state poisoned");

        // Materialize every bucket up to the current one
        let first = current_open - (n.saturating_sub(1) as i64) * interval_ms;
        let mut ts = first;
        while ts <= current_open {
            if !state.bars.contains_key(&ts) {
                let open = state.last_close;
                let close = Self::step(open);
                let bar = RawCandle {
                    ts,
                    open,
                    high: open.max(close),
                    low: open.min(close),
                    close,
                };
                state.last_close = close;
                state.bars.insert(ts, bar);
            }
            ts += interval_ms;
        }

        // The newest bar is still forming: let its close keep walking
        if let Some(bar) = state.bars.get(&current_open).cloned() {
            let close = Self::step(bar.close);
            let updated = RawCandle {
                high: bar.high.max(close),
                low: bar.low.min(close),
                close,
                ..bar
            };
            state.last_close = close;
            state.bars.insert(current_open, updated);
        }

        // Keep the generator bounded
        while state.bars.len() > 2 * n.max(16) {
            state.bars.pop_first();
        }

        Ok(state
            .bars
            .iter()
            .rev()
            .take(n)
            .map(|(_, bar)| bar.clone())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect())
    }
}
