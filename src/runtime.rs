//! Engine runtime
//!
//! A single task owns the [`TradeEngine`] and is its only writer: user
//! `start` requests arrive over a command channel, the 1-second tick
//! drives ARMED -> IN_TRADE, and candle series updates drive
//! IN_TRADE -> RESOLVED. Timers live inside the task and die with it,
//! so nothing leaks across symbol switches or shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock;
use crate::engine::{StartRejected, TradeEngine};
use crate::feed::CandleSeries;
use crate::types::{Signal, TradeRecord};

/// Wall-clock source for the runtime task. Production uses
/// [`clock::now_ms`]; tests inject a clock slaved to tokio's paused
/// time so the whole lifecycle runs without real delays.
pub type NowMs = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Read-only view of the engine for presentation layers
#[derive(Debug, Clone, Default)]
pub struct EngineSnapshot {
    pub current: Option<TradeRecord>,
    pub last_resolved: Option<TradeRecord>,
    pub is_locked: bool,
    pub countdown_ms: i64,
}

enum Command {
    Start {
        signal: Box<Signal>,
        reply: oneshot::Sender<Result<TradeRecord, StartRejected>>,
    },
    Snapshot {
        reply: oneshot::Sender<EngineSnapshot>,
    },
    SwitchSymbol {
        symbol: String,
    },
    Shutdown,
}

/// Cloneable handle to the runtime task
#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::Sender<Command>,
}

impl RuntimeHandle {
    /// Ask the engine to arm a trade from this signal. A rejection is
    /// the engine's guard speaking; treat it as a no-op.
    pub async fn start(&self, signal: Signal) -> Result<TradeRecord, StartRejected> {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Command::Start {
                signal: Box::new(signal),
                reply,
            })
            .await
            .is_err()
        {
            return Err(StartRejected::EngineUnavailable);
        }
        rx.await.unwrap_or(Err(StartRejected::EngineUnavailable))
    }

    /// Current engine state for rendering
    pub async fn snapshot(&self) -> EngineSnapshot {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Command::Snapshot { reply }).await.is_err() {
            return EngineSnapshot::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Switch the active symbol (propagated to the feed poller)
    pub async fn switch_symbol(&self, symbol: impl Into<String>) {
        let _ = self
            .tx
            .send(Command::SwitchSymbol {
                symbol: symbol.into(),
            })
            .await;
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
    }
}

/// Spawn the runtime task.
///
/// `candles_rx` is the canonical series published by the feed poller;
/// `symbol_tx` is the poller's symbol input, forwarded on
/// `SwitchSymbol` so both sides stay in step.
pub fn spawn(
    engine: TradeEngine,
    candles_rx: watch::Receiver<CandleSeries>,
    symbol_tx: watch::Sender<String>,
    tick_interval_ms: u64,
) -> (RuntimeHandle, JoinHandle<()>) {
    spawn_with_now(
        engine,
        candles_rx,
        symbol_tx,
        tick_interval_ms,
        Arc::new(clock::now_ms),
    )
}

/// Spawn the runtime task with an injected wall-clock source
pub fn spawn_with_now(
    engine: TradeEngine,
    candles_rx: watch::Receiver<CandleSeries>,
    symbol_tx: watch::Sender<String>,
    tick_interval_ms: u64,
    now: NowMs,
) -> (RuntimeHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(16);
    let handle = tokio::spawn(run(engine, candles_rx, symbol_tx, tick_interval_ms, rx, now));
    (RuntimeHandle { tx }, handle)
}

async fn run(
    mut engine: TradeEngine,
    mut candles_rx: watch::Receiver<CandleSeries>,
    symbol_tx: watch::Sender<String>,
    tick_interval_ms: u64,
    mut cmd_rx: mpsc::Receiver<Command>,
    now: NowMs,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(tick_interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // A trade revived from storage may already be past its boundary, or
    // the target bar may already sit in the series.
    engine.tick(now());
    let initial = candles_rx.borrow().clone();
    engine.observe(&initial.candles, now());

    loop {
        tokio::select! {
            _ = interval.tick() => {
                engine.tick(now());
            }
            changed = candles_rx.changed() => {
                match changed {
                    Ok(()) => {
                        let series = candles_rx.borrow_and_update().clone();
                        engine.observe(&series.candles, now());
                    }
                    Err(_) => {
                        warn!("Candle feed channel closed, engine runtime stopping");
                        break;
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Start { signal, reply }) => {
                        let result = engine.start(&signal, now());
                        let _ = reply.send(result);
                    }
                    Some(Command::Snapshot { reply }) => {
                        let _ = reply.send(EngineSnapshot {
                            current: engine.current().cloned(),
                            last_resolved: engine.last_resolved().cloned(),
                            is_locked: engine.is_locked(),
                            countdown_ms: engine.countdown_ms(now()),
                        });
                    }
                    Some(Command::SwitchSymbol { symbol }) => {
                        info!(symbol = %symbol, "Switching active symbol");
                        let _ = symbol_tx.send(symbol);
                    }
                    Some(Command::Shutdown) | None => {
                        info!("Engine runtime shutting down");
                        break;
                    }
                }
            }
        }
    }
}
