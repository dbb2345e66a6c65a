//! Tradeflow demo binary
//!
//! Wires the engine to the simulated candle source, arms one canned
//! CALL signal and follows it through the full lifecycle, logging each
//! phase. Ctrl-C stops early. State lands under the configured data
//! dir, so a second run demonstrates reload validation.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tradeflow::clock;
use tradeflow::config::AppConfig;
use tradeflow::engine::TradeEngine;
use tradeflow::feed::{spawn_poller, SimulatedSource};
use tradeflow::persistence::{FileKvStore, TradeJournal, TradeRepository};
use tradeflow::runtime;
use tradeflow::types::{
    Confluence, ConfluencePolarity, MarketType, Signal, SignalDirection, TradeStatus, Votes,
};

fn demo_signal(cfg: &AppConfig) -> Signal {
    Signal {
        symbol: cfg.bot.symbol.clone(),
        market_type: MarketType::from_str(&cfg.bot.market_type).unwrap_or_default(),
        timeframe_secs: cfg.bot.timeframe_secs,
        direction: SignalDirection::Call,
        confidence: 72.0,
        score: 68.0,
        votes: Votes { call: 5, put: 2 },
        confluences: vec![
            Confluence {
                id: "ema".to_string(),
                name: "EMA 9/21".to_string(),
                description: "Exponential moving average trend".to_string(),
                polarity: ConfluencePolarity::Confirm,
                weight: 0.9,
                value: "CALL (EMA9 > EMA21)".to_string(),
            },
            Confluence {
                id: "rsi".to_string(),
                name: "RSI 14".to_string(),
                description: "Relative strength index".to_string(),
                polarity: ConfluencePolarity::Neutral,
                weight: 0.5,
                value: "neutral RSI=54".to_string(),
            },
        ],
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = AppConfig::load()?;
    info!(config = %cfg.digest(), "Tradeflow starting");

    let store = FileKvStore::new(&cfg.persistence.data_dir)?;
    let repo = TradeRepository::new(Arc::new(store), cfg.persistence.history_cap);
    let mut engine = TradeEngine::load(repo);
    if cfg.persistence.csv_enabled {
        engine = engine.with_journal(TradeJournal::new(&cfg.persistence.data_dir));
    }

    let source = Arc::new(SimulatedSource::new(cfg.bot.timeframe_secs, 1.0850));
    let (symbol_tx, symbol_rx) = watch::channel(cfg.bot.symbol.clone());
    let (candles_rx, poller_handle) = spawn_poller(source, symbol_rx, cfg.feed.clone());

    let (handle, runtime_handle) = runtime::spawn(
        engine,
        candles_rx,
        symbol_tx,
        cfg.engine.tick_interval_ms,
    );

    // Arm the demo trade unless a revived one is still pending
    let snapshot = handle.snapshot().await;
    if snapshot.is_locked {
        info!(
            id = %snapshot.current.as_ref().map(|t| t.id.as_str()).unwrap_or("?"),
            "Revived pending trade, waiting for it instead of arming a new one"
        );
    } else {
        match handle.start(demo_signal(&cfg)).await {
            Ok(record) => info!(
                id = %record.id,
                direction = %record.direction,
                target_open_ms = record.target_open_ms,
                "Demo trade armed"
            ),
            Err(rejected) => info!(%rejected, "Demo trade not armed"),
        }
    }

    let mut status_interval = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = status_interval.tick() => {
                let snap = handle.snapshot().await;
                match snap.current.as_ref().map(|t| t.status) {
                    Some(TradeStatus::Armed) => {
                        info!(
                            countdown = %clock::format_countdown(snap.countdown_ms),
                            "Waiting for target bar"
                        );
                    }
                    Some(TradeStatus::InTrade) => {
                        info!("In trade, waiting for the target bar to close");
                    }
                    Some(TradeStatus::Resolved) | None => {
                        if let Some(resolved) = snap.last_resolved {
                            info!(
                                result = %resolved.result,
                                candle_open = ?resolved.candle_open,
                                candle_close = ?resolved.candle_close,
                                "Trade graded, exiting"
                            );
                        }
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    handle.shutdown().await;
    let _ = runtime_handle.await;
    poller_handle.abort();
    Ok(())
}
