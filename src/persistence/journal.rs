//! CSV journal of resolved trades
//!
//! Append-only flat file for offline analysis of graded calls. Journal
//! failures are logged by the caller and never block a transition.

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::types::TradeRecord;

#[derive(Debug, Serialize)]
struct JournalRow {
    resolved_at_ms: i64,
    id: String,
    symbol: String,
    market_type: String,
    timeframe_secs: u32,
    direction: String,
    confidence: f64,
    score: f64,
    target_open_ms: i64,
    candle_open: Option<f64>,
    candle_close: Option<f64>,
    result: String,
}

/// Appends one row per resolved trade to `trades.csv`
pub struct TradeJournal {
    path: PathBuf,
}

impl TradeJournal {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join("trades.csv"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a resolved trade; writes the header on first use
    pub fn append(&self, record: &TradeRecord) -> Result<()> {
        let write_header = !self.path.exists()
            || self
                .path
                .metadata()
                .map(|m| m.len() == 0)
                .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut writer = WriterBuilder::new().has_headers(write_header).from_writer(file);
        writer.serialize(JournalRow {
            resolved_at_ms: record.resolved_at_ms.unwrap_or_default(),
            id: record.id.clone(),
            symbol: record.symbol.clone(),
            market_type: record.market_type.to_string(),
            timeframe_secs: record.timeframe_secs,
            direction: record.direction.to_string(),
            confidence: record.confidence,
            score: record.score,
            target_open_ms: record.target_open_ms,
            candle_open: record.candle_open,
            candle_close: record.candle_close,
            result: record.result.to_string(),
        })?;
        writer.flush().context("Failed to flush trade journal")?;
        Ok(())
    }
}
