//! Trade persistence
//!
//! Makes the current trade and the resolved-trade history survive a
//! restart. Storage is a small key-value abstraction with two keys; the
//! repository on top performs the validation/repair step so a corrupted
//! write or an older schema can never crash the boot: a bad current
//! record is discarded (no pending trade) while history still loads, and
//! history entries that individually fail to parse are dropped.

mod journal;

pub use journal::TradeJournal;

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::types::{TradeRecord, TradeStatus};

/// Storage key for the single in-flight trade
pub const CURRENT_KEY: &str = "trade_current";
/// Storage key for the append-only resolved history
pub const HISTORY_KEY: &str = "trade_history";
/// Schema version of the persisted records
pub const STORAGE_VERSION: u32 = 1;

/// Durable key-value store scoped to this client
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// File-backed store: one JSON file per key under a data directory
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Some(raw))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        fs::write(&path, value).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryKvStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().expect("kv poisoned").get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map
            .lock()
            .expect("kv poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.map.lock().expect("kv poisoned").remove(key);
        Ok(())
    }
}

/// State loaded at boot after validation
#[derive(Debug, Default)]
pub struct LoadedState {
    pub current: Option<TradeRecord>,
    pub history: Vec<TradeRecord>,
}

/// Repository over the two storage keys, with load-time repair and a
/// bounded history
pub struct TradeRepository {
    store: Arc<dyn KvStore>,
    history_cap: usize,
}

impl TradeRepository {
    pub fn new(store: Arc<dyn KvStore>, history_cap: usize) -> Self {
        Self { store, history_cap }
    }

    /// Load current + history, repairing whatever fails validation.
    /// Never fails: the worst corrupt storage yields is an empty state.
    pub fn load(&self) -> LoadedState {
        let current = self.load_current();
        let history = self.load_history();
        info!(
            has_current = current.is_some(),
            history_len = history.len(),
            "Trade state loaded"
        );
        LoadedState { current, history }
    }

    fn load_current(&self) -> Option<TradeRecord> {
        let raw = match self.store.get(CURRENT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Failed to read current trade, treating as none");
                return None;
            }
        };
        match serde_json::from_str::<TradeRecord>(&raw) {
            Ok(record) if Self::valid_current(&record) => Some(record),
            Ok(record) => {
                warn!(id = %record.id, "Discarding invalid persisted current trade");
                None
            }
            Err(e) => {
                warn!(error = %e, "Corrupt current trade record discarded");
                None
            }
        }
    }

    fn valid_current(record: &TradeRecord) -> bool {
        // Unknown statuses already fail deserialization; the id check
        // guards against an earlier schema that wrote records without one.
        !record.id.is_empty()
            && matches!(
                record.status,
                TradeStatus::Armed | TradeStatus::InTrade | TradeStatus::Resolved
            )
    }

    fn load_history(&self) -> Vec<TradeRecord> {
        let raw = match self.store.get(HISTORY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read trade history, starting empty");
                return Vec::new();
            }
        };
        let values: Vec<Value> = match serde_json::from_str(&raw) {
            Ok(Value::Array(values)) => values,
            Ok(_) => {
                warn!("Trade history is not a JSON array, starting empty");
                return Vec::new();
            }
            Err(e) => {
                warn!(error = %e, "Corrupt trade history discarded");
                return Vec::new();
            }
        };

        let total = values.len();
        let mut history: Vec<TradeRecord> = values
            .into_iter()
            .filter_map(|v| serde_json::from_value::<TradeRecord>(v).ok())
            .filter(|r| !r.id.is_empty())
            .collect();
        let dropped = total - history.len();
        if dropped > 0 {
            warn!(dropped, "Dropped unparseable trade history entries");
        }

        if history.len() > self.history_cap {
            let excess = history.len() - self.history_cap;
            history.drain(..excess);
        }
        history
    }

    /// Overwrite the stored current record; `None` removes the key
    pub fn save_current(&self, current: Option<&TradeRecord>) -> Result<()> {
        match current {
            Some(record) => {
                let json = serde_json::to_string(record)?;
                self.store.set(CURRENT_KEY, &json)
            }
            None => self.store.remove(CURRENT_KEY),
        }
    }

    /// Overwrite the stored history, applying the cap (oldest dropped first)
    pub fn save_history(&self, history: &[TradeRecord]) -> Result<()> {
        let start = history.len().saturating_sub(self.history_cap);
        let json = serde_json::to_string(&history[start..])?;
        self.store.set(HISTORY_KEY, &json)
    }

    pub fn history_cap(&self) -> usize {
        self.history_cap
    }
}
