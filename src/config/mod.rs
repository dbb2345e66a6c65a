//! Configuration management for Tradeflow
//!
//! Loads from optional YAML/TOML files + environment variables via .env

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub feed: FeedConfig,
    pub engine: EngineConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Version tag for logging
    pub tag: String,
    /// Active symbol
    pub symbol: String,
    /// Market mode for the symbol ("OPEN" or "OTC")
    pub market_type: String,
    /// Candle duration in seconds
    pub timeframe_secs: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Poll interval in seconds
    pub poll_interval_secs: u64,
    /// Candles per fetch
    pub fetch_count: usize,
    /// Series considered stale after this many milliseconds without an update
    pub staleness_ms: u64,
    /// Maximum candles kept in the canonical series
    pub max_candles: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// ARMED->IN_TRADE check cadence in milliseconds
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory for state files and the CSV journal
    pub data_dir: String,
    /// Maximum resolved trades kept in history
    pub history_cap: usize,
    /// Enable the CSV journal of resolved trades
    pub csv_enabled: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("bot.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("bot.symbol", "EURUSD")?
            .set_default("bot.market_type", "OTC")?
            .set_default("bot.timeframe_secs", 60)?
            // Feed defaults
            .set_default("feed.poll_interval_secs", 5)?
            .set_default("feed.fetch_count", 30)?
            .set_default("feed.staleness_ms", 20_000)?
            .set_default("feed.max_candles", 500)?
            // Engine defaults
            .set_default("engine.tick_interval_ms", 1_000)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.history_cap", 500)?
            .set_default("persistence.csv_enabled", true)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (TRADEFLOW_*)
            .add_source(Environment::with_prefix("TRADEFLOW").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app_config.validate()?;

        Ok(app_config)
    }

    /// Reject values that would stall or panic the timing paths
    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.bot.timeframe_secs > 0,
            "bot.timeframe_secs must be positive"
        );
        anyhow::ensure!(
            self.feed.poll_interval_secs > 0,
            "feed.poll_interval_secs must be positive"
        );
        anyhow::ensure!(
            self.engine.tick_interval_ms > 0,
            "engine.tick_interval_ms must be positive"
        );
        Ok(())
    }

    /// Generate a digest of the config for startup logging
    pub fn digest(&self) -> String {
        format!(
            "tag={} symbol={} market={} tf={}s poll={}s data_dir={}",
            self.bot.tag,
            self.bot.symbol,
            self.bot.market_type,
            self.bot.timeframe_secs,
            self.feed.poll_interval_secs,
            self.persistence.data_dir
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
