//! Core types used throughout Tradeflow
//!
//! Defines common data structures for candles, signals and trade records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Market availability mode for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketType {
    /// Regular open-market hours
    Open,
    /// Over-the-counter synthetic feed
    Otc,
}

impl Default for MarketType {
    fn default() -> Self {
        MarketType::Otc
    }
}

impl MarketType {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OPEN" => Some(MarketType::Open),
            "OTC" => Some(MarketType::Otc),
            _ => None,
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::Open => write!(f, "OPEN"),
            MarketType::Otc => write!(f, "OTC"),
        }
    }
}

/// Direction a signal recommends. `None` means the analysis abstained
/// and must never produce a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalDirection {
    Call,
    Put,
    None,
}

impl SignalDirection {
    /// Direction usable for a trade, if any
    pub fn actionable(&self) -> Option<Direction> {
        match self {
            SignalDirection::Call => Some(Direction::Call),
            SignalDirection::Put => Some(Direction::Put),
            SignalDirection::None => None,
        }
    }
}

impl fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalDirection::Call => write!(f, "CALL"),
            SignalDirection::Put => write!(f, "PUT"),
            SignalDirection::None => write!(f, "NONE"),
        }
    }
}

/// Trading direction of an armed trade (abstained signals never reach this type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Call,
    Put,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Call => write!(f, "CALL"),
            Direction::Put => write!(f, "PUT"),
        }
    }
}

/// Candle body color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandleColor {
    Green,
    Red,
    Doji,
}

impl CandleColor {
    /// Classify from open/close prices
    pub fn classify(open: f64, close: f64) -> Self {
        if close > open {
            CandleColor::Green
        } else if close < open {
            CandleColor::Red
        } else {
            CandleColor::Doji
        }
    }
}

/// One OHLC bar, normalized: `open_time_ms` is always epoch milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time (epoch milliseconds)
    pub open_time_ms: i64,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Body color derived from open/close
    pub color: CandleColor,
}

impl Candle {
    pub fn new(open_time_ms: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            open_time_ms,
            open,
            high,
            low,
            close,
            color: CandleColor::classify(open, close),
        }
    }
}

/// Polarity of one confluence indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfluencePolarity {
    Confirm,
    Neutral,
    Against,
}

/// One indicator contributing evidence toward a CALL/PUT decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confluence {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub polarity: ConfluencePolarity,
    /// Contribution weight (0..1)
    pub weight: f64,
    #[serde(default)]
    pub value: String,
}

/// Vote tally behind a signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Votes {
    pub call: u32,
    pub put: u32,
}

/// Analysis result produced by the signal source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Symbol being analyzed
    pub symbol: String,
    /// Market mode
    pub market_type: MarketType,
    /// Candle duration in seconds
    pub timeframe_secs: u32,
    /// Recommended direction
    pub direction: SignalDirection,
    /// Confidence level (0 - 100)
    pub confidence: f64,
    /// Overall strength score
    pub score: f64,
    /// Vote tally
    #[serde(default)]
    pub votes: Votes,
    /// Indicators that contributed to this signal
    #[serde(default)]
    pub confluences: Vec<Confluence>,
}

/// Phase of the current trade. `Armed` counts down to the target bar,
/// `InTrade` waits for the target bar's close, `Resolved` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Armed,
    InTrade,
    Resolved,
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeStatus::Armed => write!(f, "ARMED"),
            TradeStatus::InTrade => write!(f, "IN_TRADE"),
            TradeStatus::Resolved => write!(f, "RESOLVED"),
        }
    }
}

/// Outcome of a resolved trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeResult {
    Win,
    Loss,
    Draw,
    Unknown,
}

impl Default for TradeResult {
    fn default() -> Self {
        TradeResult::Unknown
    }
}

impl fmt::Display for TradeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeResult::Win => write!(f, "WIN"),
            TradeResult::Loss => write!(f, "LOSS"),
            TradeResult::Draw => write!(f, "DRAW"),
            TradeResult::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Trade record managed by the lifecycle engine.
///
/// Created only when a CALL/PUT signal is armed; mutated only by the
/// engine's tick/observe logic; immutable history once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Opaque unique id
    pub id: String,
    /// Symbol the trade was armed for
    pub symbol: String,
    /// Market mode at arming time
    pub market_type: MarketType,
    /// Candle duration in seconds
    pub timeframe_secs: u32,
    /// Committed direction
    pub direction: Direction,
    /// Confidence copied from the signal
    pub confidence: f64,
    /// Score copied from the signal
    pub score: f64,
    /// Snapshot of the confluences at arming time; later signal
    /// refreshes must not alter a pending trade's rationale
    #[serde(default)]
    pub confluences: Vec<Confluence>,
    /// Wall-clock time the trade was armed (epoch ms)
    pub generated_at_ms: i64,
    /// Open time of the target bar (epoch ms) - the trade's anchor
    pub target_open_ms: i64,
    /// Current phase
    pub status: TradeStatus,
    /// Outcome, `Unknown` until resolved
    #[serde(default)]
    pub result: TradeResult,
    /// Target bar open price, set on resolution
    #[serde(default)]
    pub candle_open: Option<f64>,
    /// Target bar close price, set on resolution
    #[serde(default)]
    pub candle_close: Option<f64>,
    /// Wall-clock time of resolution (epoch ms)
    #[serde(default)]
    pub resolved_at_ms: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_color_classification() {
        assert_eq!(CandleColor::classify(1.0840, 1.0850), CandleColor::Green);
        assert_eq!(CandleColor::classify(1.0850, 1.0840), CandleColor::Red);
        assert_eq!(CandleColor::classify(1.0840, 1.0840), CandleColor::Doji);
    }

    #[test]
    fn abstained_signal_is_not_actionable() {
        assert_eq!(SignalDirection::None.actionable(), None);
        assert_eq!(SignalDirection::Call.actionable(), Some(Direction::Call));
        assert_eq!(SignalDirection::Put.actionable(), Some(Direction::Put));
    }

    #[test]
    fn trade_status_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&TradeStatus::InTrade).unwrap(),
            "\"IN_TRADE\""
        );
        let parsed: TradeStatus = serde_json::from_str("\"ARMED\"").unwrap();
        assert_eq!(parsed, TradeStatus::Armed);
    }
}
