//! Trade lifecycle engine
//!
//! Owns the single current trade and drives it through
//! ARMED -> IN_TRADE -> RESOLVED. Transitions are monotonic: a trade is
//! armed against the next timeframe boundary, enters the trade when
//! wall-clock time reaches that boundary, and resolves when the target
//! bar shows up in the candle series. Every transition is persisted
//! before control returns.
//!
//! The engine is the only writer of the current trade. Callers are
//! expected to gate `start` on [`TradeEngine::is_locked`], but the
//! engine re-checks internally and rejects rather than trusting the
//! call site.

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clock;
use crate::persistence::{TradeJournal, TradeRepository};
use crate::types::{
    Candle, Direction, Signal, TradeRecord, TradeResult, TradeStatus,
};

/// Why a `start` call was refused. Callers treat this as a no-op, not a
/// failure: the UI should already have disabled the action.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartRejected {
    #[error("signal direction is NONE, nothing to arm")]
    NoDirection,
    #[error("signal timeframe is zero, no bar boundary to anchor on")]
    ZeroTimeframe,
    #[error("trade {id} is still {status}, cannot arm another")]
    TradePending { id: String, status: TradeStatus },
    #[error("engine runtime is not running")]
    EngineUnavailable,
}

/// Grade a directional call against the target bar's open/close.
///
/// Pure and total: equal prices are a DRAW regardless of direction.
pub fn resolve(direction: Direction, open: f64, close: f64) -> TradeResult {
    if close > open {
        match direction {
            Direction::Call => TradeResult::Win,
            Direction::Put => TradeResult::Loss,
        }
    } else if close < open {
        match direction {
            Direction::Call => TradeResult::Loss,
            Direction::Put => TradeResult::Win,
        }
    } else {
        TradeResult::Draw
    }
}

/// Lock/guard policy: analysis is blocked while a trade is pending
pub fn is_locked(current: Option<&TradeRecord>) -> bool {
    matches!(
        current.map(|t| t.status),
        Some(TradeStatus::Armed) | Some(TradeStatus::InTrade)
    )
}

/// The lifecycle state machine plus its persistence hooks
pub struct TradeEngine {
    repo: TradeRepository,
    journal: Option<TradeJournal>,
    current: Option<TradeRecord>,
    history: Vec<TradeRecord>,
    last_resolved: Option<TradeRecord>,
}

impl TradeEngine {
    /// Boot from persisted state; corrupt records were already repaired
    /// by the repository's load step.
    pub fn load(repo: TradeRepository) -> Self {
        let state = repo.load();
        let last_resolved = state
            .history
            .iter()
            .rev()
            .find(|t| t.status == TradeStatus::Resolved)
            .cloned();
        Self {
            repo,
            journal: None,
            current: state.current,
            history: state.history,
            last_resolved,
        }
    }

    /// Attach the CSV journal for resolved trades
    pub fn with_journal(mut self, journal: TradeJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn current(&self) -> Option<&TradeRecord> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &[TradeRecord] {
        &self.history
    }

    /// Most recently resolved trade, for display
    pub fn last_resolved(&self) -> Option<&TradeRecord> {
        self.last_resolved.as_ref()
    }

    /// True while a trade is ARMED or IN_TRADE; gates new analysis
    pub fn is_locked(&self) -> bool {
        is_locked(self.current.as_ref())
    }

    /// Countdown to the target bar while ARMED, zero otherwise
    pub fn countdown_ms(&self, now_ms: i64) -> i64 {
        match &self.current {
            Some(t) if t.status == TradeStatus::Armed => {
                clock::remaining(now_ms, t.target_open_ms)
            }
            _ => 0,
        }
    }

    /// Arm a trade for the next bar boundary.
    ///
    /// The sole entry point for creating trades. Rejected when the
    /// signal abstained or a trade is already pending; rejection is a
    /// no-op for the caller, never a panic.
    pub fn start(&mut self, signal: &Signal, now_ms: i64) -> Result<TradeRecord, StartRejected> {
        let direction = signal.direction.actionable().ok_or(StartRejected::NoDirection)?;

        if signal.timeframe_secs == 0 {
            warn!(symbol = %signal.symbol, "start() refused, signal carries a zero timeframe");
            return Err(StartRejected::ZeroTimeframe);
        }

        if let Some(pending) = self.current.as_ref().filter(|t| is_locked(Some(*t))) {
            warn!(
                id = %pending.id,
                status = %pending.status,
                "start() refused while a trade is pending"
            );
            return Err(StartRejected::TradePending {
                id: pending.id.clone(),
                status: pending.status,
            });
        }

        let target_open_ms = clock::next_boundary(now_ms, signal.timeframe_secs);
        let record = TradeRecord {
            id: Uuid::new_v4().to_string(),
            symbol: signal.symbol.clone(),
            market_type: signal.market_type,
            timeframe_secs: signal.timeframe_secs,
            direction,
            confidence: signal.confidence,
            score: signal.score,
            confluences: signal.confluences.clone(),
            generated_at_ms: now_ms,
            target_open_ms,
            status: TradeStatus::Armed,
            result: TradeResult::Unknown,
            candle_open: None,
            candle_close: None,
            resolved_at_ms: None,
        };

        info!(
            id = %record.id,
            symbol = %record.symbol,
            direction = %record.direction,
            target_open_ms,
            countdown = %clock::format_countdown(clock::remaining(now_ms, target_open_ms)),
            "Trade armed for next bar"
        );

        self.current = Some(record.clone());
        self.persist_current();
        Ok(record)
    }

    /// Time-driven check, at least once per second while ARMED.
    /// Flips ARMED -> IN_TRADE once the target bar has opened.
    /// Returns true when a transition happened.
    pub fn tick(&mut self, now_ms: i64) -> bool {
        let trade = match self.current.as_mut() {
            Some(t) if t.status == TradeStatus::Armed => t,
            _ => return false,
        };
        if now_ms < trade.target_open_ms {
            return false;
        }
        trade.status = TradeStatus::InTrade;
        info!(id = %trade.id, symbol = %trade.symbol, "Target bar opened, now in trade");
        self.persist_current();
        true
    }

    /// Data-driven check, invoked whenever the candle series changes.
    ///
    /// A no-op unless IN_TRADE: a late-observed candle must never
    /// resolve a trade that is still ARMED, and a second call after
    /// resolution must not re-resolve or duplicate history. Returns the
    /// resolved record when this call performed the resolution.
    pub fn observe(&mut self, candles: &[Candle], now_ms: i64) -> Option<TradeRecord> {
        let trade = match self.current.as_mut() {
            Some(t) if t.status == TradeStatus::InTrade => t,
            _ => return None,
        };

        // Target bar not reported yet: keep waiting, the feed decides
        // the pace. No timeout-driven forced resolution exists here.
        let candle = candles
            .iter()
            .find(|c| c.open_time_ms == trade.target_open_ms)?;

        trade.result = resolve(trade.direction, candle.open, candle.close);
        trade.status = TradeStatus::Resolved;
        trade.candle_open = Some(candle.open);
        trade.candle_close = Some(candle.close);
        trade.resolved_at_ms = Some(now_ms);
        let resolved = trade.clone();

        info!(
            id = %resolved.id,
            symbol = %resolved.symbol,
            direction = %resolved.direction,
            result = %resolved.result,
            candle_open = candle.open,
            candle_close = candle.close,
            "Trade resolved"
        );

        self.history.push(resolved.clone());
        if self.history.len() > self.repo.history_cap() {
            let excess = self.history.len() - self.repo.history_cap();
            self.history.drain(..excess);
        }
        self.last_resolved = Some(resolved.clone());

        self.persist_current();
        if let Err(e) = self.repo.save_history(&self.history) {
            error!(error = %e, "Failed to persist trade history");
        }
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&resolved) {
                warn!(error = %e, "Failed to journal resolved trade");
            }
        }

        Some(resolved)
    }

    fn persist_current(&mut self) {
        if let Err(e) = self.repo.save_current(self.current.as_ref()) {
            // Keep the in-memory state authoritative; boot-time
            // validation reconciles whatever ends up on disk.
            error!(error = %e, "Failed to persist current trade");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryKvStore, TradeRepository};
    use crate::types::{MarketType, SignalDirection, Votes};
    use std::sync::Arc;

    // 2024-01-15 12:00:07 UTC
    const NOW: i64 = 1_705_320_007_000;
    // 12:01:00
    const TARGET: i64 = 1_705_320_060_000;

    fn signal(direction: SignalDirection) -> Signal {
        Signal {
            symbol: "EURUSD".to_string(),
            market_type: MarketType::Otc,
            timeframe_secs: 60,
            direction,
            confidence: 72.0,
            score: 68.0,
            votes: Votes { call: 5, put: 2 },
            confluences: vec![],
        }
    }

    fn engine() -> TradeEngine {
        TradeEngine::load(TradeRepository::new(Arc::new(MemoryKvStore::new()), 500))
    }

    fn candle(open_time_ms: i64, open: f64, close: f64) -> Candle {
        Candle::new(open_time_ms, open, open.max(close), open.min(close), close)
    }

    #[test]
    fn resolve_truth_table() {
        assert_eq!(resolve(Direction::Call, 1.0840, 1.0850), TradeResult::Win);
        assert_eq!(resolve(Direction::Call, 1.0850, 1.0840), TradeResult::Loss);
        assert_eq!(resolve(Direction::Put, 1.0840, 1.0850), TradeResult::Loss);
        assert_eq!(resolve(Direction::Put, 1.0850, 1.0840), TradeResult::Win);
        assert_eq!(resolve(Direction::Call, 1.0840, 1.0840), TradeResult::Draw);
        assert_eq!(resolve(Direction::Put, 1.0840, 1.0840), TradeResult::Draw);
    }

    #[test]
    fn start_arms_for_the_next_boundary() {
        let mut engine = engine();
        let record = engine.start(&signal(SignalDirection::Call), NOW).unwrap();
        assert_eq!(record.status, TradeStatus::Armed);
        assert_eq!(record.target_open_ms, TARGET);
        assert_eq!(record.generated_at_ms, NOW);
        assert!(engine.is_locked());
        assert_eq!(engine.countdown_ms(NOW), TARGET - NOW);
    }

    #[test]
    fn start_rejects_abstained_signal() {
        let mut engine = engine();
        assert_eq!(
            engine.start(&signal(SignalDirection::None), NOW),
            Err(StartRejected::NoDirection)
        );
        assert!(engine.current().is_none());
    }

    #[test]
    fn start_rejects_zero_timeframe_without_panicking() {
        let mut engine = engine();
        let mut sig = signal(SignalDirection::Call);
        sig.timeframe_secs = 0;
        assert_eq!(engine.start(&sig, NOW), Err(StartRejected::ZeroTimeframe));
        assert!(engine.current().is_none());
        assert!(!engine.is_locked());
    }

    #[test]
    fn start_rejects_while_pending_in_both_phases() {
        let mut engine = engine();
        let first = engine.start(&signal(SignalDirection::Call), NOW).unwrap();

        for dir in [SignalDirection::Call, SignalDirection::Put] {
            let err = engine.start(&signal(dir), NOW + 1_000).unwrap_err();
            assert_eq!(
                err,
                StartRejected::TradePending {
                    id: first.id.clone(),
                    status: TradeStatus::Armed,
                }
            );
        }

        engine.tick(TARGET);
        let err = engine.start(&signal(SignalDirection::Put), TARGET + 1).unwrap_err();
        assert!(matches!(
            err,
            StartRejected::TradePending {
                status: TradeStatus::InTrade,
                ..
            }
        ));
        // still the same single trade
        assert_eq!(engine.current().unwrap().id, first.id);
    }

    #[test]
    fn tick_flips_to_in_trade_only_at_boundary() {
        let mut engine = engine();
        engine.start(&signal(SignalDirection::Call), NOW).unwrap();

        assert!(!engine.tick(TARGET - 1));
        assert_eq!(engine.current().unwrap().status, TradeStatus::Armed);

        assert!(engine.tick(TARGET));
        assert_eq!(engine.current().unwrap().status, TradeStatus::InTrade);
        assert_eq!(engine.countdown_ms(TARGET), 0);

        // further ticks are no-ops
        assert!(!engine.tick(TARGET + 5_000));
    }

    #[test]
    fn observe_is_a_noop_while_armed() {
        let mut engine = engine();
        engine.start(&signal(SignalDirection::Call), NOW).unwrap();
        // A late-observed candle cannot resolve an ARMED trade
        let resolved = engine.observe(&[candle(TARGET, 1.0840, 1.0850)], TARGET + 100);
        assert!(resolved.is_none());
        assert_eq!(engine.current().unwrap().status, TradeStatus::Armed);
    }

    #[test]
    fn call_resolves_win_on_green_target_bar() {
        let mut engine = engine();
        engine.start(&signal(SignalDirection::Call), NOW).unwrap();
        engine.tick(TARGET);

        // target bar absent: still waiting
        assert!(engine
            .observe(&[candle(TARGET - 60_000, 1.0, 1.1)], TARGET + 1_000)
            .is_none());

        let resolved = engine
            .observe(&[candle(TARGET, 1.0840, 1.0850)], TARGET + 65_000)
            .unwrap();
        assert_eq!(resolved.status, TradeStatus::Resolved);
        assert_eq!(resolved.result, TradeResult::Win);
        assert_eq!(resolved.candle_open, Some(1.0840));
        assert_eq!(resolved.candle_close, Some(1.0850));
        assert_eq!(resolved.resolved_at_ms, Some(TARGET + 65_000));
        assert!(!engine.is_locked());
        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.last_resolved().unwrap().id, resolved.id);
    }

    #[test]
    fn put_resolves_loss_on_green_target_bar() {
        let mut engine = engine();
        engine.start(&signal(SignalDirection::Put), NOW).unwrap();
        engine.tick(TARGET);
        let resolved = engine
            .observe(&[candle(TARGET, 1.0840, 1.0850)], TARGET + 65_000)
            .unwrap();
        assert_eq!(resolved.result, TradeResult::Loss);
    }

    #[test]
    fn doji_target_bar_is_a_draw_for_both_directions() {
        for dir in [SignalDirection::Call, SignalDirection::Put] {
            let mut engine = engine();
            engine.start(&signal(dir), NOW).unwrap();
            engine.tick(TARGET);
            let resolved = engine
                .observe(&[candle(TARGET, 1.0840, 1.0840)], TARGET + 65_000)
                .unwrap();
            assert_eq!(resolved.result, TradeResult::Draw);
        }
    }

    #[test]
    fn observe_is_idempotent_after_resolution() {
        let mut engine = engine();
        engine.start(&signal(SignalDirection::Call), NOW).unwrap();
        engine.tick(TARGET);
        let bars = [candle(TARGET, 1.0840, 1.0850)];
        let first = engine.observe(&bars, TARGET + 65_000).unwrap();

        // same matching candle again: nothing changes, nothing appended
        assert!(engine.observe(&bars, TARGET + 70_000).is_none());
        assert_eq!(engine.history().len(), 1);
        let current = engine.current().unwrap();
        assert_eq!(current.result, first.result);
        assert_eq!(current.candle_open, first.candle_open);
        assert_eq!(current.candle_close, first.candle_close);
        assert_eq!(current.resolved_at_ms, first.resolved_at_ms);
    }

    #[test]
    fn resolved_trade_unlocks_the_next_start() {
        let mut engine = engine();
        engine.start(&signal(SignalDirection::Call), NOW).unwrap();
        engine.tick(TARGET);
        engine.observe(&[candle(TARGET, 1.0, 1.1)], TARGET + 65_000);
        assert!(!engine.is_locked());

        let next = engine
            .start(&signal(SignalDirection::Put), TARGET + 70_000)
            .unwrap();
        assert_eq!(next.status, TradeStatus::Armed);
        assert_eq!(next.target_open_ms, clock::next_boundary(TARGET + 70_000, 60));
    }

    #[test]
    fn history_is_bounded_in_memory_too() {
        let mut engine =
            TradeEngine::load(TradeRepository::new(Arc::new(MemoryKvStore::new()), 2));
        let mut now = NOW;
        for _ in 0..4 {
            let rec = engine.start(&signal(SignalDirection::Call), now).unwrap();
            engine.tick(rec.target_open_ms);
            engine.observe(&[candle(rec.target_open_ms, 1.0, 1.1)], rec.target_open_ms + 100);
            now = rec.target_open_ms + 1_000;
        }
        assert_eq!(engine.history().len(), 2);
    }
}
