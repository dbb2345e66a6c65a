//! Tradeflow Library
//!
//! Trade lifecycle engine for a binary-options signal dashboard: arms a
//! directional call against the next candle boundary, enters the trade
//! at that boundary, and auto-grades it WIN/LOSS/DRAW once the target
//! bar closes, persisting every transition.

pub mod clock;
pub mod config;
pub mod engine;
pub mod feed;
pub mod persistence;
pub mod runtime;
pub mod types;
