//! Ledger core — the append-only points log, tier transitions, and the
//! birthday / visit-milestone bonus rules.

pub mod engine;
pub mod rewards;
pub mod tier;

pub use engine::LedgerEngine;
pub use rewards::RewardsEngine;
