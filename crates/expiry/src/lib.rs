//! Scheduled expiry sweeps — per-transaction expiry and inactivity-based
//! full-balance expiry.

pub mod engine;

pub use engine::{ExpiryEngine, SweepError, SweepReport};
