//! In-memory reference store — DashMap-backed implementation of the
//! `LoyaltyStore` trait with per-customer unit-of-work serialization.

pub mod memory;

pub use memory::MemoryStore;
