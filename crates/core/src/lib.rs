pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::{LoyaltySettings, SettingsResolver};
pub use error::{LoyaltyError, LoyaltyResult};
