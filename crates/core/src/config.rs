//! Per-tenant loyalty configuration. Settings are resolved once at the start
//! of an operation and threaded through as a value — never a shared mutable
//! singleton, so concurrent tenants stay isolated.

use std::collections::BTreeMap;

use chrono::FixedOffset;
use dashmap::DashMap;
use serde::Deserialize;
use uuid::Uuid;

use crate::types::Tier;

/// Lifetime-earned thresholds for each tier. Bronze is always zero.
#[derive(Debug, Clone, Deserialize)]
pub struct TierThresholds {
    #[serde(default = "default_silver_threshold")]
    pub silver: i64,
    #[serde(default = "default_gold_threshold")]
    pub gold: i64,
    #[serde(default = "default_platinum_threshold")]
    pub platinum: i64,
}

/// Earn-rate multipliers per tier.
#[derive(Debug, Clone, Deserialize)]
pub struct TierMultipliers {
    #[serde(default = "default_bronze_multiplier")]
    pub bronze: f64,
    #[serde(default = "default_silver_multiplier")]
    pub silver: f64,
    #[serde(default = "default_gold_multiplier")]
    pub gold: f64,
    #[serde(default = "default_platinum_multiplier")]
    pub platinum: f64,
}

/// A tenant's loyalty program configuration, immutable during a single
/// operation.
#[derive(Debug, Clone, Deserialize)]
pub struct LoyaltySettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Currency units per earning bucket: spend this much to fill one bucket.
    #[serde(default = "default_currency_per_point")]
    pub currency_per_point: f64,
    /// Points granted per full bucket.
    #[serde(default = "default_points_per_unit")]
    pub points_per_unit: i64,
    /// Currency value of one redeemed point.
    #[serde(default = "default_point_value")]
    pub point_value: f64,
    #[serde(default = "default_min_redeem_points")]
    pub min_redeem_points: i64,
    /// Maximum percentage of a bill payable with points.
    #[serde(default = "default_max_redeem_percent")]
    pub max_redeem_percent: f64,
    #[serde(default)]
    pub tier_thresholds: TierThresholds,
    #[serde(default)]
    pub tier_multipliers: TierMultipliers,
    /// Days until earned points expire. Zero disables per-transaction expiry.
    #[serde(default = "default_expiry_window_days")]
    pub expiry_window_days: u32,
    /// Full-balance expiry after this many days without an order.
    #[serde(default = "default_inactivity_days")]
    pub inactivity_days: u32,
    #[serde(default = "default_birthday_bonus_points")]
    pub birthday_bonus_points: i64,
    /// Visit count → one-time bonus points.
    #[serde(default = "default_visit_milestones")]
    pub visit_milestones: BTreeMap<u64, i64>,
    /// Tenant clock offset from UTC, used for every calendar comparison
    /// (birthdays, year windows). Host-local time is never consulted.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

fn default_enabled() -> bool { true }
fn default_currency_per_point() -> f64 { 100.0 }
fn default_points_per_unit() -> i64 { 1 }
fn default_point_value() -> f64 { 1.0 }
fn default_min_redeem_points() -> i64 { 100 }
fn default_max_redeem_percent() -> f64 { 50.0 }
fn default_silver_threshold() -> i64 { 500 }
fn default_gold_threshold() -> i64 { 2_000 }
fn default_platinum_threshold() -> i64 { 10_000 }
fn default_bronze_multiplier() -> f64 { 1.0 }
fn default_silver_multiplier() -> f64 { 1.25 }
fn default_gold_multiplier() -> f64 { 1.5 }
fn default_platinum_multiplier() -> f64 { 2.0 }
fn default_expiry_window_days() -> u32 { 365 }
fn default_inactivity_days() -> u32 { 365 }
fn default_birthday_bonus_points() -> i64 { 200 }

fn default_visit_milestones() -> BTreeMap<u64, i64> {
    BTreeMap::from([(5, 50), (10, 100), (25, 250), (50, 500), (100, 1_000)])
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            silver: default_silver_threshold(),
            gold: default_gold_threshold(),
            platinum: default_platinum_threshold(),
        }
    }
}

impl Default for TierMultipliers {
    fn default() -> Self {
        Self {
            bronze: default_bronze_multiplier(),
            silver: default_silver_multiplier(),
            gold: default_gold_multiplier(),
            platinum: default_platinum_multiplier(),
        }
    }
}

impl Default for LoyaltySettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            currency_per_point: default_currency_per_point(),
            points_per_unit: default_points_per_unit(),
            point_value: default_point_value(),
            min_redeem_points: default_min_redeem_points(),
            max_redeem_percent: default_max_redeem_percent(),
            tier_thresholds: TierThresholds::default(),
            tier_multipliers: TierMultipliers::default(),
            expiry_window_days: default_expiry_window_days(),
            inactivity_days: default_inactivity_days(),
            birthday_bonus_points: default_birthday_bonus_points(),
            visit_milestones: default_visit_milestones(),
            utc_offset_minutes: 0,
        }
    }
}

impl LoyaltySettings {
    /// Load default settings from environment variables with the `LOYALTY__`
    /// prefix (e.g. `LOYALTY__MIN_REDEEM_POINTS=50`).
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("LOYALTY")
                .separator("__")
                .try_parsing(true),
        );
        builder.build()?.try_deserialize()
    }

    /// Earn-rate multiplier for the given tier.
    pub fn multiplier_for(&self, tier: Tier) -> f64 {
        tier.multiplier(&self.tier_multipliers)
    }

    /// Points the earn path grants for an order amount at the given tier:
    /// full buckets only, fractional points are never stored.
    pub fn points_for_amount(&self, order_amount: f64, tier: Tier) -> i64 {
        if self.currency_per_point <= 0.0 {
            return 0;
        }
        let base = (order_amount / self.currency_per_point).floor() as i64 * self.points_per_unit;
        (base as f64 * self.multiplier_for(tier)).floor() as i64
    }

    /// Hard cap on a single redemption: never more than the balance, never
    /// more than `max_redeem_percent` of the bill's currency value.
    pub fn max_redeemable(&self, bill_total: f64, balance: i64) -> i64 {
        if self.point_value <= 0.0 {
            return 0;
        }
        let bill_cap = (bill_total * self.max_redeem_percent / 100.0 / self.point_value).floor() as i64;
        balance.min(bill_cap).max(0)
    }

    /// The tenant's clock as a fixed UTC offset.
    pub fn tenant_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"))
    }
}

/// Resolves the settings for a tenant: global defaults plus any per-tenant
/// override. `resolve` hands back an owned value to thread through the
/// operation.
#[derive(Clone, Default)]
pub struct SettingsResolver {
    defaults: LoyaltySettings,
    overrides: std::sync::Arc<DashMap<Uuid, LoyaltySettings>>,
}

impl SettingsResolver {
    pub fn new(defaults: LoyaltySettings) -> Self {
        Self {
            defaults,
            overrides: std::sync::Arc::new(DashMap::new()),
        }
    }

    pub fn set_override(&self, tenant_id: Uuid, settings: LoyaltySettings) {
        tracing::debug!(tenant_id = %tenant_id, "Loyalty settings override installed");
        self.overrides.insert(tenant_id, settings);
    }

    pub fn clear_override(&self, tenant_id: Uuid) {
        self.overrides.remove(&tenant_id);
    }

    pub fn resolve(&self, tenant_id: Uuid) -> LoyaltySettings {
        self.overrides
            .get(&tenant_id)
            .map(|s| s.clone())
            .unwrap_or_else(|| self.defaults.clone())
    }
}
