//! Loyalty domain types — customers, the append-only points ledger, and the
//! plain result values returned by every engine operation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{TierMultipliers, TierThresholds};

// ─── Tier System ────────────────────────────────────────────────────────────

/// Customer rank. Gates the earn-rate multiplier; never downgraded by the
/// earn path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
    Platinum,
}

impl Tier {
    /// Highest tier whose threshold is at or below the lifetime-earned total,
    /// checked from the top down. Bronze is the floor.
    pub fn for_lifetime(lifetime_earned: i64, thresholds: &TierThresholds) -> Self {
        if lifetime_earned >= thresholds.platinum {
            Tier::Platinum
        } else if lifetime_earned >= thresholds.gold {
            Tier::Gold
        } else if lifetime_earned >= thresholds.silver {
            Tier::Silver
        } else {
            Tier::Bronze
        }
    }

    /// Earn-rate multiplier for this tier under the given table.
    pub fn multiplier(&self, multipliers: &TierMultipliers) -> f64 {
        match self {
            Tier::Bronze => multipliers.bronze,
            Tier::Silver => multipliers.silver,
            Tier::Gold => multipliers.gold,
            Tier::Platinum => multipliers.platinum,
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Bronze
    }
}

// ─── Customers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CustomerStatus {
    Active,
    Inactive,
    Blocked,
}

/// Customer record as the ledger sees it. The ledger is the only writer of
/// `points_balance`, the lifetime counters, and `tier`; the balance is always
/// reproducible by replaying that customer's transactions in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub points_balance: i64,
    pub points_earned_lifetime: i64,
    pub points_redeemed_lifetime: i64,
    pub tier: Tier,
    pub total_spent: f64,
    pub total_visits: u64,
    pub average_order_value: f64,
    pub date_of_birth: Option<NaiveDate>,
    pub status: CustomerStatus,
    pub created_at: DateTime<Utc>,
}

impl Customer {
    /// New active customer with an empty ledger.
    pub fn new(tenant_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            points_balance: 0,
            points_earned_lifetime: 0,
            points_redeemed_lifetime: 0,
            tier: Tier::Bronze,
            total_spent: 0.0,
            total_visits: 0,
            average_order_value: 0.0,
            date_of_birth: None,
            status: CustomerStatus::Active,
            created_at: Utc::now(),
        }
    }
}

/// Population snapshot row: a customer plus their most recent order date,
/// as returned by the store's tenant-wide query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerActivity {
    pub customer: Customer,
    pub last_order_at: Option<DateTime<Utc>>,
}

// ─── Points Ledger ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Earn,
    Redeem,
    Bonus,
    Expire,
    Adjust,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BonusType {
    Birthday,
    Milestone,
}

/// One row of the append-only ledger. Never mutated after insert, except that
/// `expires_at` is nulled once an expiry sweep has processed the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsTransaction {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub tenant_id: Uuid,
    pub transaction_type: TransactionType,
    /// Signed delta: positive for Earn/Bonus, negative for Redeem/Expire,
    /// either sign for Adjust.
    pub points: i64,
    /// Snapshot of the balance after this row was applied.
    pub balance_after: i64,
    pub order_id: Option<Uuid>,
    pub bill_id: Option<Uuid>,
    pub bonus_type: Option<BonusType>,
    /// Which visit milestone this bonus paid out, checked by equality when
    /// preventing a double award.
    pub milestone_visit: Option<u64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub adjusted_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PointsTransaction {
    /// Ledger row with all optional linkage unset.
    pub fn new(
        customer_id: Uuid,
        tenant_id: Uuid,
        transaction_type: TransactionType,
        points: i64,
        balance_after: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            tenant_id,
            transaction_type,
            points,
            balance_after,
            order_id: None,
            bill_id: None,
            bonus_type: None,
            milestone_visit: None,
            expires_at: None,
            reason: None,
            adjusted_by: None,
            created_at: Utc::now(),
        }
    }
}

/// Replay a customer's transaction deltas in creation order. Audit
/// cross-check: the result must always equal the stored `points_balance`.
pub fn replay_balance(transactions: &[PointsTransaction]) -> i64 {
    let mut ordered: Vec<&PointsTransaction> = transactions.iter().collect();
    ordered.sort_by_key(|t| t.created_at);
    ordered.iter().map(|t| t.points).sum()
}

// ─── Orders & Bills ─────────────────────────────────────────────────────────

/// Minimal view of an order, read for recency checks and earn linkage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub total_amount: f64,
    pub placed_at: DateTime<Utc>,
}

/// Minimal view of a bill. Redeemed points and the discount are annotated
/// back onto it inside the redeem unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub total_amount: f64,
    pub points_redeemed: i64,
    pub points_discount: f64,
}

// ─── Operation Outcomes ─────────────────────────────────────────────────────

/// Result of an earn call. A zero-point earn is a successful no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EarnOutcome {
    pub customer_id: Uuid,
    pub points_earned: i64,
    pub new_balance: i64,
    pub tier_upgraded: bool,
    pub new_tier: Option<Tier>,
}

/// Why a redemption was refused. Expected business outcomes, never errors;
/// refusal leaves the ledger untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum RedeemDenied {
    #[error("loyalty program is disabled")]
    LoyaltyDisabled,
    #[error("minimum redemption is {min} points")]
    BelowMinimum { min: i64 },
    #[error("insufficient points: need {need}, have {have}")]
    Insufficient { need: i64, have: i64 },
    #[error("at most {max} points may be applied to this bill")]
    OverBillCap { max: i64 },
    #[error("customer not found")]
    CustomerNotFound,
    #[error("bill not found")]
    BillNotFound,
}

/// Result of a redeem call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemOutcome {
    pub customer_id: Uuid,
    pub success: bool,
    pub points_redeemed: i64,
    pub discount_amount: f64,
    pub new_balance: i64,
    pub error: Option<RedeemDenied>,
}

impl RedeemOutcome {
    /// Refusal with the balance left as it was.
    pub fn denied(customer_id: Uuid, balance: i64, reason: RedeemDenied) -> Self {
        Self {
            customer_id,
            success: false,
            points_redeemed: 0,
            discount_amount: 0.0,
            new_balance: balance,
            error: Some(reason),
        }
    }
}

/// Result of a bonus eligibility check. `awarded == false` means the
/// idempotency or eligibility test declined, not that anything failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BonusOutcome {
    pub customer_id: Uuid,
    pub awarded: bool,
    pub bonus_type: BonusType,
    pub points: i64,
    pub new_balance: i64,
}

impl BonusOutcome {
    pub fn skipped(customer_id: Uuid, bonus_type: BonusType, balance: i64) -> Self {
        Self {
            customer_id,
            awarded: false,
            bonus_type,
            points: 0,
            new_balance: balance,
        }
    }
}

/// Result of a manual adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustOutcome {
    pub customer_id: Uuid,
    pub new_balance: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TierThresholds;

    #[test]
    fn test_tier_for_lifetime_ladder() {
        let t = TierThresholds::default();
        assert_eq!(Tier::for_lifetime(0, &t), Tier::Bronze);
        assert_eq!(Tier::for_lifetime(499, &t), Tier::Bronze);
        assert_eq!(Tier::for_lifetime(500, &t), Tier::Silver);
        assert_eq!(Tier::for_lifetime(2_000, &t), Tier::Gold);
        assert_eq!(Tier::for_lifetime(9_999, &t), Tier::Gold);
        assert_eq!(Tier::for_lifetime(10_000, &t), Tier::Platinum);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Bronze < Tier::Silver);
        assert!(Tier::Gold < Tier::Platinum);
    }

    #[test]
    fn test_replay_balance_sums_in_creation_order() {
        let customer = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let mut rows = vec![
            PointsTransaction::new(customer, tenant, TransactionType::Earn, 100, 100),
            PointsTransaction::new(customer, tenant, TransactionType::Redeem, -40, 60),
            PointsTransaction::new(customer, tenant, TransactionType::Bonus, 25, 85),
            PointsTransaction::new(customer, tenant, TransactionType::Expire, -10, 75),
        ];
        // Shuffle storage order; replay must still sort by creation time.
        rows.swap(0, 3);
        assert_eq!(replay_balance(&rows), 75);
    }
}
