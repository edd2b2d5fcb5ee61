//! Expiry sweeps. Both run per-customer-atomic: one customer's failure is
//! recorded and the batch keeps going.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use loyalty_core::config::SettingsResolver;
use loyalty_core::error::LoyaltyResult;
use loyalty_core::store::LoyaltyStore;
use loyalty_core::types::{PointsTransaction, TransactionType};

/// Days before the inactivity cutoff during which a customer counts as
/// at-risk but is left untouched.
const AT_RISK_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepError {
    pub customer_id: Uuid,
    pub reason: String,
}

/// Outcome of one sweep over a tenant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    pub processed_count: u64,
    pub total_expired: i64,
    pub at_risk_count: u64,
    pub errors: Vec<SweepError>,
}

pub struct ExpiryEngine {
    store: Arc<dyn LoyaltyStore>,
    settings: SettingsResolver,
}

impl ExpiryEngine {
    pub fn new(store: Arc<dyn LoyaltyStore>, settings: SettingsResolver) -> Self {
        info!("Expiry engine initialized");
        Self { store, settings }
    }

    /// Expire earn and bonus transactions whose `expires_at` has passed. Per
    /// customer: sum the expiring points, deduct no more than the balance
    /// actually holds, post one summarizing Expire row, and null the markers
    /// so a re-run is a no-op.
    pub fn sweep_expired_transactions(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<SweepReport> {
        let rows = self.store.expiring_transactions(tenant_id, now)?;

        let mut by_customer: HashMap<Uuid, Vec<PointsTransaction>> = HashMap::new();
        for row in rows {
            by_customer.entry(row.customer_id).or_default().push(row);
        }

        let mut report = SweepReport::default();
        for (customer_id, rows) in by_customer {
            match self.expire_batch(tenant_id, customer_id, &rows) {
                Ok(expired) => {
                    report.processed_count += 1;
                    report.total_expired += expired;
                }
                Err(e) => {
                    warn!(customer_id = %customer_id, error = %e, "Expiry failed for customer");
                    report.errors.push(SweepError {
                        customer_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        metrics::counter!("loyalty.points_expired").increment(report.total_expired.max(0) as u64);
        info!(
            tenant_id = %tenant_id,
            customers = report.processed_count,
            expired = report.total_expired,
            errors = report.errors.len(),
            "Per-transaction expiry sweep complete"
        );
        Ok(report)
    }

    fn expire_batch(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        rows: &[PointsTransaction],
    ) -> LoyaltyResult<i64> {
        let expiring_sum: i64 = rows.iter().map(|r| r.points).sum();
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let mut expired = 0;
        self.store
            .with_customer(tenant_id, customer_id, &mut |unit| {
                // Never deduct more than is still actually present:
                // redemptions may already have consumed the expiring points.
                let balance = unit.customer().points_balance;
                let deduction = expiring_sum.min(balance.max(0));

                if deduction > 0 {
                    let customer = unit.customer_mut();
                    customer.points_balance -= deduction;
                    let balance_after = customer.points_balance;

                    let mut row = PointsTransaction::new(
                        customer_id,
                        tenant_id,
                        TransactionType::Expire,
                        -deduction,
                        balance_after,
                    );
                    row.reason = Some(format!(
                        "{} points expired from {} transactions",
                        deduction,
                        ids.len()
                    ));
                    unit.push_transaction(row);
                }

                // Marked processed even when the deduction clamps to zero.
                unit.clear_expiry(&ids);
                expired = deduction;
                Ok(())
            })?;

        debug!(
            customer_id = %customer_id,
            expiring = expiring_sum,
            deducted = expired,
            "Expired transactions swept"
        );
        Ok(expired)
    }

    /// Zero the balance of every active customer whose last order predates
    /// the inactivity cutoff (or who never ordered). Customers approaching
    /// the cutoff are counted as at-risk and left alone.
    pub fn sweep_inactive_customers(
        &self,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<SweepReport> {
        let settings = self.settings.resolve(tenant_id);
        let cutoff = now - Duration::days(settings.inactivity_days as i64);
        let warning_edge = cutoff + Duration::days(AT_RISK_WINDOW_DAYS);

        let mut report = SweepReport::default();
        for activity in self.store.active_customers(tenant_id)? {
            if activity.customer.points_balance <= 0 {
                continue;
            }
            let expired = match activity.last_order_at {
                None => true,
                Some(last) if last < cutoff => true,
                Some(last) if last <= warning_edge => {
                    report.at_risk_count += 1;
                    false
                }
                Some(_) => false,
            };
            if !expired {
                continue;
            }

            let customer_id = activity.customer.id;
            match self.expire_full_balance(tenant_id, customer_id, settings.inactivity_days) {
                Ok(expired) => {
                    report.processed_count += 1;
                    report.total_expired += expired;
                }
                Err(e) => {
                    warn!(customer_id = %customer_id, error = %e, "Inactivity expiry failed");
                    report.errors.push(SweepError {
                        customer_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        metrics::counter!("loyalty.points_expired").increment(report.total_expired.max(0) as u64);
        info!(
            tenant_id = %tenant_id,
            customers = report.processed_count,
            expired = report.total_expired,
            at_risk = report.at_risk_count,
            "Inactivity expiry sweep complete"
        );
        Ok(report)
    }

    fn expire_full_balance(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        inactivity_days: u32,
    ) -> LoyaltyResult<i64> {
        let mut expired = 0;
        self.store
            .with_customer(tenant_id, customer_id, &mut |unit| {
                let balance = unit.customer().points_balance;
                if balance <= 0 {
                    return Ok(());
                }
                let customer = unit.customer_mut();
                customer.points_balance = 0;

                let mut row = PointsTransaction::new(
                    customer_id,
                    tenant_id,
                    TransactionType::Expire,
                    -balance,
                    0,
                );
                row.reason = Some(format!(
                    "Balance expired after {inactivity_days} days of inactivity"
                ));
                unit.push_transaction(row);
                expired = balance;
                Ok(())
            })?;
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loyalty_core::config::LoyaltySettings;
    use loyalty_core::types::{replay_balance, BonusType, Customer, Order};
    use loyalty_store::MemoryStore;

    fn engine() -> (Arc<MemoryStore>, ExpiryEngine, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let resolver = SettingsResolver::new(LoyaltySettings::default());
        let engine = ExpiryEngine::new(store.clone(), resolver);
        (store, engine, Uuid::new_v4())
    }

    fn customer_with_earns(
        store: &MemoryStore,
        tenant: Uuid,
        earns: &[(i64, Option<DateTime<Utc>>)],
    ) -> Uuid {
        let customer = Customer::new(tenant);
        let id = customer.id;
        store.insert_customer(customer);
        store
            .with_customer(tenant, id, &mut |unit| {
                for &(points, expires_at) in earns {
                    let customer = unit.customer_mut();
                    customer.points_balance += points;
                    customer.points_earned_lifetime += points;
                    let balance_after = customer.points_balance;
                    let mut row = PointsTransaction::new(
                        id,
                        tenant,
                        TransactionType::Earn,
                        points,
                        balance_after,
                    );
                    row.expires_at = expires_at;
                    unit.push_transaction(row);
                }
                Ok(())
            })
            .unwrap();
        id
    }

    #[test]
    fn test_sweep_deducts_expired_and_is_idempotent() {
        let (store, engine, tenant) = engine();
        let now = Utc::now();
        let id = customer_with_earns(
            &store,
            tenant,
            &[
                (60, Some(now - Duration::days(1))),
                (40, Some(now + Duration::days(30))),
            ],
        );

        let report = engine.sweep_expired_transactions(tenant, now).unwrap();
        assert_eq!(report.processed_count, 1);
        assert_eq!(report.total_expired, 60);
        assert!(report.errors.is_empty());

        let customer = store.customer(tenant, id).unwrap().unwrap();
        assert_eq!(customer.points_balance, 40);

        // Marker nulled: re-running sweeps nothing.
        let rerun = engine.sweep_expired_transactions(tenant, now).unwrap();
        assert_eq!(rerun.processed_count, 0);
        assert_eq!(rerun.total_expired, 0);
        assert_eq!(
            store.customer(tenant, id).unwrap().unwrap().points_balance,
            40
        );
    }

    #[test]
    fn test_bonus_rows_expire_like_earns() {
        let (store, engine, tenant) = engine();
        let now = Utc::now();

        // A milestone bonus whose expiry window lapsed 35 days ago.
        let customer = Customer::new(tenant);
        let id = customer.id;
        store.insert_customer(customer);
        store
            .with_customer(tenant, id, &mut |unit| {
                let customer = unit.customer_mut();
                customer.points_balance += 100;
                customer.points_earned_lifetime += 100;
                let mut row =
                    PointsTransaction::new(id, tenant, TransactionType::Bonus, 100, 100);
                row.bonus_type = Some(BonusType::Milestone);
                row.milestone_visit = Some(10);
                row.expires_at = Some(now - Duration::days(35));
                unit.push_transaction(row);
                Ok(())
            })
            .unwrap();

        let report = engine.sweep_expired_transactions(tenant, now).unwrap();
        assert_eq!(report.total_expired, 100);
        assert_eq!(store.customer(tenant, id).unwrap().unwrap().points_balance, 0);
        // Marker nulled along with the deduction.
        assert!(store.expiring_transactions(tenant, now).unwrap().is_empty());
    }

    #[test]
    fn test_expiry_never_drives_balance_negative() {
        let (store, engine, tenant) = engine();
        let now = Utc::now();

        // Expiring earns total 100, but redemptions already consumed 70.
        let id = customer_with_earns(
            &store,
            tenant,
            &[
                (60, Some(now - Duration::days(2))),
                (40, Some(now - Duration::days(1))),
            ],
        );
        store
            .with_customer(tenant, id, &mut |unit| {
                let customer = unit.customer_mut();
                customer.points_balance -= 70;
                customer.points_redeemed_lifetime += 70;
                let balance_after = customer.points_balance;
                unit.push_transaction(PointsTransaction::new(
                    id,
                    tenant,
                    TransactionType::Redeem,
                    -70,
                    balance_after,
                ));
                Ok(())
            })
            .unwrap();

        let report = engine.sweep_expired_transactions(tenant, now).unwrap();
        // Only the 30 still present can expire: min(balance, expiring sum).
        assert_eq!(report.total_expired, 30);
        let customer = store.customer(tenant, id).unwrap().unwrap();
        assert_eq!(customer.points_balance, 0);
        assert_eq!(replay_balance(&store.ledger(tenant, id)), 0);
    }

    #[test]
    fn test_expiry_clamp_property_over_redemption_levels() {
        // For any redeemed amount r, sweeping reduces the balance by exactly
        // min(balance, expiring sum) and never below zero.
        for redeemed in [0i64, 25, 50, 99, 100] {
            let (store, engine, tenant) = engine();
            let now = Utc::now();
            let id =
                customer_with_earns(&store, tenant, &[(100, Some(now - Duration::days(1)))]);
            if redeemed > 0 {
                store
                    .with_customer(tenant, id, &mut |unit| {
                        let customer = unit.customer_mut();
                        customer.points_balance -= redeemed;
                        let balance_after = customer.points_balance;
                        unit.push_transaction(PointsTransaction::new(
                            id,
                            tenant,
                            TransactionType::Redeem,
                            -redeemed,
                            balance_after,
                        ));
                        Ok(())
                    })
                    .unwrap();
            }

            let report = engine.sweep_expired_transactions(tenant, now).unwrap();
            assert_eq!(report.total_expired, (100 - redeemed).min(100));
            let balance = store.customer(tenant, id).unwrap().unwrap().points_balance;
            assert_eq!(balance, 0);
        }
    }

    #[test]
    fn test_sweep_continues_past_failing_customer() {
        let (store, engine, tenant) = engine();
        let now = Utc::now();

        let healthy = customer_with_earns(&store, tenant, &[(50, Some(now - Duration::days(1)))]);

        // An expiring row pointing at a customer record that no longer
        // exists: that unit fails, the sweep records it and keeps going.
        let host = customer_with_earns(&store, tenant, &[(10, Some(now - Duration::days(1)))]);
        let orphan = Uuid::new_v4();
        let mut row = store.ledger(tenant, host)[0].clone();
        row.id = Uuid::new_v4();
        row.customer_id = orphan;
        store
            .with_customer(tenant, host, &mut |unit| {
                unit.push_transaction(row.clone());
                Ok(())
            })
            .unwrap();

        let report = engine.sweep_expired_transactions(tenant, now).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].customer_id, orphan);
        assert_eq!(
            store
                .customer(tenant, healthy)
                .unwrap()
                .unwrap()
                .points_balance,
            0
        );
    }

    #[test]
    fn test_inactivity_sweep_buckets() {
        let (store, engine, tenant) = engine();
        let now = Utc::now();

        let order = |store: &MemoryStore, id: Uuid, days_ago: i64| {
            store.record_order(
                tenant,
                Order {
                    id: Uuid::new_v4(),
                    customer_id: id,
                    total_amount: 100.0,
                    placed_at: now - Duration::days(days_ago),
                },
            );
        };

        let lapsed = customer_with_earns(&store, tenant, &[(500, None)]);
        order(&store, lapsed, 400);

        let active = customer_with_earns(&store, tenant, &[(300, None)]);
        order(&store, active, 20);

        let at_risk = customer_with_earns(&store, tenant, &[(200, None)]);
        order(&store, at_risk, 350);

        let never_ordered = customer_with_earns(&store, tenant, &[(100, None)]);

        let zero_balance = Customer::new(tenant);
        store.insert_customer(zero_balance);

        let report = engine.sweep_inactive_customers(tenant, now).unwrap();
        assert_eq!(report.processed_count, 2); // lapsed + never_ordered
        assert_eq!(report.total_expired, 600);
        assert_eq!(report.at_risk_count, 1);
        assert!(report.errors.is_empty());

        assert_eq!(store.customer(tenant, lapsed).unwrap().unwrap().points_balance, 0);
        assert_eq!(store.customer(tenant, never_ordered).unwrap().unwrap().points_balance, 0);
        assert_eq!(store.customer(tenant, active).unwrap().unwrap().points_balance, 300);
        assert_eq!(store.customer(tenant, at_risk).unwrap().unwrap().points_balance, 200);

        // The inactivity Expire row reads like an audit trail entry.
        let reason = store.ledger(tenant, lapsed).last().unwrap().reason.clone();
        assert_eq!(
            reason.as_deref(),
            Some("Balance expired after 365 days of inactivity")
        );
    }

    #[test]
    fn test_both_sweeps_compose_without_conflict() {
        let (store, engine, tenant) = engine();
        let now = Utc::now();

        let id = customer_with_earns(&store, tenant, &[(250, Some(now - Duration::days(1)))]);
        // No orders at all: inactivity zeroes the balance first.
        let inactivity = engine.sweep_inactive_customers(tenant, now).unwrap();
        assert_eq!(inactivity.total_expired, 250);

        // Per-transaction expiry then clamps to zero and only clears markers.
        let per_txn = engine.sweep_expired_transactions(tenant, now).unwrap();
        assert_eq!(per_txn.total_expired, 0);
        assert_eq!(per_txn.processed_count, 1);
        let balance = store.customer(tenant, id).unwrap().unwrap().points_balance;
        assert_eq!(balance, 0);
        assert_eq!(replay_balance(&store.ledger(tenant, id)), 0);
    }
}
