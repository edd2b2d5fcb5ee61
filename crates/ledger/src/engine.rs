//! Ledger engine: earn, redeem, and manual adjustments. Every mutation runs
//! inside a store unit of work, so the customer row and the ledger row land
//! together or not at all.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use loyalty_core::config::SettingsResolver;
use loyalty_core::error::{LoyaltyError, LoyaltyResult};
use loyalty_core::store::LoyaltyStore;
use loyalty_core::types::{
    AdjustOutcome, EarnOutcome, PointsTransaction, RedeemDenied, RedeemOutcome, TransactionType,
};

use crate::tier;

pub struct LedgerEngine {
    store: Arc<dyn LoyaltyStore>,
    settings: SettingsResolver,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn LoyaltyStore>, settings: SettingsResolver) -> Self {
        info!("Ledger engine initialized");
        Self { store, settings }
    }

    /// Earn points for an order. A computed zero is a successful no-op, not
    /// an error; the current balance is returned untouched.
    pub fn earn(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        order_id: Uuid,
        order_amount: f64,
    ) -> LoyaltyResult<EarnOutcome> {
        if order_amount < 0.0 {
            return Err(LoyaltyError::Validation(format!(
                "order amount must be non-negative, got {order_amount}"
            )));
        }

        let settings = self.settings.resolve(tenant_id);
        if !settings.enabled {
            let balance = self
                .store
                .customer(tenant_id, customer_id)?
                .ok_or(LoyaltyError::CustomerNotFound(customer_id))?
                .points_balance;
            return Ok(EarnOutcome {
                customer_id,
                points_earned: 0,
                new_balance: balance,
                tier_upgraded: false,
                new_tier: None,
            });
        }

        let now = Utc::now();
        let mut outcome: Option<EarnOutcome> = None;
        self.store
            .with_customer(tenant_id, customer_id, &mut |unit| {
                // Multiplier comes from the tier as it was before this call
                // mutates anything.
                let current_tier = unit.customer().tier;
                let points = settings.points_for_amount(order_amount, current_tier);

                if points == 0 {
                    outcome = Some(EarnOutcome {
                        customer_id,
                        points_earned: 0,
                        new_balance: unit.customer().points_balance,
                        tier_upgraded: false,
                        new_tier: None,
                    });
                    return Ok(());
                }

                let customer = unit.customer_mut();
                customer.points_balance += points;
                customer.points_earned_lifetime += points;
                customer.total_spent += order_amount;
                customer.total_visits += 1;
                // Recomputed from the new totals rather than incrementally
                // averaged, so the mean cannot drift.
                customer.average_order_value =
                    customer.total_spent / customer.total_visits as f64;

                let recomputed = tier::determine_tier(
                    customer.points_earned_lifetime,
                    &settings.tier_thresholds,
                );
                let upgrade = tier::detect_upgrade(current_tier, recomputed);
                if let Some(new_tier) = upgrade {
                    customer.tier = new_tier;
                }
                let balance_after = customer.points_balance;

                let mut row = PointsTransaction::new(
                    customer_id,
                    tenant_id,
                    TransactionType::Earn,
                    points,
                    balance_after,
                );
                row.order_id = Some(order_id);
                if settings.expiry_window_days > 0 {
                    row.expires_at = Some(now + Duration::days(settings.expiry_window_days as i64));
                }
                unit.push_transaction(row);

                outcome = Some(EarnOutcome {
                    customer_id,
                    points_earned: points,
                    new_balance: balance_after,
                    tier_upgraded: upgrade.is_some(),
                    new_tier: upgrade,
                });
                Ok(())
            })?;

        let outcome = outcome
            .ok_or_else(|| LoyaltyError::Store("earn unit committed without an outcome".into()))?;

        metrics::counter!("loyalty.points_earned").increment(outcome.points_earned.max(0) as u64);
        if outcome.tier_upgraded {
            metrics::counter!("loyalty.tier_upgrades").increment(1);
            info!(
                customer_id = %customer_id,
                new_tier = ?outcome.new_tier,
                "Tier upgrade"
            );
        }
        debug!(
            customer_id = %customer_id,
            order_id = %order_id,
            points = outcome.points_earned,
            balance = outcome.new_balance,
            "Points earned"
        );
        Ok(outcome)
    }

    /// Redeem points against a bill. Validation failures come back as a
    /// refused outcome with the specific reason and no mutation; the balance
    /// checks are repeated inside the unit of work so concurrent redemptions
    /// cannot jointly overdraw.
    pub fn redeem(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        bill_id: Uuid,
        points_to_redeem: i64,
    ) -> LoyaltyResult<RedeemOutcome> {
        let settings = self.settings.resolve(tenant_id);

        let Some(customer) = self.store.customer(tenant_id, customer_id)? else {
            return Ok(RedeemOutcome::denied(
                customer_id,
                0,
                RedeemDenied::CustomerNotFound,
            ));
        };
        let balance = customer.points_balance;

        if !settings.enabled {
            return Ok(RedeemOutcome::denied(
                customer_id,
                balance,
                RedeemDenied::LoyaltyDisabled,
            ));
        }
        if points_to_redeem < settings.min_redeem_points {
            return Ok(RedeemOutcome::denied(
                customer_id,
                balance,
                RedeemDenied::BelowMinimum {
                    min: settings.min_redeem_points,
                },
            ));
        }
        if balance < points_to_redeem {
            return Ok(RedeemOutcome::denied(
                customer_id,
                balance,
                RedeemDenied::Insufficient {
                    need: points_to_redeem,
                    have: balance,
                },
            ));
        }
        let Some(bill) = self.store.bill(tenant_id, bill_id)? else {
            return Ok(RedeemOutcome::denied(
                customer_id,
                balance,
                RedeemDenied::BillNotFound,
            ));
        };
        let cap = settings.max_redeemable(bill.total_amount, balance);
        if points_to_redeem > cap {
            return Ok(RedeemOutcome::denied(
                customer_id,
                balance,
                RedeemDenied::OverBillCap { max: cap },
            ));
        }

        let mut outcome: Option<RedeemOutcome> = None;
        self.store
            .with_customer(tenant_id, customer_id, &mut |unit| {
                // Re-validate against the serialized state, not the earlier
                // point-in-time read.
                let balance = unit.customer().points_balance;
                if balance < points_to_redeem {
                    outcome = Some(RedeemOutcome::denied(
                        customer_id,
                        balance,
                        RedeemDenied::Insufficient {
                            need: points_to_redeem,
                            have: balance,
                        },
                    ));
                    return Ok(());
                }
                let cap = settings.max_redeemable(bill.total_amount, balance);
                if points_to_redeem > cap {
                    outcome = Some(RedeemOutcome::denied(
                        customer_id,
                        balance,
                        RedeemDenied::OverBillCap { max: cap },
                    ));
                    return Ok(());
                }

                let discount = points_to_redeem as f64 * settings.point_value;
                let customer = unit.customer_mut();
                customer.points_balance -= points_to_redeem;
                customer.points_redeemed_lifetime += points_to_redeem;
                let balance_after = customer.points_balance;

                let mut row = PointsTransaction::new(
                    customer_id,
                    tenant_id,
                    TransactionType::Redeem,
                    -points_to_redeem,
                    balance_after,
                );
                row.bill_id = Some(bill_id);
                unit.push_transaction(row);

                let mut annotated = bill.clone();
                annotated.points_redeemed += points_to_redeem;
                annotated.points_discount += discount;
                unit.annotate_bill(annotated);

                outcome = Some(RedeemOutcome {
                    customer_id,
                    success: true,
                    points_redeemed: points_to_redeem,
                    discount_amount: discount,
                    new_balance: balance_after,
                    error: None,
                });
                Ok(())
            })?;

        let outcome = outcome
            .ok_or_else(|| LoyaltyError::Store("redeem unit committed without an outcome".into()))?;

        if outcome.success {
            metrics::counter!("loyalty.points_redeemed").increment(points_to_redeem as u64);
            metrics::counter!("loyalty.redemptions").increment(1);
            info!(
                customer_id = %customer_id,
                bill_id = %bill_id,
                points = points_to_redeem,
                discount = outcome.discount_amount,
                balance = outcome.new_balance,
                "Points redeemed"
            );
        } else {
            debug!(
                customer_id = %customer_id,
                reason = ?outcome.error,
                "Redemption refused"
            );
        }
        Ok(outcome)
    }

    /// Unconditional signed correction. Rejects a negative resulting balance
    /// unless the caller explicitly allows it; the adjusting staff member is
    /// recorded on the ledger row.
    pub fn adjust(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        delta: i64,
        reason: &str,
        adjusted_by: &str,
        allow_negative: bool,
    ) -> LoyaltyResult<AdjustOutcome> {
        let mut outcome: Option<AdjustOutcome> = None;
        self.store
            .with_customer(tenant_id, customer_id, &mut |unit| {
                let new_balance = unit.customer().points_balance + delta;
                if new_balance < 0 && !allow_negative {
                    return Err(LoyaltyError::Validation(format!(
                        "adjustment of {delta} would leave balance at {new_balance}"
                    )));
                }

                unit.customer_mut().points_balance = new_balance;
                let mut row = PointsTransaction::new(
                    customer_id,
                    tenant_id,
                    TransactionType::Adjust,
                    delta,
                    new_balance,
                );
                row.reason = Some(reason.to_string());
                row.adjusted_by = Some(adjusted_by.to_string());
                unit.push_transaction(row);

                outcome = Some(AdjustOutcome {
                    customer_id,
                    new_balance,
                });
                Ok(())
            })?;

        let outcome = outcome
            .ok_or_else(|| LoyaltyError::Store("adjust unit committed without an outcome".into()))?;
        warn!(
            customer_id = %customer_id,
            delta = delta,
            by = adjusted_by,
            balance = outcome.new_balance,
            "Manual balance adjustment"
        );
        Ok(outcome)
    }
}
