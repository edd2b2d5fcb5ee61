//! Birthday and visit-milestone bonus rules. Both are safe to call more than
//! once for the same trigger: the prior-transaction check is the correctness
//! mechanism, not an external scheduler.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use loyalty_core::config::SettingsResolver;
use loyalty_core::error::{LoyaltyError, LoyaltyResult};
use loyalty_core::store::{LoyaltyStore, TransactionFilter};
use loyalty_core::types::{BonusOutcome, BonusType, PointsTransaction, TransactionType};

pub struct RewardsEngine {
    store: Arc<dyn LoyaltyStore>,
    settings: SettingsResolver,
}

impl RewardsEngine {
    pub fn new(store: Arc<dyn LoyaltyStore>, settings: SettingsResolver) -> Self {
        info!("Rewards engine initialized");
        Self { store, settings }
    }

    /// Award the birthday bonus if today (on the tenant's clock) matches the
    /// customer's date of birth and no birthday bonus was posted yet this
    /// calendar year.
    pub fn check_and_award_birthday_bonus(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<BonusOutcome> {
        let settings = self.settings.resolve(tenant_id);
        let customer = self
            .store
            .customer(tenant_id, customer_id)?
            .ok_or(LoyaltyError::CustomerNotFound(customer_id))?;
        let skipped =
            BonusOutcome::skipped(customer_id, BonusType::Birthday, customer.points_balance);

        if !settings.enabled || settings.birthday_bonus_points <= 0 {
            return Ok(skipped);
        }
        let Some(dob) = customer.date_of_birth else {
            return Ok(skipped);
        };

        let offset = settings.tenant_offset();
        let today = now.with_timezone(&offset).date_naive();
        if (today.month(), today.day()) != (dob.month(), dob.day()) {
            return Ok(skipped);
        }

        // One award per calendar year, year boundary on the tenant's clock.
        let filter = TransactionFilter {
            transaction_type: Some(TransactionType::Bonus),
            bonus_type: Some(BonusType::Birthday),
            ..Default::default()
        };
        let this_year = today.year();
        let outcome = self.award(
            tenant_id,
            customer_id,
            settings.birthday_bonus_points,
            BonusType::Birthday,
            None,
            "Birthday bonus",
            &settings,
            now,
            &filter,
            &|t| t.created_at.with_timezone(&offset).year() == this_year,
        )?;
        if outcome.awarded {
            metrics::counter!("loyalty.birthday_bonuses").increment(1);
        }
        Ok(outcome)
    }

    /// Award the configured bonus for reaching `visit_number` total visits.
    /// A prior milestone row for the same visit number (matched by equality
    /// on the structured field) suppresses the award.
    pub fn check_and_award_visit_milestone(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        visit_number: u64,
        now: DateTime<Utc>,
    ) -> LoyaltyResult<BonusOutcome> {
        let settings = self.settings.resolve(tenant_id);
        let customer = self
            .store
            .customer(tenant_id, customer_id)?
            .ok_or(LoyaltyError::CustomerNotFound(customer_id))?;
        let skipped =
            BonusOutcome::skipped(customer_id, BonusType::Milestone, customer.points_balance);

        if !settings.enabled {
            return Ok(skipped);
        }
        let Some(&bonus_points) = settings.visit_milestones.get(&visit_number) else {
            return Ok(skipped);
        };

        let filter = TransactionFilter {
            transaction_type: Some(TransactionType::Bonus),
            bonus_type: Some(BonusType::Milestone),
            milestone_visit: Some(visit_number),
            ..Default::default()
        };
        let outcome = self.award(
            tenant_id,
            customer_id,
            bonus_points,
            BonusType::Milestone,
            Some(visit_number),
            &format!("Visit milestone {visit_number}"),
            &settings,
            now,
            &filter,
            &|_| true,
        )?;
        if outcome.awarded {
            metrics::counter!("loyalty.milestone_bonuses").increment(1);
        }
        Ok(outcome)
    }

    /// Shared atomic award path: balance and lifetime-earned move together
    /// with the Bonus ledger row. The duplicate check runs inside the unit of
    /// work, under the per-customer lock — a concurrent award for the same
    /// trigger has either committed its row already or is queued behind this
    /// one, so both can never pass the check.
    #[allow(clippy::too_many_arguments)]
    fn award(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        points: i64,
        bonus_type: BonusType,
        milestone_visit: Option<u64>,
        reason: &str,
        settings: &loyalty_core::LoyaltySettings,
        now: DateTime<Utc>,
        filter: &TransactionFilter,
        already_awarded: &dyn Fn(&PointsTransaction) -> bool,
    ) -> LoyaltyResult<BonusOutcome> {
        let mut outcome: Option<BonusOutcome> = None;
        self.store
            .with_customer(tenant_id, customer_id, &mut |unit| {
                let prior = self.store.transactions(tenant_id, customer_id, filter)?;
                if prior.iter().any(already_awarded) {
                    debug!(
                        customer_id = %customer_id,
                        bonus = ?bonus_type,
                        "Bonus already awarded for this trigger"
                    );
                    outcome = Some(BonusOutcome::skipped(
                        customer_id,
                        bonus_type,
                        unit.customer().points_balance,
                    ));
                    return Ok(());
                }

                let customer = unit.customer_mut();
                customer.points_balance += points;
                customer.points_earned_lifetime += points;
                let balance_after = customer.points_balance;

                let mut row = PointsTransaction::new(
                    customer_id,
                    tenant_id,
                    TransactionType::Bonus,
                    points,
                    balance_after,
                );
                row.bonus_type = Some(bonus_type);
                row.milestone_visit = milestone_visit;
                row.reason = Some(reason.to_string());
                if settings.expiry_window_days > 0 {
                    row.expires_at = Some(now + Duration::days(settings.expiry_window_days as i64));
                }
                unit.push_transaction(row);

                outcome = Some(BonusOutcome {
                    customer_id,
                    awarded: true,
                    bonus_type,
                    points,
                    new_balance: balance_after,
                });
                Ok(())
            })?;

        let outcome = outcome
            .ok_or_else(|| LoyaltyError::Store("bonus unit committed without an outcome".into()))?;
        if outcome.awarded {
            metrics::counter!("loyalty.bonus_points_awarded").increment(points.max(0) as u64);
            info!(
                customer_id = %customer_id,
                bonus = ?bonus_type,
                points = points,
                balance = outcome.new_balance,
                "Bonus awarded"
            );
        }
        Ok(outcome)
    }
}
