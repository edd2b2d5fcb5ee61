//! Store collaborator seam. The engines consume this narrow trait and
//! nothing more; `loyalty-store` ships the in-memory reference implementation.
//!
//! Balance mutations go through [`LoyaltyStore::with_customer`]: the closure
//! stages every write on a [`CustomerUnit`] and the store commits them as one
//! atomic unit, so a partially applied ledger state is structurally
//! impossible.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::LoyaltyResult;
use crate::types::{
    Bill, BonusType, Customer, CustomerActivity, Order, PointsTransaction, TransactionType,
};

/// Query filter for a customer's transaction history.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub transaction_type: Option<TransactionType>,
    pub bonus_type: Option<BonusType>,
    pub milestone_visit: Option<u64>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    pub fn matches(&self, row: &PointsTransaction) -> bool {
        if let Some(t) = self.transaction_type {
            if row.transaction_type != t {
                return false;
            }
        }
        if let Some(b) = self.bonus_type {
            if row.bonus_type != Some(b) {
                return false;
            }
        }
        if let Some(v) = self.milestone_visit {
            if row.milestone_visit != Some(v) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if row.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if row.created_at >= before {
                return false;
            }
        }
        true
    }
}

/// Staging area for one customer's atomic unit of work. The closure mutates
/// the customer, appends ledger rows, and optionally annotates a bill or
/// clears expiry markers; nothing is visible to readers until the store
/// commits the whole unit.
#[derive(Debug)]
pub struct CustomerUnit {
    customer: Customer,
    transactions: Vec<PointsTransaction>,
    bill: Option<Bill>,
    cleared_expiries: Vec<Uuid>,
}

impl CustomerUnit {
    pub fn new(customer: Customer) -> Self {
        Self {
            customer,
            transactions: Vec::new(),
            bill: None,
            cleared_expiries: Vec::new(),
        }
    }

    pub fn customer(&self) -> &Customer {
        &self.customer
    }

    pub fn customer_mut(&mut self) -> &mut Customer {
        &mut self.customer
    }

    /// Append a ledger row to this unit.
    pub fn push_transaction(&mut self, transaction: PointsTransaction) {
        self.transactions.push(transaction);
    }

    /// Stage a bill update (redeemed points / discount annotation).
    pub fn annotate_bill(&mut self, bill: Bill) {
        self.bill = Some(bill);
    }

    /// Mark ledger rows as swept: their `expires_at` is nulled at commit.
    pub fn clear_expiry(&mut self, transaction_ids: &[Uuid]) {
        self.cleared_expiries.extend_from_slice(transaction_ids);
    }

    /// Decompose into staged writes. Called by store implementations at
    /// commit time.
    pub fn into_parts(self) -> (Customer, Vec<PointsTransaction>, Option<Bill>, Vec<Uuid>) {
        (self.customer, self.transactions, self.bill, self.cleared_expiries)
    }
}

/// The persistent store, reduced to the operations the engines actually use.
pub trait LoyaltyStore: Send + Sync {
    /// Point-in-time read of a customer.
    fn customer(&self, tenant_id: Uuid, customer_id: Uuid) -> LoyaltyResult<Option<Customer>>;

    /// Point-in-time read of a bill.
    fn bill(&self, tenant_id: Uuid, bill_id: Uuid) -> LoyaltyResult<Option<Bill>>;

    /// Run `work` against the customer's current state and commit all staged
    /// writes atomically iff it returns `Ok`. Units for the same customer are
    /// serialized; units for different customers do not block each other.
    fn with_customer(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        work: &mut dyn FnMut(&mut CustomerUnit) -> LoyaltyResult<()>,
    ) -> LoyaltyResult<()>;

    /// A customer's transactions matching the filter, in creation order.
    fn transactions(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        filter: &TransactionFilter,
    ) -> LoyaltyResult<Vec<PointsTransaction>>;

    /// Tenant-wide: unswept positive Earn and Bonus rows with `expires_at`
    /// before the cutoff.
    fn expiring_transactions(
        &self,
        tenant_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> LoyaltyResult<Vec<PointsTransaction>>;

    /// A customer's most recent order, if any.
    fn last_order(&self, tenant_id: Uuid, customer_id: Uuid) -> LoyaltyResult<Option<Order>>;

    /// Tenant-wide snapshot of active customers with their most recent order
    /// date. Read-only; minor staleness is acceptable to the callers.
    fn active_customers(&self, tenant_id: Uuid) -> LoyaltyResult<Vec<CustomerActivity>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionType;

    #[test]
    fn test_filter_matches_type_and_window() {
        let customer = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let row = PointsTransaction::new(customer, tenant, TransactionType::Bonus, 50, 50);

        let mut filter = TransactionFilter::default();
        assert!(filter.matches(&row));

        filter.transaction_type = Some(TransactionType::Bonus);
        assert!(filter.matches(&row));

        filter.transaction_type = Some(TransactionType::Earn);
        assert!(!filter.matches(&row));

        let mut window = TransactionFilter::default();
        window.created_after = Some(row.created_at + chrono::Duration::seconds(1));
        assert!(!window.matches(&row));
    }

    #[test]
    fn test_filter_matches_milestone_by_equality() {
        let customer = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let mut row = PointsTransaction::new(customer, tenant, TransactionType::Bonus, 100, 100);
        row.bonus_type = Some(BonusType::Milestone);
        row.milestone_visit = Some(10);

        let mut filter = TransactionFilter::default();
        filter.milestone_visit = Some(10);
        assert!(filter.matches(&row));

        // Visit 1 must not match visit 10 — equality, not substring.
        filter.milestone_visit = Some(1);
        assert!(!filter.matches(&row));
    }

    #[test]
    fn test_unit_staging() {
        let tenant = Uuid::new_v4();
        let customer = Customer::new(tenant);
        let id = customer.id;

        let mut unit = CustomerUnit::new(customer);
        unit.customer_mut().points_balance = 42;
        unit.push_transaction(PointsTransaction::new(
            id,
            tenant,
            TransactionType::Adjust,
            42,
            42,
        ));

        let (customer, rows, bill, cleared) = unit.into_parts();
        assert_eq!(customer.points_balance, 42);
        assert_eq!(rows.len(), 1);
        assert!(bill.is_none());
        assert!(cleared.is_empty());
    }
}
