//! DashMap-backed store keyed by tenant. Commits a [`CustomerUnit`] under a
//! per-customer mutex, so two concurrent units for the same customer can
//! never both validate against a stale balance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use loyalty_core::error::{LoyaltyError, LoyaltyResult};
use loyalty_core::store::{CustomerUnit, LoyaltyStore, TransactionFilter};
use loyalty_core::types::{
    Bill, Customer, CustomerActivity, CustomerStatus, Order, PointsTransaction, TransactionType,
};

#[derive(Default)]
struct TenantState {
    customers: DashMap<Uuid, Customer>,
    /// Serializes units of work per customer.
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    /// customer_id → ledger rows in creation order.
    transactions: DashMap<Uuid, Vec<PointsTransaction>>,
    /// customer_id → orders.
    orders: DashMap<Uuid, Vec<Order>>,
    bills: DashMap<Uuid, Bill>,
}

/// In-memory store, the reference implementation of [`LoyaltyStore`] and the
/// test double used across the workspace.
pub struct MemoryStore {
    tenants: DashMap<Uuid, Arc<TenantState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("Memory store initialized");
        Self {
            tenants: DashMap::new(),
        }
    }

    fn tenant(&self, tenant_id: Uuid) -> Arc<TenantState> {
        self.tenants
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(TenantState::default()))
            .clone()
    }

    pub fn insert_customer(&self, customer: Customer) {
        let tenant = self.tenant(customer.tenant_id);
        tenant.customers.insert(customer.id, customer);
    }

    pub fn insert_bill(&self, tenant_id: Uuid, bill: Bill) {
        self.tenant(tenant_id).bills.insert(bill.id, bill);
    }

    pub fn record_order(&self, tenant_id: Uuid, order: Order) {
        self.tenant(tenant_id)
            .orders
            .entry(order.customer_id)
            .or_default()
            .push(order);
    }

    /// All ledger rows for a customer, unfiltered. Test and audit helper.
    pub fn ledger(&self, tenant_id: Uuid, customer_id: Uuid) -> Vec<PointsTransaction> {
        self.tenant(tenant_id)
            .transactions
            .get(&customer_id)
            .map(|rows| rows.clone())
            .unwrap_or_default()
    }

    /// Seed a small synthetic customer base: one regular, one lapsed, one
    /// brand new. Returns their ids in that order.
    pub fn seed_demo(&self, tenant_id: Uuid) -> Vec<Uuid> {
        let now = Utc::now();
        let mut ids = Vec::new();

        let profiles: [(f64, u64, i64); 3] = [
            (4_800.0, 24, 2),   // regular: ordered 2 days ago
            (1_500.0, 6, 200),  // lapsed: last order 200 days ago
            (120.0, 1, 1),      // new: first order yesterday
        ];

        for (total_spent, visits, days_ago) in profiles {
            let mut customer = Customer::new(tenant_id);
            customer.total_spent = total_spent;
            customer.total_visits = visits;
            customer.average_order_value = total_spent / visits as f64;
            ids.push(customer.id);

            self.record_order(
                tenant_id,
                Order {
                    id: Uuid::new_v4(),
                    customer_id: customer.id,
                    total_amount: total_spent / visits as f64,
                    placed_at: now - chrono::Duration::days(days_ago),
                },
            );
            self.insert_customer(customer);
        }

        info!(tenant_id = %tenant_id, "Seeded demo customers");
        ids
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LoyaltyStore for MemoryStore {
    fn customer(&self, tenant_id: Uuid, customer_id: Uuid) -> LoyaltyResult<Option<Customer>> {
        Ok(self
            .tenant(tenant_id)
            .customers
            .get(&customer_id)
            .map(|c| c.clone()))
    }

    fn bill(&self, tenant_id: Uuid, bill_id: Uuid) -> LoyaltyResult<Option<Bill>> {
        Ok(self.tenant(tenant_id).bills.get(&bill_id).map(|b| b.clone()))
    }

    fn with_customer(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        work: &mut dyn FnMut(&mut CustomerUnit) -> LoyaltyResult<()>,
    ) -> LoyaltyResult<()> {
        let tenant = self.tenant(tenant_id);
        let lock = tenant
            .locks
            .entry(customer_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        let customer = tenant
            .customers
            .get(&customer_id)
            .map(|c| c.clone())
            .ok_or(LoyaltyError::CustomerNotFound(customer_id))?;

        let mut unit = CustomerUnit::new(customer);
        work(&mut unit)?;

        // Commit: everything staged becomes visible at once.
        let (customer, rows, bill, cleared) = unit.into_parts();
        debug!(
            customer_id = %customer_id,
            staged_rows = rows.len(),
            "Committing customer unit"
        );

        tenant.customers.insert(customer_id, customer);
        if !rows.is_empty() {
            tenant
                .transactions
                .entry(customer_id)
                .or_default()
                .extend(rows);
        }
        if let Some(bill) = bill {
            tenant.bills.insert(bill.id, bill);
        }
        if !cleared.is_empty() {
            if let Some(mut rows) = tenant.transactions.get_mut(&customer_id) {
                for row in rows.iter_mut() {
                    if cleared.contains(&row.id) {
                        row.expires_at = None;
                    }
                }
            }
        }
        Ok(())
    }

    fn transactions(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        filter: &TransactionFilter,
    ) -> LoyaltyResult<Vec<PointsTransaction>> {
        Ok(self
            .tenant(tenant_id)
            .transactions
            .get(&customer_id)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    fn expiring_transactions(
        &self,
        tenant_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> LoyaltyResult<Vec<PointsTransaction>> {
        let tenant = self.tenant(tenant_id);
        let mut out = Vec::new();
        for entry in tenant.transactions.iter() {
            for row in entry.value() {
                if matches!(
                    row.transaction_type,
                    TransactionType::Earn | TransactionType::Bonus
                ) && row.points > 0
                    && row.expires_at.map(|e| e < cutoff).unwrap_or(false)
                {
                    out.push(row.clone());
                }
            }
        }
        Ok(out)
    }

    fn last_order(&self, tenant_id: Uuid, customer_id: Uuid) -> LoyaltyResult<Option<Order>> {
        Ok(self
            .tenant(tenant_id)
            .orders
            .get(&customer_id)
            .and_then(|orders| orders.iter().max_by_key(|o| o.placed_at).cloned()))
    }

    fn active_customers(&self, tenant_id: Uuid) -> LoyaltyResult<Vec<CustomerActivity>> {
        let tenant = self.tenant(tenant_id);
        let mut out = Vec::new();
        for entry in tenant.customers.iter() {
            let customer = entry.value();
            if customer.status != CustomerStatus::Active {
                continue;
            }
            let last_order_at = tenant
                .orders
                .get(&customer.id)
                .and_then(|orders| orders.iter().map(|o| o.placed_at).max());
            out.push(CustomerActivity {
                customer: customer.clone(),
                last_order_at,
            });
        }
        Ok(out)
    }
}
