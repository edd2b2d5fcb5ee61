//! Population-level RFM analysis. Read-only: works off the store's active
//! customer snapshot, tolerates minor staleness, touches nothing.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use loyalty_core::error::LoyaltyResult;
use loyalty_core::store::LoyaltyStore;

use crate::segment::{classify, recency_score, relative_score, RfmSegment};

/// Customers with no orders are scored as if their last order were this many
/// days ago — a fixed ceiling, not infinity, so they still get a bounded
/// recency score.
const NO_ORDER_RECENCY_DAYS: f64 = 365.0;

/// One customer's scores for this run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RfmScore {
    pub customer_id: Uuid,
    pub recency: u8,
    pub frequency: u8,
    pub monetary: u8,
    /// Combined `R·100 + F·10 + M`, e.g. 545.
    pub score: u16,
    pub segment: RfmSegment,
}

/// Population averages the bands are measured against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RfmAverages {
    pub recency_days: f64,
    pub visits: f64,
    pub spent: f64,
}

/// Full analysis output. Ephemeral: recomputed from current customer and
/// order data on every invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RfmReport {
    pub tenant_id: Uuid,
    pub analyzed_at: DateTime<Utc>,
    pub population: u64,
    pub averages: RfmAverages,
    pub scores: Vec<RfmScore>,
    pub segment_counts: BTreeMap<RfmSegment, u64>,
}

pub struct RfmEngine {
    store: Arc<dyn LoyaltyStore>,
}

impl RfmEngine {
    pub fn new(store: Arc<dyn LoyaltyStore>) -> Self {
        info!("RFM engine initialized");
        Self { store }
    }

    /// Score the whole active population of a tenant and bucket it into
    /// segments.
    pub fn run_analysis(&self, tenant_id: Uuid, now: DateTime<Utc>) -> LoyaltyResult<RfmReport> {
        let snapshot = self.store.active_customers(tenant_id)?;
        let population = snapshot.len() as u64;

        if snapshot.is_empty() {
            return Ok(RfmReport {
                tenant_id,
                analyzed_at: now,
                population: 0,
                averages: RfmAverages::default(),
                scores: Vec::new(),
                segment_counts: BTreeMap::new(),
            });
        }

        let recency_days: Vec<f64> = snapshot
            .iter()
            .map(|a| {
                a.last_order_at
                    .map(|last| (now - last).num_days().max(0) as f64)
                    .unwrap_or(NO_ORDER_RECENCY_DAYS)
            })
            .collect();

        let n = snapshot.len() as f64;
        let averages = RfmAverages {
            recency_days: recency_days.iter().sum::<f64>() / n,
            visits: snapshot.iter().map(|a| a.customer.total_visits as f64).sum::<f64>() / n,
            spent: snapshot.iter().map(|a| a.customer.total_spent).sum::<f64>() / n,
        };

        let mut scores = Vec::with_capacity(snapshot.len());
        let mut segment_counts: BTreeMap<RfmSegment, u64> = BTreeMap::new();
        for (activity, days) in snapshot.iter().zip(&recency_days) {
            let r = recency_score(*days);
            let f = relative_score(activity.customer.total_visits as f64, averages.visits);
            let m = relative_score(activity.customer.total_spent, averages.spent);
            let segment = classify(r, f, m);
            *segment_counts.entry(segment).or_default() += 1;

            scores.push(RfmScore {
                customer_id: activity.customer.id,
                recency: r,
                frequency: f,
                monetary: m,
                score: r as u16 * 100 + f as u16 * 10 + m as u16,
                segment,
            });
        }

        debug!(
            tenant_id = %tenant_id,
            population = population,
            segments = segment_counts.len(),
            "RFM analysis complete"
        );
        Ok(RfmReport {
            tenant_id,
            analyzed_at: now,
            population,
            averages,
            scores,
            segment_counts,
        })
    }
}
