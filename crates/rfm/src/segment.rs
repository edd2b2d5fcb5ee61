//! Scoring bands and the segment decision table.
//!
//! The table is evaluated strictly top to bottom and the first match wins.
//! The rules overlap on purpose (a high-frequency big spender satisfies both
//! Champions and Loyal Customers), so the ordering is part of the contract.

use serde::{Deserialize, Serialize};

/// Marketing segment labels, in decision-table precedence order.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum RfmSegment {
    Champions,
    LoyalCustomers,
    CantLoseThem,
    AtRisk,
    PotentialLoyalist,
    NewCustomers,
    Promising,
    Hibernating,
    NeedAttention,
}

impl std::fmt::Display for RfmSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RfmSegment::Champions => "Champions",
            RfmSegment::LoyalCustomers => "Loyal Customers",
            RfmSegment::CantLoseThem => "Can't Lose Them",
            RfmSegment::AtRisk => "At Risk",
            RfmSegment::PotentialLoyalist => "Potential Loyalist",
            RfmSegment::NewCustomers => "New Customers",
            RfmSegment::Promising => "Promising",
            RfmSegment::Hibernating => "Hibernating",
            RfmSegment::NeedAttention => "Need Attention",
        };
        write!(f, "{label}")
    }
}

/// Recency score from days since the last order: fixed day bands.
pub fn recency_score(days: f64) -> u8 {
    if days <= 7.0 {
        5
    } else if days <= 14.0 {
        4
    } else if days <= 30.0 {
        3
    } else if days <= 60.0 {
        2
    } else {
        1
    }
}

/// Frequency/Monetary score from a value relative to the population average:
/// fixed multiplier bands.
pub fn relative_score(value: f64, average: f64) -> u8 {
    if average <= 0.0 {
        // Degenerate population: anything above zero is exceptional.
        return if value > 0.0 { 5 } else { 1 };
    }
    let ratio = value / average;
    if ratio >= 2.0 {
        5
    } else if ratio >= 1.5 {
        4
    } else if ratio >= 1.0 {
        3
    } else if ratio >= 0.5 {
        2
    } else {
        1
    }
}

/// First matching rule, top to bottom.
pub fn classify(r: u8, f: u8, m: u8) -> RfmSegment {
    if r >= 4 && f >= 4 && m >= 4 {
        RfmSegment::Champions
    } else if r >= 3 && f >= 4 {
        RfmSegment::LoyalCustomers
    } else if r <= 2 && f >= 4 && m >= 4 {
        RfmSegment::CantLoseThem
    } else if r <= 2 && f >= 3 {
        RfmSegment::AtRisk
    } else if r >= 4 && f >= 2 && m >= 2 {
        RfmSegment::PotentialLoyalist
    } else if r >= 4 && f <= 1 {
        RfmSegment::NewCustomers
    } else if r >= 3 && m <= 2 {
        RfmSegment::Promising
    } else if r <= 2 && f <= 2 {
        RfmSegment::Hibernating
    } else {
        RfmSegment::NeedAttention
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recency_bands() {
        assert_eq!(recency_score(0.0), 5);
        assert_eq!(recency_score(7.0), 5);
        assert_eq!(recency_score(8.0), 4);
        assert_eq!(recency_score(14.0), 4);
        assert_eq!(recency_score(30.0), 3);
        assert_eq!(recency_score(60.0), 2);
        assert_eq!(recency_score(61.0), 1);
        assert_eq!(recency_score(365.0), 1);
    }

    #[test]
    fn test_relative_bands() {
        assert_eq!(relative_score(20.0, 10.0), 5);
        assert_eq!(relative_score(15.0, 10.0), 4);
        assert_eq!(relative_score(10.0, 10.0), 3);
        assert_eq!(relative_score(5.0, 10.0), 2);
        assert_eq!(relative_score(4.9, 10.0), 1);
    }

    #[test]
    fn test_relative_bands_degenerate_average() {
        assert_eq!(relative_score(0.0, 0.0), 1);
        assert_eq!(relative_score(3.0, 0.0), 5);
    }

    #[test]
    fn test_champions_checked_before_loyal() {
        // Satisfies both rules 1 and 2; precedence picks Champions.
        assert_eq!(classify(5, 5, 5), RfmSegment::Champions);
        assert_eq!(classify(4, 4, 4), RfmSegment::Champions);
        // High F without high M drops to Loyal.
        assert_eq!(classify(4, 5, 2), RfmSegment::LoyalCustomers);
    }

    #[test]
    fn test_lapsed_heavy_spenders() {
        assert_eq!(classify(2, 5, 5), RfmSegment::CantLoseThem);
        // Same recency but modest spend falls through to At Risk.
        assert_eq!(classify(2, 4, 2), RfmSegment::AtRisk);
        assert_eq!(classify(1, 3, 3), RfmSegment::AtRisk);
    }

    #[test]
    fn test_recent_tail_segments() {
        assert_eq!(classify(5, 2, 2), RfmSegment::PotentialLoyalist);
        assert_eq!(classify(5, 1, 1), RfmSegment::NewCustomers);
        assert_eq!(classify(3, 2, 1), RfmSegment::Promising);
    }

    #[test]
    fn test_cold_and_fallback_segments() {
        assert_eq!(classify(1, 1, 1), RfmSegment::Hibernating);
        assert_eq!(classify(2, 2, 5), RfmSegment::Hibernating);
        // Mid-everything lands in the fallback bucket.
        assert_eq!(classify(3, 3, 3), RfmSegment::NeedAttention);
    }
}
