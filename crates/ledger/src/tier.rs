//! Tier transitions. Pure functions over the threshold table; the earn path
//! is the only caller, so tiers never move down from here.

use loyalty_core::config::TierThresholds;
use loyalty_core::types::Tier;

/// Tier the customer has earned with the given lifetime total.
pub fn determine_tier(lifetime_earned: i64, thresholds: &TierThresholds) -> Tier {
    Tier::for_lifetime(lifetime_earned, thresholds)
}

/// `Some(new)` when the recomputed tier is strictly above the current one.
/// A lower recomputed tier is ignored — downgrades are not an earn-path
/// concern.
pub fn detect_upgrade(current: Tier, recomputed: Tier) -> Option<Tier> {
    (recomputed > current).then_some(recomputed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determine_tier_boundaries() {
        let t = TierThresholds::default();
        assert_eq!(determine_tier(499, &t), Tier::Bronze);
        assert_eq!(determine_tier(500, &t), Tier::Silver);
        assert_eq!(determine_tier(1_999, &t), Tier::Silver);
        assert_eq!(determine_tier(2_000, &t), Tier::Gold);
        assert_eq!(determine_tier(10_000, &t), Tier::Platinum);
    }

    #[test]
    fn test_detect_upgrade_only_fires_upward() {
        assert_eq!(detect_upgrade(Tier::Bronze, Tier::Silver), Some(Tier::Silver));
        assert_eq!(detect_upgrade(Tier::Gold, Tier::Gold), None);
        assert_eq!(detect_upgrade(Tier::Gold, Tier::Silver), None);
    }

    #[test]
    fn test_tier_monotone_over_increasing_lifetime() {
        let thresholds = TierThresholds::default();
        let mut tier = Tier::Bronze;
        for lifetime in (0..12_000).step_by(37) {
            let recomputed = determine_tier(lifetime, &thresholds);
            if let Some(next) = detect_upgrade(tier, recomputed) {
                tier = next;
            }
            assert!(tier >= recomputed.min(tier));
            assert_eq!(tier, recomputed.max(tier));
        }
        assert_eq!(tier, Tier::Platinum);
    }
}
