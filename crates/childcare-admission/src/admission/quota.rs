use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use super::domain::PriorityTier;

/// Statutory share of capacity reserved for the first tier, in percent.
pub const FIRST_TIER_PERCENT: u64 = 20;
/// Statutory share of capacity reserved for the second tier, in percent.
pub const SECOND_TIER_PERCENT: u64 = 10;

/// Per-tier counters indexed by [`PriorityTier`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts(pub [u32; 3]);

impl TierCounts {
    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }
}

impl Index<PriorityTier> for TierCounts {
    type Output = u32;

    fn index(&self, tier: PriorityTier) -> &u32 {
        &self.0[tier.index()]
    }
}

impl IndexMut<PriorityTier> for TierCounts {
    fn index_mut(&mut self, tier: PriorityTier) -> &mut u32 {
        &mut self.0[tier.index()]
    }
}

/// Legal and effective seat reservation for one tier in the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierQuota {
    pub tier: PriorityTier,
    pub legal: u32,
    pub admitted: u32,
    pub effective: u32,
}

/// Quotas for all three tiers of an institution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierQuotas {
    pub capacity: u32,
    pub tiers: [TierQuota; 3],
}

impl TierQuotas {
    pub fn get(&self, tier: PriorityTier) -> &TierQuota {
        &self.tiers[tier.index()]
    }

    pub fn effective(&self, tier: PriorityTier) -> u32 {
        self.get(tier).effective
    }

    pub fn legal(&self, tier: PriorityTier) -> u32 {
        self.get(tier).legal
    }
}

/// Splits `capacity` into the statutory shares; the third tier absorbs the remainder.
pub fn legal_quotas(capacity: u32) -> TierCounts {
    let first = (u64::from(capacity) * FIRST_TIER_PERCENT / 100) as u32;
    let second = (u64::from(capacity) * SECOND_TIER_PERCENT / 100) as u32;
    TierCounts([first, second, capacity - first - second])
}

/// Derives effective quotas from capacity and the seats each tier already holds.
pub fn compute_quotas(capacity: u32, admitted: TierCounts) -> TierQuotas {
    let legal = legal_quotas(capacity);
    let tiers = PriorityTier::ALL.map(|tier| TierQuota {
        tier,
        legal: legal[tier],
        admitted: admitted[tier],
        effective: legal[tier].saturating_sub(admitted[tier]),
    });

    TierQuotas { capacity, tiers }
}
