use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::admission::domain::{ParticipantId, PriorityTier};
use crate::admission::quota::TierQuotas;

/// Applicants entering the draw, grouped by their own tier.
#[derive(Debug, Clone, Default)]
pub struct TierPools {
    pools: [Vec<ParticipantId>; 3],
}

impl TierPools {
    pub fn push(&mut self, tier: PriorityTier, id: ParticipantId) {
        self.pools[tier.index()].push(id);
    }

    pub fn len(&self, tier: PriorityTier) -> usize {
        self.pools[tier.index()].len()
    }

    pub fn total(&self) -> usize {
        self.pools.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// One applicant's passage through the draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawEntry {
    pub participant_id: ParticipantId,
    pub tier: PriorityTier,
    /// Tier whose draw selected the applicant; `None` when never selected.
    pub drawn_in: Option<PriorityTier>,
    pub sequence: u32,
}

/// Per-tier bookkeeping of a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDraw {
    pub tier: PriorityTier,
    pub own_applicants: u32,
    pub carried_in: u32,
    pub available: u32,
    pub selected: u32,
    pub carried_out: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawOutcome {
    /// Selected applicants, first tier first, in draw order.
    pub selected: Vec<DrawEntry>,
    /// Applicants left over after the last tier, in draw order.
    pub not_drawn: Vec<DrawEntry>,
    pub tiers: [TierDraw; 3],
}

/// Cascading three-tier draw.
///
/// Each tier draws uniformly at random from its own applicants plus everyone
/// the tier above did not select. Seats a tier leaves unused roll down, so the
/// seats offered to tier `t` are the effective quotas of tiers `1..=t` minus
/// everything already selected.
pub struct LotteryEngine;

impl LotteryEngine {
    pub fn draw<R>(quotas: &TierQuotas, pools: TierPools, rng: &mut R) -> DrawOutcome
    where
        R: Rng + ?Sized,
    {
        let mut carried: Vec<(ParticipantId, PriorityTier)> = Vec::new();
        let mut selected: Vec<(ParticipantId, PriorityTier, PriorityTier)> = Vec::new();
        let mut seat_budget: u64 = 0;
        let mut own_pools = pools.pools.into_iter();
        let mut tiers = PriorityTier::ALL.map(|tier| TierDraw {
            tier,
            own_applicants: 0,
            carried_in: 0,
            available: 0,
            selected: 0,
            carried_out: 0,
        });

        for tier in PriorityTier::ALL {
            let own = own_pools.next().unwrap_or_default();
            let stats = &mut tiers[tier.index()];
            stats.own_applicants = own.len() as u32;
            stats.carried_in = carried.len() as u32;

            let mut pool: Vec<(ParticipantId, PriorityTier)> =
                own.into_iter().map(|id| (id, tier)).collect();
            pool.append(&mut carried);
            pool.shuffle(rng);

            seat_budget += u64::from(quotas.effective(tier));
            let take = seat_budget.min(pool.len() as u64) as usize;
            seat_budget -= take as u64;

            stats.available = (seat_budget + take as u64).min(u64::from(u32::MAX)) as u32;
            stats.selected = take as u32;
            stats.carried_out = (pool.len() - take) as u32;

            debug!(
                tier = tier.label(),
                pool = pool.len(),
                available = stats.available,
                selected = take,
                "tier draw complete"
            );

            carried = pool.split_off(take);
            selected.extend(pool.into_iter().map(|(id, own_tier)| (id, own_tier, tier)));
        }

        let mut sequence = 0u32;
        let mut next_sequence = || {
            sequence += 1;
            sequence
        };

        let selected: Vec<DrawEntry> = selected
            .into_iter()
            .map(|(participant_id, tier, drawn_in)| DrawEntry {
                participant_id,
                tier,
                drawn_in: Some(drawn_in),
                sequence: next_sequence(),
            })
            .collect();
        let not_drawn: Vec<DrawEntry> = carried
            .into_iter()
            .map(|(participant_id, tier)| DrawEntry {
                participant_id,
                tier,
                drawn_in: None,
                sequence: next_sequence(),
            })
            .collect();

        DrawOutcome {
            selected,
            not_drawn,
            tiers,
        }
    }
}
