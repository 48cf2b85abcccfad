//! Annual admission lottery.
//!
//! A run is computed entirely in memory from one consistent read of an
//! institution's applicants, classes, and capacity. [`plan_lottery`] returns
//! the mutated records alongside the public [`LotteryResult`]; persisting them
//! as a single batch is the caller's job.

mod draw;

pub use draw::{DrawEntry, DrawOutcome, LotteryEngine, TierDraw, TierPools};

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::domain::{
    Applicant, ApplicantStatus, ApplicationId, CapacitySnapshot, ClassId, ClassRoom,
    InstitutionId, ParticipantId, PriorityTier, WaitlistReason,
};
use super::ledger::{LedgerError, WaitlistLedger};
use super::placement::ClassRoster;
use super::quota::{compute_quotas, TierCounts, TierQuotas};

/// Where the draw takes its randomness from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RandomSource {
    #[default]
    Entropy,
    /// Reproducible draws; run `n` of a service uses `seed + n`.
    Seeded(u64),
}

impl RandomSource {
    pub fn rng_for_run(&self, run: u64) -> StdRng {
        match self {
            RandomSource::Entropy => StdRng::from_entropy(),
            RandomSource::Seeded(seed) => StdRng::seed_from_u64(seed.wrapping_add(run)),
        }
    }
}

/// Preconditions that abort a run before any record changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LotteryError {
    #[error("no available slots (capacity {capacity}, enrolled {enrolled})")]
    NoAvailableSlots { capacity: u32, enrolled: u32 },
    #[error("participant {0} has no birth date on file")]
    MissingBirthDate(ParticipantId),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedApplicant {
    pub participant_id: ParticipantId,
    pub application_id: ApplicationId,
    pub tier: PriorityTier,
    pub drawn_in: PriorityTier,
    pub class_id: ClassId,
    pub draw_sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistedApplicant {
    pub participant_id: ParticipantId,
    pub application_id: ApplicationId,
    pub tier: PriorityTier,
    pub waitlist_order: u32,
    pub draw_sequence: u32,
    pub reason: WaitlistReason,
}

/// Per-tier counts reported back to staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSummary {
    pub tier: PriorityTier,
    pub legal_quota: u32,
    pub effective_quota: u32,
    pub applicants: u32,
    pub pool: u32,
    pub available: u32,
    pub drawn: u32,
    pub admitted: u32,
    pub waitlisted: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryResult {
    pub institution_id: InstitutionId,
    pub run_date: NaiveDate,
    pub quotas: TierQuotas,
    pub accepted: Vec<AcceptedApplicant>,
    pub waitlisted: Vec<WaitlistedApplicant>,
    pub counts_by_tier: Vec<TierSummary>,
    pub message: String,
}

/// Records to persist for a run, plus the result handed back to the caller.
#[derive(Debug, Clone)]
pub struct LotteryPlan {
    pub result: LotteryResult,
    pub applicants: Vec<Applicant>,
    pub classes: Vec<ClassRoom>,
}

/// Snapshot read for one institution at the start of a run.
#[derive(Debug, Clone)]
pub struct LotteryInput {
    pub institution_id: InstitutionId,
    pub capacity: CapacitySnapshot,
    pub applicants: Vec<Applicant>,
    pub classes: Vec<ClassRoom>,
    pub run_date: NaiveDate,
}

/// Seats already held by each tier this cycle.
pub fn admitted_by_tier(applicants: &[Applicant]) -> TierCounts {
    let mut counts = TierCounts::default();
    for applicant in applicants {
        if applicant.status != ApplicantStatus::Admitted || !applicant.is_orderable() {
            continue;
        }
        if let Some(tier) = applicant.tier() {
            counts[tier] += 1;
        }
    }
    counts
}

/// Compute a complete lottery run without touching storage.
pub fn plan_lottery<R>(input: LotteryInput, rng: &mut R) -> Result<LotteryPlan, LotteryError>
where
    R: Rng + ?Sized,
{
    let LotteryInput {
        institution_id,
        capacity,
        mut applicants,
        classes,
        run_date,
    } = input;

    if capacity.available() == 0 {
        return Err(LotteryError::NoAvailableSlots {
            capacity: capacity.capacity,
            enrolled: capacity.enrolled,
        });
    }

    let quotas = compute_quotas(capacity.capacity, admitted_by_tier(&applicants));

    let mut entrants: Vec<&Applicant> = applicants
        .iter()
        .filter(|applicant| applicant.is_orderable() && applicant.status.enters_lottery())
        .collect();
    entrants.sort_by(|left, right| left.id.cmp(&right.id));

    let mut pools = TierPools::default();
    for applicant in entrants {
        if applicant.birth_date.is_none() {
            return Err(LotteryError::MissingBirthDate(applicant.id.clone()));
        }
        if let Some(tier) = applicant.tier() {
            pools.push(tier, applicant.id.clone());
        }
    }

    let mut summaries = PriorityTier::ALL.map(|tier| TierSummary {
        tier,
        legal_quota: quotas.legal(tier),
        effective_quota: quotas.effective(tier),
        applicants: pools.len(tier) as u32,
        pool: 0,
        available: 0,
        drawn: 0,
        admitted: 0,
        waitlisted: 0,
    });

    let outcome = LotteryEngine::draw(&quotas, pools, rng);
    for draw in outcome.tiers {
        let summary = &mut summaries[draw.tier.index()];
        summary.pool = draw.own_applicants + draw.carried_in;
        summary.available = draw.available;
        summary.drawn = draw.selected;
    }

    let mut roster = ClassRoster::new(classes);
    let mut accepted = Vec::new();
    let mut waitlist: Vec<(DrawEntry, WaitlistReason)> = Vec::new();

    for entry in outcome.selected {
        let index = locate(&applicants, &entry.participant_id)?;
        let applicant = &mut applicants[index];
        let birth_date = applicant
            .birth_date
            .ok_or_else(|| LotteryError::MissingBirthDate(applicant.id.clone()))?;

        match roster.assign(birth_date, run_date) {
            Ok(class_id) => {
                applicant.status = ApplicantStatus::Admitted;
                applicant.class_id = Some(class_id.clone());
                applicant.waitlist_order = None;
                summaries[entry.tier.index()].admitted += 1;
                accepted.push(AcceptedApplicant {
                    participant_id: entry.participant_id.clone(),
                    application_id: applicant.application_id.clone(),
                    tier: entry.tier,
                    drawn_in: entry.drawn_in.unwrap_or(entry.tier),
                    class_id,
                    draw_sequence: entry.sequence,
                });
            }
            Err(failure) => waitlist.push((entry, failure.waitlist_reason())),
        }
    }

    waitlist.extend(
        outcome
            .not_drawn
            .into_iter()
            .map(|entry| (entry, WaitlistReason::NotDrawn)),
    );
    waitlist.sort_by_key(|(entry, _)| entry.sequence);

    for (entry, _) in &waitlist {
        let index = locate(&applicants, &entry.participant_id)?;
        let applicant = &mut applicants[index];
        applicant.status = ApplicantStatus::Waitlisted;
        applicant.class_id = None;
    }

    let ordered: Vec<ParticipantId> = waitlist
        .iter()
        .map(|(entry, _)| entry.participant_id.clone())
        .collect();
    let mut ledger = WaitlistLedger::new(&mut applicants);
    ledger.seed(&ordered)?;

    let mut waitlisted = Vec::with_capacity(waitlist.len());
    for (position, (entry, reason)) in waitlist.into_iter().enumerate() {
        let index = locate(&applicants, &entry.participant_id)?;
        summaries[entry.tier.index()].waitlisted += 1;
        waitlisted.push(WaitlistedApplicant {
            participant_id: entry.participant_id,
            application_id: applicants[index].application_id.clone(),
            tier: entry.tier,
            waitlist_order: position as u32 + 1,
            draw_sequence: entry.sequence,
            reason,
        });
    }

    let message = format!(
        "lottery complete: {} admitted, {} waitlisted",
        accepted.len(),
        waitlisted.len()
    );

    Ok(LotteryPlan {
        result: LotteryResult {
            institution_id,
            run_date,
            quotas,
            accepted,
            waitlisted,
            counts_by_tier: summaries.to_vec(),
            message,
        },
        applicants,
        classes: roster.into_classes(),
    })
}

fn locate(applicants: &[Applicant], id: &ParticipantId) -> Result<usize, LotteryError> {
    applicants
        .iter()
        .position(|applicant| &applicant.id == id)
        .ok_or_else(|| LotteryError::Ledger(LedgerError::UnknownParticipant(id.clone())))
}
