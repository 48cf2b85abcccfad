use std::collections::HashSet;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::common::*;
use crate::admission::domain::{
    Applicant, ApplicantStatus, CapacitySnapshot, IdentityCategory, PriorityTier, WaitlistReason,
};
use crate::admission::ledger::verify_orders;
use crate::admission::lottery::{
    plan_lottery, LotteryEngine, LotteryError, LotteryInput, TierPools,
};
use crate::admission::quota::{compute_quotas, TierCounts};

fn input(capacity: CapacitySnapshot, applicants: Vec<Applicant>) -> LotteryInput {
    LotteryInput {
        institution_id: institution(),
        capacity,
        applicants,
        classes: vec![class("c-1", 2, 4, 30, 0), class("c-2", 2, 4, 30, 0)],
        run_date: run_date(),
    }
}

fn crowd(prefix: &str, identity: IdentityCategory, count: usize) -> Vec<Applicant> {
    (0..count)
        .map(|index| child(&format!("{prefix}{index:02}"), identity))
        .collect()
}

#[test]
fn over_admitted_tier_carries_its_whole_pool_down() {
    let quotas = compute_quotas(10, TierCounts([3, 0, 0]));
    assert_eq!(quotas.effective(PriorityTier::First), 0);

    let mut pools = TierPools::default();
    pools.push(PriorityTier::First, participant("t1-a"));
    pools.push(PriorityTier::First, participant("t1-b"));

    let outcome = LotteryEngine::draw(&quotas, pools, &mut StdRng::seed_from_u64(1));

    let first = outcome.tiers[PriorityTier::First.index()];
    let second = outcome.tiers[PriorityTier::Second.index()];
    assert_eq!(first.selected, 0);
    assert_eq!(first.carried_out, 2);
    assert_eq!(second.carried_in, 2);
    assert_eq!(second.available, 1);
    assert_eq!(second.selected, 1);
    assert_eq!(outcome.selected.len(), 2);
    assert!(outcome.not_drawn.is_empty());
    assert!(outcome
        .selected
        .iter()
        .all(|entry| entry.tier == PriorityTier::First));
}

#[test]
fn unused_seats_roll_down_and_everyone_is_accounted_for() {
    let quotas = compute_quotas(20, TierCounts::default());
    let mut pools = TierPools::default();
    pools.push(PriorityTier::First, participant("a"));
    for index in 0..6 {
        pools.push(PriorityTier::Second, participant(&format!("b{index}")));
    }
    for index in 0..25 {
        pools.push(PriorityTier::Third, participant(&format!("c{index}")));
    }

    let outcome = LotteryEngine::draw(&quotas, pools, &mut StdRng::seed_from_u64(9));

    // Tier 1 leaves three of its four seats to tier 2, which then has five.
    let second = outcome.tiers[PriorityTier::Second.index()];
    assert_eq!(second.available, 5);
    assert_eq!(second.selected, 5);
    assert_eq!(outcome.selected.len(), 20);
    assert_eq!(outcome.not_drawn.len(), 12);

    let mut seen = HashSet::new();
    for entry in outcome.selected.iter().chain(outcome.not_drawn.iter()) {
        assert!(seen.insert(entry.participant_id.clone()), "drawn twice");
    }
    assert_eq!(seen.len(), 32);

    let sequences: Vec<u32> = outcome
        .selected
        .iter()
        .chain(outcome.not_drawn.iter())
        .map(|entry| entry.sequence)
        .collect();
    assert_eq!(sequences, (1..=32).collect::<Vec<u32>>());
}

#[test]
fn full_institution_aborts_without_touching_records() {
    let applicants = crowd("g", IdentityCategory::General, 3);
    let result = plan_lottery(
        input(
            CapacitySnapshot {
                capacity: 12,
                enrolled: 12,
            },
            applicants,
        ),
        &mut StdRng::seed_from_u64(3),
    );

    assert_eq!(
        result.err(),
        Some(LotteryError::NoAvailableSlots {
            capacity: 12,
            enrolled: 12
        })
    );
}

#[test]
fn missing_birth_date_aborts_the_run() {
    let mut applicants = crowd("g", IdentityCategory::General, 3);
    applicants[1].birth_date = None;

    let result = plan_lottery(
        input(
            CapacitySnapshot {
                capacity: 30,
                enrolled: 0,
            },
            applicants,
        ),
        &mut StdRng::seed_from_u64(3),
    );

    assert_eq!(
        result.err(),
        Some(LotteryError::MissingBirthDate(participant("g01")))
    );
}

#[test]
fn parents_and_undetermined_participants_stay_out_of_the_draw() {
    let kid = child("k1", IdentityCategory::LowIncome);
    let parent = parent_of(&kid);
    let mut unknown = child("u1", IdentityCategory::General);
    unknown.identity = None;

    let plan = plan_lottery(
        input(
            CapacitySnapshot {
                capacity: 10,
                enrolled: 0,
            },
            vec![kid, parent.clone(), unknown],
        ),
        &mut StdRng::seed_from_u64(5),
    )
    .expect("lottery runs");

    assert_eq!(plan.result.accepted.len(), 1);
    assert!(plan.result.waitlisted.is_empty());
    let stored_parent = plan
        .applicants
        .iter()
        .find(|applicant| applicant.id == parent.id)
        .expect("parent kept");
    assert_eq!(stored_parent.status, ApplicantStatus::PendingReview);
    assert_eq!(stored_parent.waitlist_order, None);
}

#[test]
fn class_capacity_bounds_admissions_and_overflow_is_waitlisted() {
    let applicants = crowd("g", IdentityCategory::General, 8);
    let mut lottery = input(
        CapacitySnapshot {
            capacity: 40,
            enrolled: 1,
        },
        applicants,
    );
    lottery.classes = vec![class("c-1", 2, 4, 3, 1)];

    let plan = plan_lottery(lottery, &mut StdRng::seed_from_u64(11)).expect("lottery runs");

    assert_eq!(plan.result.accepted.len(), 2);
    assert_eq!(plan.result.waitlisted.len(), 6);
    assert!(plan
        .result
        .waitlisted
        .iter()
        .all(|entry| entry.reason == WaitlistReason::ClassFull));
    for class in &plan.classes {
        assert!(class.enrolled <= class.capacity);
    }
    assert_eq!(plan.classes[0].enrolled, 3);
}

#[test]
fn children_outside_every_age_band_are_waitlisted_with_their_own_reason() {
    let mut infant = child("i1", IdentityCategory::General);
    infant.birth_date = NaiveDate::from_ymd_opt(2025, 1, 10);
    let toddler = child("t1", IdentityCategory::General);

    let plan = plan_lottery(
        input(
            CapacitySnapshot {
                capacity: 10,
                enrolled: 0,
            },
            vec![infant, toddler],
        ),
        &mut StdRng::seed_from_u64(2),
    )
    .expect("lottery runs");

    assert_eq!(plan.result.accepted.len(), 1);
    assert_eq!(plan.result.accepted[0].participant_id, participant("t1"));
    assert_eq!(plan.result.waitlisted.len(), 1);
    assert_eq!(
        plan.result.waitlisted[0].reason,
        WaitlistReason::NoEligibleAgeBand
    );
    assert_eq!(plan.result.waitlisted[0].waitlist_order, 1);
}

#[test]
fn waitlist_follows_draw_sequence_and_is_contiguous() {
    let mut applicants = crowd("a", IdentityCategory::LowIncome, 4);
    applicants.extend(crowd("g", IdentityCategory::General, 12));
    applicants.push(waitlisted("old", 1));

    let plan = plan_lottery(
        input(
            CapacitySnapshot {
                capacity: 10,
                enrolled: 0,
            },
            applicants,
        ),
        &mut StdRng::seed_from_u64(21),
    )
    .expect("lottery runs");

    assert_eq!(plan.result.accepted.len(), 10);
    assert_eq!(plan.result.waitlisted.len(), 7);

    let mut previous = 0;
    for (position, entry) in plan.result.waitlisted.iter().enumerate() {
        assert_eq!(entry.waitlist_order, position as u32 + 1);
        assert!(entry.draw_sequence > previous);
        previous = entry.draw_sequence;
    }
    assert_eq!(verify_orders(&plan.applicants), Ok(()));

    for accepted in &plan.result.accepted {
        let stored = plan
            .applicants
            .iter()
            .find(|applicant| applicant.id == accepted.participant_id)
            .expect("accepted applicant stored");
        assert_eq!(stored.status, ApplicantStatus::Admitted);
        assert_eq!(stored.waitlist_order, None);
        assert_eq!(stored.class_id.as_ref(), Some(&accepted.class_id));
    }

    let tier_one = &plan.result.counts_by_tier[PriorityTier::First.index()];
    assert_eq!(tier_one.legal_quota, 2);
    assert_eq!(tier_one.drawn, 2);
}

#[test]
fn seeded_runs_are_reproducible() {
    let applicants = crowd("g", IdentityCategory::General, 15);
    let capacity = CapacitySnapshot {
        capacity: 6,
        enrolled: 0,
    };

    let first = plan_lottery(
        input(capacity, applicants.clone()),
        &mut StdRng::seed_from_u64(42),
    )
    .expect("first run");
    let second = plan_lottery(input(capacity, applicants), &mut StdRng::seed_from_u64(42))
        .expect("second run");

    assert_eq!(first.result, second.result);
    assert_eq!(first.applicants, second.applicants);
}
