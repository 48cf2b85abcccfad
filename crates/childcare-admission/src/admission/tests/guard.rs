use chrono::NaiveDate;

use super::common::*;
use crate::admission::domain::{ApplicantStatus, IdentityCategory};
use crate::admission::guard::{LotterySeason, ManualAdmissionGuard};

fn season() -> LotterySeason {
    LotterySeason {
        starts_on: NaiveDate::from_ymd_opt(2025, 4, 1).expect("valid date"),
        ends_on: NaiveDate::from_ymd_opt(2025, 5, 31).expect("valid date"),
    }
}

#[test]
fn flags_every_better_ranked_waitlisted_child() {
    let applicants: Vec<_> = (1..=5)
        .map(|order| waitlisted(&format!("w{order}"), order))
        .collect();
    let guard = ManualAdmissionGuard::new(Some(season()));

    let violation = guard
        .inspect(&applicants[3], &applicants, run_date())
        .expect("orders 1-3 were skipped");

    assert_eq!(violation.admitted_order, 4);
    assert_eq!(violation.skipped_count, 3);
    let skipped: Vec<u32> = violation
        .skipped
        .iter()
        .map(|entry| entry.waitlist_order)
        .collect();
    assert_eq!(skipped, vec![1, 2, 3]);
    assert_eq!(violation.skipped[0].participant_id, participant("w1"));
}

#[test]
fn head_of_queue_and_unordered_targets_are_not_checked() {
    let applicants: Vec<_> = (1..=3)
        .map(|order| waitlisted(&format!("w{order}"), order))
        .collect();
    let outsider = child("p1", IdentityCategory::General);
    let guard = ManualAdmissionGuard::default();

    assert!(guard.inspect(&applicants[0], &applicants, run_date()).is_none());
    assert!(guard.inspect(&outsider, &applicants, run_date()).is_none());
}

#[test]
fn lottery_season_suppresses_the_check() {
    let applicants: Vec<_> = (1..=3)
        .map(|order| waitlisted(&format!("w{order}"), order))
        .collect();
    let guard = ManualAdmissionGuard::new(Some(season()));
    let in_season = NaiveDate::from_ymd_opt(2025, 5, 31).expect("valid date");

    assert!(guard.in_season(in_season));
    assert!(guard
        .inspect(&applicants[2], &applicants, in_season)
        .is_none());
}

#[test]
fn only_children_still_waitlisted_count_as_skipped() {
    let mut applicants: Vec<_> = (1..=4)
        .map(|order| waitlisted(&format!("w{order}"), order))
        .collect();
    applicants[0].status = ApplicantStatus::WithdrawalPending;

    let violation = ManualAdmissionGuard::default()
        .inspect(&applicants[3], &applicants, run_date())
        .expect("two children skipped");

    assert_eq!(violation.skipped_count, 2);
}
