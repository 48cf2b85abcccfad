use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{Applicant, ApplicationId, ParticipantId};

/// Inclusive date window during which the annual lottery governs admissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotterySeason {
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

impl LotterySeason {
    pub fn contains(&self, day: NaiveDate) -> bool {
        (self.starts_on..=self.ends_on).contains(&day)
    }
}

/// Waitlisted child passed over by an out-of-sequence admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedApplicant {
    pub participant_id: ParticipantId,
    pub application_id: ApplicationId,
    pub waitlist_order: u32,
}

/// Audit annotation attached to a manual admission that skipped the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderViolation {
    pub admitted_order: u32,
    pub skipped_count: usize,
    pub skipped: Vec<SkippedApplicant>,
}

/// Detects staff admissions that jump ahead of better-ranked waitlisted children.
#[derive(Debug, Clone, Default)]
pub struct ManualAdmissionGuard {
    season: Option<LotterySeason>,
}

impl ManualAdmissionGuard {
    pub fn new(season: Option<LotterySeason>) -> Self {
        Self { season }
    }

    pub fn season(&self) -> Option<LotterySeason> {
        self.season
    }

    pub fn in_season(&self, today: NaiveDate) -> bool {
        self.season.is_some_and(|season| season.contains(today))
    }

    /// Inspect `target` against its institution's applicants before it is admitted.
    ///
    /// Returns `None` during lottery season, when the target holds no order or
    /// order `1`, or when nobody ranked ahead of it is still waitlisted.
    pub fn inspect(
        &self,
        target: &Applicant,
        institution_applicants: &[Applicant],
        today: NaiveDate,
    ) -> Option<OrderViolation> {
        if self.in_season(today) {
            return None;
        }

        let admitted_order = target.waitlist_order.filter(|order| *order > 1)?;

        let mut skipped: Vec<SkippedApplicant> = institution_applicants
            .iter()
            .filter(|other| other.id != target.id && other.is_waitlisted())
            .filter_map(|other| {
                let order = other.waitlist_order.filter(|order| *order < admitted_order)?;
                Some(SkippedApplicant {
                    participant_id: other.id.clone(),
                    application_id: other.application_id.clone(),
                    waitlist_order: order,
                })
            })
            .collect();

        if skipped.is_empty() {
            return None;
        }

        skipped.sort_by_key(|entry| entry.waitlist_order);
        Some(OrderViolation {
            admitted_order,
            skipped_count: skipped.len(),
            skipped,
        })
    }
}
