use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for institutions taking part in the placement program.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstitutionId(pub String);

/// Identifier wrapper for submitted applications (one per household).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier wrapper for a participant record within an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

/// National identity string as captured on the application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NationalId(pub String);

/// Classroom identifier. Ordering is byte-wise and drives the placement tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub String);

macro_rules! display_id {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_id!(InstitutionId, ApplicationId, ParticipantId, ClassId);

/// Legally defined priority classes, each with a reserved share of seats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    First,
    Second,
    Third,
}

impl PriorityTier {
    pub const ALL: [PriorityTier; 3] = [
        PriorityTier::First,
        PriorityTier::Second,
        PriorityTier::Third,
    ];

    pub const fn index(self) -> usize {
        match self {
            PriorityTier::First => 0,
            PriorityTier::Second => 1,
            PriorityTier::Third => 2,
        }
    }

    pub const fn number(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn from_number(value: u8) -> Option<Self> {
        match value {
            1 => Some(PriorityTier::First),
            2 => Some(PriorityTier::Second),
            3 => Some(PriorityTier::Third),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            PriorityTier::First => "tier_1",
            PriorityTier::Second => "tier_2",
            PriorityTier::Third => "tier_3",
        }
    }
}

/// Identity categories declared on the application; each maps onto one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityCategory {
    LowIncome,
    MiddleLowIncome,
    Disability,
    SpecialCircumstances,
    Indigenous,
    MultipleChildren,
    General,
}

impl IdentityCategory {
    pub const fn tier(self) -> PriorityTier {
        match self {
            IdentityCategory::LowIncome
            | IdentityCategory::MiddleLowIncome
            | IdentityCategory::Disability
            | IdentityCategory::SpecialCircumstances => PriorityTier::First,
            IdentityCategory::Indigenous | IdentityCategory::MultipleChildren => {
                PriorityTier::Second
            }
            IdentityCategory::General => PriorityTier::Third,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "low_income" => Some(Self::LowIncome),
            "middle_low_income" => Some(Self::MiddleLowIncome),
            "disability" => Some(Self::Disability),
            "special_circumstances" => Some(Self::SpecialCircumstances),
            "indigenous" => Some(Self::Indigenous),
            "multiple_children" => Some(Self::MultipleChildren),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

/// Role a participant plays inside its application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Parent,
    Child,
}

/// Review and placement status tracked per participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicantStatus {
    PendingReview,
    Waitlisted,
    Admitted,
    NeedsSupplement,
    Rejected,
    WithdrawalPending,
    WithdrawalApproved,
}

impl ApplicantStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicantStatus::PendingReview => "pending_review",
            ApplicantStatus::Waitlisted => "waitlisted",
            ApplicantStatus::Admitted => "admitted",
            ApplicantStatus::NeedsSupplement => "needs_supplement",
            ApplicantStatus::Rejected => "rejected",
            ApplicantStatus::WithdrawalPending => "withdrawal_pending",
            ApplicantStatus::WithdrawalApproved => "withdrawal_approved",
        }
    }

    /// Statuses that make a child eligible for the annual draw.
    pub const fn enters_lottery(self) -> bool {
        matches!(
            self,
            ApplicantStatus::PendingReview | ApplicantStatus::Waitlisted
        )
    }
}

/// One participant of an application as seen by the admission core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Applicant {
    pub id: ParticipantId,
    pub application_id: ApplicationId,
    pub institution_id: InstitutionId,
    pub national_id: NationalId,
    pub birth_date: Option<NaiveDate>,
    pub role: Option<ParticipantRole>,
    pub identity: Option<IdentityCategory>,
    pub status: ApplicantStatus,
    pub waitlist_order: Option<u32>,
    pub class_id: Option<ClassId>,
}

impl Applicant {
    pub fn tier(&self) -> Option<PriorityTier> {
        self.identity.map(IdentityCategory::tier)
    }

    /// Only children with a determinable tier carry a waitlist order.
    pub fn is_orderable(&self) -> bool {
        self.role == Some(ParticipantRole::Child) && self.tier().is_some()
    }

    pub fn is_waitlisted(&self) -> bool {
        self.status == ApplicantStatus::Waitlisted
    }

    pub fn matches(&self, application_id: &ApplicationId, national_id: &NationalId) -> bool {
        &self.application_id == application_id && &self.national_id == national_id
    }
}

/// Classroom with an inclusive age band measured in completed years.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRoom {
    pub id: ClassId,
    pub name: String,
    pub min_age: u8,
    pub max_age: u8,
    pub capacity: u32,
    pub enrolled: u32,
}

impl ClassRoom {
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.enrolled)
    }

    pub fn covers_age(&self, age: u32) -> bool {
        (u32::from(self.min_age)..=u32::from(self.max_age)).contains(&age)
    }
}

/// Legal capacity and currently enrolled headcount for an institution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub capacity: u32,
    pub enrolled: u32,
}

impl CapacitySnapshot {
    pub fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.enrolled)
    }
}

/// Why an applicant ended a lottery run on the waitlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistReason {
    NotDrawn,
    NoEligibleAgeBand,
    ClassFull,
}

impl WaitlistReason {
    pub const fn label(self) -> &'static str {
        match self {
            WaitlistReason::NotDrawn => "not drawn",
            WaitlistReason::NoEligibleAgeBand => "no eligible age-band",
            WaitlistReason::ClassFull => "class full",
        }
    }
}

/// Completed years between `birth_date` and `on`; zero for future birth dates.
pub fn age_in_years(birth_date: NaiveDate, on: NaiveDate) -> u32 {
    if on < birth_date {
        return 0;
    }
    let mut years = on.year() - birth_date.year();
    if (on.month(), on.day()) < (birth_date.month(), birth_date.day()) {
        years -= 1;
    }
    years as u32
}
