//! Admission allocation core: the annual tiered lottery, class placement by
//! age band, the per-institution waitlist ledger, and the manual admission
//! guard that records out-of-sequence admissions.

pub mod config;
pub mod domain;
pub mod guard;
pub mod ledger;
pub mod lottery;
pub mod placement;
pub mod quota;
pub mod repository;
pub mod roster;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use config::AdmissionConfig;
pub use domain::{
    Applicant, ApplicantStatus, ApplicationId, CapacitySnapshot, ClassId, ClassRoom,
    IdentityCategory, InstitutionId, NationalId, ParticipantId, ParticipantRole, PriorityTier,
    WaitlistReason,
};
pub use guard::{LotterySeason, ManualAdmissionGuard, OrderViolation, SkippedApplicant};
pub use ledger::{LedgerError, LedgerViolation, WaitlistLedger};
pub use lottery::{LotteryResult, RandomSource};
pub use repository::{
    AdmissionNotice, AdmissionNotifier, AdmissionRepository, InstitutionChangeSet, NoticeKind,
    NotifyError, RepositoryError,
};
pub use roster::{RosterImportError, RosterImporter};
pub use router::admission_router;
pub use service::{
    AdmissionError, AdmissionService, InstitutionStatistics, ManualAdmission, ResetSummary,
    StatusChange, WaitlistAssignment,
};
