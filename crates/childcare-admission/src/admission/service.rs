use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::AdmissionConfig;
use super::domain::{
    Applicant, ApplicantStatus, ApplicationId, CapacitySnapshot, ClassId, ClassRoom,
    InstitutionId, NationalId, ParticipantId, ParticipantRole, PriorityTier,
};
use super::guard::{ManualAdmissionGuard, OrderViolation};
use super::ledger::{verify_orders, LedgerError, WaitlistLedger};
use super::lottery::{
    admitted_by_tier, plan_lottery, LotteryError, LotteryInput, LotteryResult,
};
use super::placement::{ClassRoster, SeatError};
use super::quota::{compute_quotas, TierQuotas};
use super::repository::{
    AdmissionNotice, AdmissionNotifier, AdmissionRepository, InstitutionChangeSet, NoticeKind,
    RepositoryError,
};

/// Service composing the lottery, placement, ledger, and guard over a repository.
pub struct AdmissionService<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    guard: ManualAdmissionGuard,
    config: AdmissionConfig,
    institution_locks: Mutex<HashMap<InstitutionId, Arc<Mutex<()>>>>,
    running_lotteries: Mutex<HashSet<InstitutionId>>,
    runs: AtomicU64,
}

/// Outcome of a staff-initiated admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualAdmission {
    pub participant_id: ParticipantId,
    pub class_id: ClassId,
    pub admitted: bool,
    pub released_order: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_violation: Option<OrderViolation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistAssignment {
    pub participant_id: ParticipantId,
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub participant_id: ParticipantId,
    pub from: ApplicantStatus,
    pub to: ApplicantStatus,
    pub waitlist_order: Option<u32>,
    pub released_order: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSummary {
    pub cleared: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStatistics {
    pub tier: PriorityTier,
    pub applicants: u32,
    pub admitted: u32,
    pub waitlisted: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassStatistics {
    pub class_id: ClassId,
    pub name: String,
    pub min_age: u8,
    pub max_age: u8,
    pub capacity: u32,
    pub enrolled: u32,
    pub remaining: u32,
}

impl From<&ClassRoom> for ClassStatistics {
    fn from(class: &ClassRoom) -> Self {
        Self {
            class_id: class.id.clone(),
            name: class.name.clone(),
            min_age: class.min_age,
            max_age: class.max_age,
            capacity: class.capacity,
            enrolled: class.enrolled,
            remaining: class.remaining(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionStatistics {
    pub institution_id: InstitutionId,
    pub capacity: CapacitySnapshot,
    pub per_tier_counts: Vec<TierStatistics>,
    pub per_tier_quota: TierQuotas,
    pub class_info: Vec<ClassStatistics>,
}

impl<R, N> AdmissionService<R, N>
where
    R: AdmissionRepository + 'static,
    N: AdmissionNotifier + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>, config: AdmissionConfig) -> Self {
        Self {
            repository,
            notifier,
            guard: ManualAdmissionGuard::new(config.season),
            config,
            institution_locks: Mutex::new(HashMap::new()),
            running_lotteries: Mutex::new(HashSet::new()),
            runs: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Run the annual lottery for one institution and persist it as one batch.
    pub fn run_lottery(
        &self,
        institution: &InstitutionId,
    ) -> Result<LotteryResult, AdmissionError> {
        require_identifier(&institution.0, "institution_id")?;
        let _running = self.claim_lottery(institution)?;
        self.require_institution(institution)?;
        let lock = self.institution_lock(institution)?;
        let _serialized = acquire(&lock)?;

        let capacity = self
            .repository
            .capacity(institution)?
            .ok_or_else(|| AdmissionError::InstitutionNotFound(institution.clone()))?;
        let applicants = self.repository.applicants(institution)?;
        let classes = self.repository.classes(institution)?;
        let run_date = self.config.today();

        let run = self.runs.fetch_add(1, Ordering::Relaxed);
        let mut rng = self.config.random.rng_for_run(run);
        let plan = plan_lottery(
            LotteryInput {
                institution_id: institution.clone(),
                capacity,
                applicants: applicants.clone(),
                classes: classes.clone(),
                run_date,
            },
            &mut rng,
        )?;

        log_ledger_state(institution, &plan.applicants);
        let changes =
            InstitutionChangeSet::between(&applicants, plan.applicants, &classes, plan.classes);
        self.repository.commit(institution, changes)?;

        info!(
            institution = %institution,
            admitted = plan.result.accepted.len(),
            waitlisted = plan.result.waitlisted.len(),
            "lottery committed"
        );

        for accepted in &plan.result.accepted {
            let mut details = BTreeMap::new();
            details.insert("class_id".to_string(), accepted.class_id.0.clone());
            details.insert("tier".to_string(), accepted.tier.label().to_string());
            self.notify(AdmissionNotice {
                kind: NoticeKind::Admitted,
                institution_id: institution.clone(),
                application_id: accepted.application_id.clone(),
                participant_id: accepted.participant_id.clone(),
                details,
            });
        }
        for waitlisted in &plan.result.waitlisted {
            let mut details = BTreeMap::new();
            details.insert("order".to_string(), waitlisted.waitlist_order.to_string());
            details.insert("reason".to_string(), waitlisted.reason.label().to_string());
            self.notify(AdmissionNotice {
                kind: NoticeKind::Waitlisted,
                institution_id: institution.clone(),
                application_id: waitlisted.application_id.clone(),
                participant_id: waitlisted.participant_id.clone(),
                details,
            });
        }

        Ok(plan.result)
    }

    /// Admit a child directly into `class_id`, flagging skipped waitlist orders.
    pub fn manual_admit(
        &self,
        application_id: &ApplicationId,
        national_id: &NationalId,
        class_id: &ClassId,
    ) -> Result<ManualAdmission, AdmissionError> {
        require_identifier(&application_id.0, "application_id")?;
        require_identifier(&national_id.0, "national_id")?;
        require_identifier(&class_id.0, "class_id")?;

        let institution = self.institution_of(application_id, national_id)?;
        let lock = self.institution_lock(&institution)?;
        let _serialized = acquire(&lock)?;

        let before = self.repository.applicants(&institution)?;
        let classes = self.repository.classes(&institution)?;
        let mut applicants = before.clone();
        let index = find_in(&applicants, application_id, national_id)?;

        let target = &applicants[index];
        if target.role != Some(ParticipantRole::Child) {
            return Err(AdmissionError::NotAChild(target.id.clone()));
        }
        if target.status == ApplicantStatus::Admitted {
            return Err(AdmissionError::AlreadyAdmitted(target.id.clone()));
        }

        let mut roster = ClassRoster::new(classes.clone());
        if let Some(held) = &target.class_id {
            roster.release(held);
        }
        roster.seat(class_id)?;

        let violation = self
            .guard
            .inspect(target, &applicants, self.config.today());
        let participant_id = target.id.clone();

        let released_order = WaitlistLedger::new(&mut applicants).close(&participant_id)?;
        let admitted = &mut applicants[index];
        admitted.status = ApplicantStatus::Admitted;
        admitted.class_id = Some(class_id.clone());
        let application = admitted.application_id.clone();

        log_ledger_state(&institution, &applicants);
        let changes =
            InstitutionChangeSet::between(&before, applicants, &classes, roster.into_classes());
        self.repository.commit(&institution, changes)?;

        match &violation {
            Some(violation) => warn!(
                institution = %institution,
                participant = %participant_id,
                admitted_order = violation.admitted_order,
                skipped = violation.skipped_count,
                "manual admission skipped waitlist order"
            ),
            None => info!(
                institution = %institution,
                participant = %participant_id,
                "manual admission committed"
            ),
        }

        let mut details = BTreeMap::new();
        details.insert("class_id".to_string(), class_id.0.clone());
        self.notify(AdmissionNotice {
            kind: NoticeKind::Admitted,
            institution_id: institution,
            application_id: application,
            participant_id: participant_id.clone(),
            details,
        });

        Ok(ManualAdmission {
            participant_id,
            class_id: class_id.clone(),
            admitted: true,
            released_order,
            order_violation: violation,
        })
    }

    /// Waitlist a reviewed child and give it the next order in its institution.
    pub fn assign_waitlist_order(
        &self,
        institution: &InstitutionId,
        application_id: &ApplicationId,
        national_id: &NationalId,
    ) -> Result<WaitlistAssignment, AdmissionError> {
        require_identifier(&institution.0, "institution_id")?;
        require_identifier(&application_id.0, "application_id")?;
        require_identifier(&national_id.0, "national_id")?;
        self.require_institution(institution)?;

        let lock = self.institution_lock(institution)?;
        let _serialized = acquire(&lock)?;

        let before = self.repository.applicants(institution)?;
        let mut applicants = before.clone();
        let index = find_in(&applicants, application_id, national_id)?;

        let target = &mut applicants[index];
        if !target.is_orderable() {
            return Err(AdmissionError::NotOrderable(target.id.clone()));
        }
        if target.status == ApplicantStatus::Admitted {
            return Err(AdmissionError::InvalidTransition {
                from: target.status,
                to: ApplicantStatus::Waitlisted,
            });
        }
        target.status = ApplicantStatus::Waitlisted;
        let participant_id = target.id.clone();

        let order = WaitlistLedger::new(&mut applicants).append(&participant_id)?;

        log_ledger_state(institution, &applicants);
        let changes = InstitutionChangeSet::between(&before, applicants, &[], Vec::new());
        if !changes.is_empty() {
            self.repository.commit(institution, changes)?;
        }

        info!(institution = %institution, participant = %participant_id, order, "waitlist order assigned");
        Ok(WaitlistAssignment {
            participant_id,
            order,
        })
    }

    /// Apply a review decision, keeping the waitlist contiguous.
    ///
    /// Admission needs a class and goes through [`Self::manual_admit`].
    pub fn change_status(
        &self,
        application_id: &ApplicationId,
        national_id: &NationalId,
        status: ApplicantStatus,
    ) -> Result<StatusChange, AdmissionError> {
        require_identifier(&application_id.0, "application_id")?;
        require_identifier(&national_id.0, "national_id")?;

        let institution = self.institution_of(application_id, national_id)?;
        let lock = self.institution_lock(&institution)?;
        let _serialized = acquire(&lock)?;

        let before = self.repository.applicants(&institution)?;
        let classes = self.repository.classes(&institution)?;
        let mut applicants = before.clone();
        let mut roster = ClassRoster::new(classes.clone());
        let index = find_in(&applicants, application_id, national_id)?;

        let from = applicants[index].status;
        check_transition(from, status)?;
        let participant_id = applicants[index].id.clone();

        let released_order = if from == ApplicantStatus::Waitlisted && status != from {
            WaitlistLedger::new(&mut applicants).close(&participant_id)?
        } else {
            None
        };

        let target = &mut applicants[index];
        if !holds_seat(status) {
            if let Some(class_id) = target.class_id.take() {
                roster.release(&class_id);
            }
        }
        target.status = status;
        let orderable = target.is_orderable();
        let application = target.application_id.clone();

        let waitlist_order = if status == ApplicantStatus::Waitlisted && orderable {
            Some(WaitlistLedger::new(&mut applicants).append(&participant_id)?)
        } else {
            None
        };

        log_ledger_state(&institution, &applicants);
        let changes =
            InstitutionChangeSet::between(&before, applicants, &classes, roster.into_classes());
        if !changes.is_empty() {
            self.repository.commit(&institution, changes)?;
        }

        info!(
            institution = %institution,
            participant = %participant_id,
            from = from.label(),
            to = status.label(),
            "participant status changed"
        );

        if from != status {
            let mut details = BTreeMap::new();
            details.insert("from".to_string(), from.label().to_string());
            details.insert("to".to_string(), status.label().to_string());
            self.notify(AdmissionNotice {
                kind: NoticeKind::StatusChanged,
                institution_id: institution,
                application_id: application,
                participant_id: participant_id.clone(),
                details,
            });
        }

        Ok(StatusChange {
            participant_id,
            from,
            to: status,
            waitlist_order,
            released_order,
        })
    }

    /// Clear every waitlist order of an institution ahead of the next season.
    pub fn reset_lottery(&self, institution: &InstitutionId) -> Result<ResetSummary, AdmissionError> {
        require_identifier(&institution.0, "institution_id")?;
        self.require_institution(institution)?;
        let lock = self.institution_lock(institution)?;
        let _serialized = acquire(&lock)?;

        let before = self.repository.applicants(institution)?;
        let mut applicants = before.clone();
        let cleared = WaitlistLedger::new(&mut applicants).reset();

        let changes = InstitutionChangeSet::between(&before, applicants, &[], Vec::new());
        if !changes.is_empty() {
            self.repository.commit(institution, changes)?;
        }

        info!(institution = %institution, cleared, "waitlist orders reset");
        Ok(ResetSummary { cleared })
    }

    pub fn statistics(
        &self,
        institution: &InstitutionId,
    ) -> Result<InstitutionStatistics, AdmissionError> {
        require_identifier(&institution.0, "institution_id")?;
        let capacity = self
            .repository
            .capacity(institution)?
            .ok_or_else(|| AdmissionError::InstitutionNotFound(institution.clone()))?;
        let applicants = self.repository.applicants(institution)?;
        let classes = ClassRoster::new(self.repository.classes(institution)?);

        let per_tier_quota = compute_quotas(capacity.capacity, admitted_by_tier(&applicants));
        let per_tier_counts = PriorityTier::ALL
            .iter()
            .map(|tier| {
                let members = applicants
                    .iter()
                    .filter(|applicant| applicant.is_orderable() && applicant.tier() == Some(*tier));
                let mut stats = TierStatistics {
                    tier: *tier,
                    applicants: 0,
                    admitted: 0,
                    waitlisted: 0,
                };
                for applicant in members {
                    stats.applicants += 1;
                    match applicant.status {
                        ApplicantStatus::Admitted => stats.admitted += 1,
                        ApplicantStatus::Waitlisted => stats.waitlisted += 1,
                        _ => {}
                    }
                }
                stats
            })
            .collect();

        Ok(InstitutionStatistics {
            institution_id: institution.clone(),
            capacity,
            per_tier_counts,
            per_tier_quota,
            class_info: classes.classes().iter().map(ClassStatistics::from).collect(),
        })
    }

    fn institution_of(
        &self,
        application_id: &ApplicationId,
        national_id: &NationalId,
    ) -> Result<InstitutionId, AdmissionError> {
        self.repository
            .find_participant(application_id, national_id)?
            .map(|applicant| applicant.institution_id)
            .ok_or_else(|| AdmissionError::ApplicantNotFound(application_id.clone()))
    }

    fn require_institution(&self, institution: &InstitutionId) -> Result<(), AdmissionError> {
        match self.repository.capacity(institution)? {
            Some(_) => Ok(()),
            None => Err(AdmissionError::InstitutionNotFound(institution.clone())),
        }
    }

    /// Lock serialising writes to one institution. Locks nobody holds are pruned.
    fn institution_lock(&self, institution: &InstitutionId) -> Result<Arc<Mutex<()>>, AdmissionError> {
        let mut locks = self
            .institution_locks
            .lock()
            .map_err(|_| poisoned("institution lock registry"))?;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(locks
            .entry(institution.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    #[cfg(test)]
    pub(crate) fn tracked_institutions(&self) -> usize {
        self.institution_locks
            .lock()
            .map(|locks| locks.len())
            .unwrap_or_default()
    }

    fn claim_lottery(&self, institution: &InstitutionId) -> Result<RunningLottery<'_>, AdmissionError> {
        let mut running = self
            .running_lotteries
            .lock()
            .map_err(|_| poisoned("lottery registry"))?;
        if !running.insert(institution.clone()) {
            return Err(AdmissionError::LotteryInProgress(institution.clone()));
        }
        Ok(RunningLottery {
            registry: &self.running_lotteries,
            institution: institution.clone(),
        })
    }

    fn notify(&self, notice: AdmissionNotice) {
        if let Err(error) = self.notifier.publish(notice) {
            warn!(%error, "admission notice not delivered");
        }
    }
}

/// Marks a lottery as running for its institution until dropped.
struct RunningLottery<'a> {
    registry: &'a Mutex<HashSet<InstitutionId>>,
    institution: InstitutionId,
}

impl Drop for RunningLottery<'_> {
    fn drop(&mut self) {
        if let Ok(mut running) = self.registry.lock() {
            running.remove(&self.institution);
        }
    }
}

fn acquire(lock: &Mutex<()>) -> Result<MutexGuard<'_, ()>, AdmissionError> {
    lock.lock().map_err(|_| poisoned("institution lock"))
}

fn poisoned(what: &str) -> AdmissionError {
    AdmissionError::Repository(RepositoryError::Unavailable(format!("{what} poisoned")))
}

fn require_identifier(value: &str, field: &'static str) -> Result<(), AdmissionError> {
    if value.trim().is_empty() {
        Err(AdmissionError::InvalidIdentifier(field))
    } else {
        Ok(())
    }
}

fn find_in(
    applicants: &[Applicant],
    application_id: &ApplicationId,
    national_id: &NationalId,
) -> Result<usize, AdmissionError> {
    applicants
        .iter()
        .position(|applicant| applicant.matches(application_id, national_id))
        .ok_or_else(|| AdmissionError::ApplicantNotFound(application_id.clone()))
}

const fn ends_enrolment(status: ApplicantStatus) -> bool {
    matches!(
        status,
        ApplicantStatus::WithdrawalApproved | ApplicantStatus::Rejected
    )
}

/// Statuses under which a child keeps the class seat it was admitted to.
const fn holds_seat(status: ApplicantStatus) -> bool {
    matches!(
        status,
        ApplicantStatus::Admitted | ApplicantStatus::WithdrawalPending
    )
}

fn check_transition(from: ApplicantStatus, to: ApplicantStatus) -> Result<(), AdmissionError> {
    let allowed = match (from, to) {
        (_, ApplicantStatus::Admitted) => from == to,
        (ApplicantStatus::Admitted, next) => {
            ends_enrolment(next) || next == ApplicantStatus::WithdrawalPending
        }
        _ => true,
    };

    if allowed {
        Ok(())
    } else {
        Err(AdmissionError::InvalidTransition { from, to })
    }
}

fn log_ledger_state(institution: &InstitutionId, applicants: &[Applicant]) {
    if let Err(violation) = verify_orders(applicants) {
        debug!(institution = %institution, %violation, "waitlist not contiguous");
    }
}

/// Error raised by the admission service.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("no available slots (capacity {capacity}, enrolled {enrolled})")]
    NoAvailableSlots { capacity: u32, enrolled: u32 },
    #[error("lottery already in progress for institution {0}")]
    LotteryInProgress(InstitutionId),
    #[error("institution {0} not found")]
    InstitutionNotFound(InstitutionId),
    #[error("no participant found on application {0}")]
    ApplicantNotFound(ApplicationId),
    #[error("class {0} not found")]
    ClassNotFound(ClassId),
    #[error("class {0} is full")]
    ClassFull(ClassId),
    #[error("participant {0} has no birth date on file")]
    MissingBirthDate(ParticipantId),
    #[error("{0} must not be blank")]
    InvalidIdentifier(&'static str),
    #[error("participant {0} is not a child")]
    NotAChild(ParticipantId),
    #[error("participant {0} cannot hold a waitlist order")]
    NotOrderable(ParticipantId),
    #[error("participant {0} is already admitted")]
    AlreadyAdmitted(ParticipantId),
    #[error("cannot move participant from {} to {}", .from.label(), .to.label())]
    InvalidTransition {
        from: ApplicantStatus,
        to: ApplicantStatus,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<LotteryError> for AdmissionError {
    fn from(value: LotteryError) -> Self {
        match value {
            LotteryError::NoAvailableSlots { capacity, enrolled } => {
                Self::NoAvailableSlots { capacity, enrolled }
            }
            LotteryError::MissingBirthDate(id) => Self::MissingBirthDate(id),
            LotteryError::Ledger(error) => Self::Ledger(error),
        }
    }
}

impl From<SeatError> for AdmissionError {
    fn from(value: SeatError) -> Self {
        match value {
            SeatError::UnknownClass(id) => Self::ClassNotFound(id),
            SeatError::ClassFull(id) => Self::ClassFull(id),
        }
    }
}
