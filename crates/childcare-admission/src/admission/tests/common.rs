use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex};

use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;

use crate::admission::config::AdmissionConfig;
use crate::admission::domain::{
    Applicant, ApplicantStatus, ApplicationId, CapacitySnapshot, ClassId, ClassRoom,
    IdentityCategory, InstitutionId, NationalId, ParticipantId, ParticipantRole,
};
use crate::admission::guard::LotterySeason;
use crate::admission::lottery::RandomSource;
use crate::admission::repository::{
    AdmissionNotice, AdmissionNotifier, AdmissionRepository, InstitutionChangeSet, NotifyError,
    RepositoryError,
};
use crate::admission::{admission_router, AdmissionService};

pub(super) fn institution() -> InstitutionId {
    InstitutionId("inst-north".to_string())
}

pub(super) fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 1).expect("valid date")
}

pub(super) fn config() -> AdmissionConfig {
    AdmissionConfig {
        random: RandomSource::Seeded(7),
        season: None,
        as_of: Some(run_date()),
    }
}

pub(super) fn in_season_config() -> AdmissionConfig {
    AdmissionConfig {
        season: Some(LotterySeason {
            starts_on: NaiveDate::from_ymd_opt(2025, 7, 1).expect("valid date"),
            ends_on: NaiveDate::from_ymd_opt(2025, 8, 31).expect("valid date"),
        }),
        ..config()
    }
}

/// A three-year-old child on [`run_date`] with a pending application.
pub(super) fn child(id: &str, identity: IdentityCategory) -> Applicant {
    Applicant {
        id: ParticipantId(id.to_string()),
        application_id: ApplicationId(format!("app-{id}")),
        institution_id: institution(),
        national_id: NationalId(format!("N-{id}")),
        birth_date: NaiveDate::from_ymd_opt(2022, 3, 1),
        role: Some(ParticipantRole::Child),
        identity: Some(identity),
        status: ApplicantStatus::PendingReview,
        waitlist_order: None,
        class_id: None,
    }
}

pub(super) fn parent_of(child: &Applicant) -> Applicant {
    Applicant {
        id: ParticipantId(format!("{}-parent", child.id)),
        national_id: NationalId(format!("{}-P", child.national_id.0)),
        birth_date: NaiveDate::from_ymd_opt(1990, 5, 5),
        role: Some(ParticipantRole::Parent),
        ..child.clone()
    }
}

pub(super) fn waitlisted(id: &str, order: u32) -> Applicant {
    Applicant {
        status: ApplicantStatus::Waitlisted,
        waitlist_order: Some(order),
        ..child(id, IdentityCategory::General)
    }
}

pub(super) fn admitted(id: &str, identity: IdentityCategory, class_id: &str) -> Applicant {
    Applicant {
        status: ApplicantStatus::Admitted,
        class_id: Some(ClassId(class_id.to_string())),
        ..child(id, identity)
    }
}

pub(super) fn class(id: &str, min_age: u8, max_age: u8, capacity: u32, enrolled: u32) -> ClassRoom {
    ClassRoom {
        id: ClassId(id.to_string()),
        name: format!("Class {id}"),
        min_age,
        max_age,
        capacity,
        enrolled,
    }
}

pub(super) fn participant(id: &str) -> ParticipantId {
    ParticipantId(id.to_string())
}

#[derive(Default)]
struct InstitutionState {
    capacity: u32,
    classes: Vec<ClassRoom>,
    applicants: Vec<Applicant>,
}

/// Store holding every institution behind one mutex; commits are all-or-nothing.
#[derive(Default, Clone)]
pub(super) struct MemoryRepository {
    institutions: Arc<Mutex<HashMap<InstitutionId, InstitutionState>>>,
    commits: Arc<Mutex<usize>>,
}

impl MemoryRepository {
    pub(super) fn with_institution(
        capacity: u32,
        classes: Vec<ClassRoom>,
        applicants: Vec<Applicant>,
    ) -> Self {
        let repository = Self::default();
        repository
            .institutions
            .lock()
            .expect("repository mutex poisoned")
            .insert(
                institution(),
                InstitutionState {
                    capacity,
                    classes,
                    applicants,
                },
            );
        repository
    }

    pub(super) fn snapshot(&self) -> Vec<Applicant> {
        self.applicants(&institution()).expect("applicants readable")
    }

    pub(super) fn applicant(&self, id: &str) -> Applicant {
        self.snapshot()
            .into_iter()
            .find(|applicant| applicant.id.0 == id)
            .expect("applicant present")
    }

    pub(super) fn class(&self, id: &str) -> ClassRoom {
        self.classes(&institution())
            .expect("classes readable")
            .into_iter()
            .find(|class| class.id.0 == id)
            .expect("class present")
    }

    pub(super) fn commits(&self) -> usize {
        *self.commits.lock().expect("commit counter poisoned")
    }
}

impl AdmissionRepository for MemoryRepository {
    fn capacity(
        &self,
        institution: &InstitutionId,
    ) -> Result<Option<CapacitySnapshot>, RepositoryError> {
        let guard = self.institutions.lock().expect("repository mutex poisoned");
        Ok(guard.get(institution).map(|state| CapacitySnapshot {
            capacity: state.capacity,
            enrolled: state.classes.iter().map(|class| class.enrolled).sum(),
        }))
    }

    fn classes(&self, institution: &InstitutionId) -> Result<Vec<ClassRoom>, RepositoryError> {
        let guard = self.institutions.lock().expect("repository mutex poisoned");
        Ok(guard
            .get(institution)
            .map(|state| state.classes.clone())
            .unwrap_or_default())
    }

    fn applicants(&self, institution: &InstitutionId) -> Result<Vec<Applicant>, RepositoryError> {
        let guard = self.institutions.lock().expect("repository mutex poisoned");
        Ok(guard
            .get(institution)
            .map(|state| state.applicants.clone())
            .unwrap_or_default())
    }

    fn find_participant(
        &self,
        application_id: &ApplicationId,
        national_id: &NationalId,
    ) -> Result<Option<Applicant>, RepositoryError> {
        let guard = self.institutions.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .flat_map(|state| state.applicants.iter())
            .find(|applicant| applicant.matches(application_id, national_id))
            .cloned())
    }

    fn commit(
        &self,
        institution: &InstitutionId,
        changes: InstitutionChangeSet,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.institutions.lock().expect("repository mutex poisoned");
        let state = guard.get_mut(institution).ok_or(RepositoryError::NotFound)?;
        for applicant in changes.applicants {
            match state.applicants.iter_mut().find(|held| held.id == applicant.id) {
                Some(held) => *held = applicant,
                None => state.applicants.push(applicant),
            }
        }
        for class in changes.classes {
            match state.classes.iter_mut().find(|held| held.id == class.id) {
                Some(held) => *held = class,
                None => state.classes.push(class),
            }
        }
        *self.commits.lock().expect("commit counter poisoned") += 1;
        Ok(())
    }
}

/// Serves reads from the wrapped store but refuses every write.
pub(super) struct ReadOnlyRepository(pub(super) MemoryRepository);

impl AdmissionRepository for ReadOnlyRepository {
    fn capacity(
        &self,
        institution: &InstitutionId,
    ) -> Result<Option<CapacitySnapshot>, RepositoryError> {
        self.0.capacity(institution)
    }

    fn classes(&self, institution: &InstitutionId) -> Result<Vec<ClassRoom>, RepositoryError> {
        self.0.classes(institution)
    }

    fn applicants(&self, institution: &InstitutionId) -> Result<Vec<Applicant>, RepositoryError> {
        self.0.applicants(institution)
    }

    fn find_participant(
        &self,
        application_id: &ApplicationId,
        national_id: &NationalId,
    ) -> Result<Option<Applicant>, RepositoryError> {
        self.0.find_participant(application_id, national_id)
    }

    fn commit(
        &self,
        _institution: &InstitutionId,
        _changes: InstitutionChangeSet,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// Parks the first capacity read until the test releases it.
pub(super) struct GatedRepository {
    inner: MemoryRepository,
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
}

impl GatedRepository {
    pub(super) fn new(
        inner: MemoryRepository,
    ) -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let repository = Self {
            inner,
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
        };
        (repository, entered_rx, release_tx)
    }
}

impl AdmissionRepository for GatedRepository {
    fn capacity(
        &self,
        institution: &InstitutionId,
    ) -> Result<Option<CapacitySnapshot>, RepositoryError> {
        let entered = self.entered.lock().expect("gate mutex poisoned").take();
        if let Some(entered) = entered {
            entered.send(()).expect("test waits for the gate");
            let release = self.release.lock().expect("gate mutex poisoned").take();
            if let Some(release) = release {
                release.recv().expect("test releases the gate");
            }
        }
        self.inner.capacity(institution)
    }

    fn classes(&self, institution: &InstitutionId) -> Result<Vec<ClassRoom>, RepositoryError> {
        self.inner.classes(institution)
    }

    fn applicants(&self, institution: &InstitutionId) -> Result<Vec<Applicant>, RepositoryError> {
        self.inner.applicants(institution)
    }

    fn find_participant(
        &self,
        application_id: &ApplicationId,
        national_id: &NationalId,
    ) -> Result<Option<Applicant>, RepositoryError> {
        self.inner.find_participant(application_id, national_id)
    }

    fn commit(
        &self,
        institution: &InstitutionId,
        changes: InstitutionChangeSet,
    ) -> Result<(), RepositoryError> {
        self.inner.commit(institution, changes)
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryNotifier {
    notices: Arc<Mutex<Vec<AdmissionNotice>>>,
}

impl MemoryNotifier {
    pub(super) fn notices(&self) -> Vec<AdmissionNotice> {
        self.notices.lock().expect("notifier mutex poisoned").clone()
    }
}

impl AdmissionNotifier for MemoryNotifier {
    fn publish(&self, notice: AdmissionNotice) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
        Ok(())
    }
}

pub(super) struct OfflineNotifier;

impl AdmissionNotifier for OfflineNotifier {
    fn publish(&self, _notice: AdmissionNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay down".to_string()))
    }
}

pub(super) fn build_service(
    repository: MemoryRepository,
    config: AdmissionConfig,
) -> (
    AdmissionService<MemoryRepository, MemoryNotifier>,
    Arc<MemoryRepository>,
    Arc<MemoryNotifier>,
) {
    let repository = Arc::new(repository);
    let notifier = Arc::new(MemoryNotifier::default());
    let service = AdmissionService::new(repository.clone(), notifier.clone(), config);
    (service, repository, notifier)
}

/// Five general-tier children waitlisted in order `w1..w5`, plus a roomy class.
pub(super) fn five_on_waitlist() -> MemoryRepository {
    MemoryRepository::with_institution(
        40,
        vec![class("c-1", 2, 4, 20, 10)],
        (1..=5)
            .map(|order| waitlisted(&format!("w{order}"), order))
            .collect(),
    )
}

pub(super) fn admission_router_with_service(
    service: AdmissionService<MemoryRepository, MemoryNotifier>,
) -> axum::Router {
    admission_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn orders(applicants: &[Applicant]) -> Vec<(String, u32)> {
    let mut orders: Vec<(String, u32)> = applicants
        .iter()
        .filter_map(|applicant| {
            applicant
                .waitlist_order
                .map(|order| (applicant.id.0.clone(), order))
        })
        .collect();
    orders.sort_by_key(|(_, order)| *order);
    orders
}
