use childcare_admission::admission::{
    AdmissionNotice, AdmissionNotifier, AdmissionRepository, Applicant, ApplicationId,
    CapacitySnapshot, ClassRoom, InstitutionChangeSet, InstitutionId, NationalId, NotifyError,
    RepositoryError,
};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Debug, Clone)]
struct InstitutionRecords {
    capacity: u32,
    classes: Vec<ClassRoom>,
    applicants: Vec<Applicant>,
}

/// Process-local store used by the CLI and the reference server.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAdmissionRepository {
    institutions: Arc<Mutex<HashMap<InstitutionId, InstitutionRecords>>>,
}

impl InMemoryAdmissionRepository {
    pub(crate) fn insert_institution(
        &self,
        institution: InstitutionId,
        capacity: u32,
        classes: Vec<ClassRoom>,
        applicants: Vec<Applicant>,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        if guard.contains_key(&institution) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(
            institution,
            InstitutionRecords {
                capacity,
                classes,
                applicants,
            },
        );
        Ok(())
    }

    fn lock(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<InstitutionId, InstitutionRecords>>, RepositoryError> {
        self.institutions
            .lock()
            .map_err(|_| RepositoryError::Unavailable("repository mutex poisoned".to_string()))
    }
}

impl AdmissionRepository for InMemoryAdmissionRepository {
    fn capacity(
        &self,
        institution: &InstitutionId,
    ) -> Result<Option<CapacitySnapshot>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.get(institution).map(|records| CapacitySnapshot {
            capacity: records.capacity,
            enrolled: records.classes.iter().map(|class| class.enrolled).sum(),
        }))
    }

    fn classes(&self, institution: &InstitutionId) -> Result<Vec<ClassRoom>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .get(institution)
            .map(|records| records.classes.clone())
            .unwrap_or_default())
    }

    fn applicants(&self, institution: &InstitutionId) -> Result<Vec<Applicant>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .get(institution)
            .map(|records| records.applicants.clone())
            .unwrap_or_default())
    }

    fn find_participant(
        &self,
        application_id: &ApplicationId,
        national_id: &NationalId,
    ) -> Result<Option<Applicant>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard
            .values()
            .flat_map(|records| records.applicants.iter())
            .find(|applicant| applicant.matches(application_id, national_id))
            .cloned())
    }

    fn commit(
        &self,
        institution: &InstitutionId,
        changes: InstitutionChangeSet,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        let records = guard.get_mut(institution).ok_or(RepositoryError::NotFound)?;

        // Stage on a copy so a missing record leaves the store untouched.
        let mut staged = records.clone();
        for applicant in changes.applicants {
            let held = staged
                .applicants
                .iter_mut()
                .find(|held| held.id == applicant.id)
                .ok_or(RepositoryError::NotFound)?;
            *held = applicant;
        }
        for class in changes.classes {
            let held = staged
                .classes
                .iter_mut()
                .find(|held| held.id == class.id)
                .ok_or(RepositoryError::NotFound)?;
            *held = class;
        }

        *records = staged;
        Ok(())
    }
}

/// Keeps every notice for later inspection (demo output, tests).
#[derive(Default, Clone)]
pub(crate) struct InMemoryNotifier {
    notices: Arc<Mutex<Vec<AdmissionNotice>>>,
}

impl AdmissionNotifier for InMemoryNotifier {
    fn publish(&self, notice: AdmissionNotice) -> Result<(), NotifyError> {
        let mut guard = self
            .notices
            .lock()
            .map_err(|_| NotifyError::Transport("notifier mutex poisoned".to_string()))?;
        guard.push(notice);
        Ok(())
    }
}

impl InMemoryNotifier {
    pub(crate) fn notices(&self) -> Vec<AdmissionNotice> {
        self.notices
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

/// Writes notices to the log in place of an e-mail/SMS gateway.
#[derive(Default, Clone, Copy)]
pub(crate) struct TracingNotifier;

impl AdmissionNotifier for TracingNotifier {
    fn publish(&self, notice: AdmissionNotice) -> Result<(), NotifyError> {
        info!(
            kind = ?notice.kind,
            institution = %notice.institution_id,
            participant = %notice.participant_id,
            details = ?notice.details,
            "admission notice"
        );
        Ok(())
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
