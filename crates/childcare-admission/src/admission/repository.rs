use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{
    Applicant, ApplicationId, CapacitySnapshot, ClassRoom, InstitutionId, NationalId,
    ParticipantId,
};

/// Records replaced by one committed admission operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionChangeSet {
    pub applicants: Vec<Applicant>,
    pub classes: Vec<ClassRoom>,
}

impl InstitutionChangeSet {
    /// Keep only the records that differ from what was read.
    pub fn between(
        before_applicants: &[Applicant],
        after_applicants: Vec<Applicant>,
        before_classes: &[ClassRoom],
        after_classes: Vec<ClassRoom>,
    ) -> Self {
        let applicants = after_applicants
            .into_iter()
            .filter(|after| {
                before_applicants
                    .iter()
                    .find(|before| before.id == after.id)
                    .map_or(true, |before| before != after)
            })
            .collect();
        let classes = after_classes
            .into_iter()
            .filter(|after| {
                before_classes
                    .iter()
                    .find(|before| before.id == after.id)
                    .map_or(true, |before| before != after)
            })
            .collect();

        Self {
            applicants,
            classes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.applicants.is_empty() && self.classes.is_empty()
    }
}

/// Storage contract consumed by the admission core.
///
/// Reads are scoped to one institution. `commit` must apply the whole change
/// set or none of it.
pub trait AdmissionRepository: Send + Sync {
    fn capacity(
        &self,
        institution: &InstitutionId,
    ) -> Result<Option<CapacitySnapshot>, RepositoryError>;
    fn classes(&self, institution: &InstitutionId) -> Result<Vec<ClassRoom>, RepositoryError>;
    fn applicants(&self, institution: &InstitutionId) -> Result<Vec<Applicant>, RepositoryError>;
    fn find_participant(
        &self,
        application_id: &ApplicationId,
        national_id: &NationalId,
    ) -> Result<Option<Applicant>, RepositoryError>;
    fn commit(
        &self,
        institution: &InstitutionId,
        changes: InstitutionChangeSet,
    ) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hook (e-mail or SMS adapters), invoked after commit.
pub trait AdmissionNotifier: Send + Sync {
    fn publish(&self, notice: AdmissionNotice) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Admitted,
    Waitlisted,
    StatusChanged,
}

/// Payload handed to notification adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionNotice {
    pub kind: NoticeKind,
    pub institution_id: InstitutionId,
    pub application_id: ApplicationId,
    pub participant_id: ParticipantId,
    pub details: BTreeMap<String, String>,
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
