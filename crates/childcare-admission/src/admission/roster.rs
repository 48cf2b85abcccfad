//! CSV import of applicant and class rosters for offline lottery runs.

use std::fmt;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use super::domain::{
    Applicant, ApplicantStatus, ApplicationId, ClassId, ClassRoom, IdentityCategory,
    InstitutionId, NationalId, ParticipantId, ParticipantRole,
};

#[derive(Debug)]
pub enum RosterImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidRow { row: usize, reason: String },
}

impl fmt::Display for RosterImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RosterImportError::Io(err) => write!(f, "failed to read roster: {}", err),
            RosterImportError::Csv(err) => write!(f, "invalid roster CSV data: {}", err),
            RosterImportError::InvalidRow { row, reason } => {
                write!(f, "roster row {}: {}", row, reason)
            }
        }
    }
}

impl std::error::Error for RosterImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RosterImportError::Io(err) => Some(err),
            RosterImportError::Csv(err) => Some(err),
            RosterImportError::InvalidRow { .. } => None,
        }
    }
}

impl From<std::io::Error> for RosterImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RosterImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

pub struct RosterImporter;

impl RosterImporter {
    pub fn applicants_from_path<P: AsRef<Path>>(
        path: P,
        institution: &InstitutionId,
    ) -> Result<Vec<Applicant>, RosterImportError> {
        let file = std::fs::File::open(path)?;
        Self::applicants_from_reader(file, institution)
    }

    /// Columns: `participant_id, application_id, national_id, birth_date, role, identity[, status]`.
    ///
    /// Unknown roles or identities are kept as undetermined rather than rejected.
    pub fn applicants_from_reader<R: Read>(
        reader: R,
        institution: &InstitutionId,
    ) -> Result<Vec<Applicant>, RosterImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut applicants = Vec::new();

        for (index, record) in csv_reader.deserialize::<ApplicantRow>().enumerate() {
            let row = record?;
            let row_number = index + 2;
            let birth_date = match row.birth_date.as_deref() {
                Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|err| {
                    RosterImportError::InvalidRow {
                        row: row_number,
                        reason: format!("birth_date '{raw}' is not YYYY-MM-DD ({err})"),
                    }
                })?),
                None => None,
            };
            let status = match row.status.as_deref() {
                Some(raw) => parse_status(raw).ok_or_else(|| RosterImportError::InvalidRow {
                    row: row_number,
                    reason: format!("unknown status '{raw}'"),
                })?,
                None => ApplicantStatus::PendingReview,
            };

            applicants.push(Applicant {
                id: ParticipantId(row.participant_id),
                application_id: ApplicationId(row.application_id),
                institution_id: institution.clone(),
                national_id: NationalId(row.national_id),
                birth_date,
                role: row.role.as_deref().and_then(parse_role),
                identity: row.identity.as_deref().and_then(IdentityCategory::parse),
                status,
                waitlist_order: None,
                class_id: None,
            });
        }

        Ok(applicants)
    }

    pub fn classes_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<ClassRoom>, RosterImportError> {
        let file = std::fs::File::open(path)?;
        Self::classes_from_reader(file)
    }

    /// Columns: `class_id, name, min_age, max_age, capacity[, enrolled]`.
    pub fn classes_from_reader<R: Read>(reader: R) -> Result<Vec<ClassRoom>, RosterImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut classes = Vec::new();

        for (index, record) in csv_reader.deserialize::<ClassRow>().enumerate() {
            let row = record?;
            if row.min_age > row.max_age {
                return Err(RosterImportError::InvalidRow {
                    row: index + 2,
                    reason: format!("min_age {} exceeds max_age {}", row.min_age, row.max_age),
                });
            }
            classes.push(ClassRoom {
                id: ClassId(row.class_id),
                name: row.name,
                min_age: row.min_age,
                max_age: row.max_age,
                capacity: row.capacity,
                enrolled: row.enrolled.unwrap_or(0),
            });
        }

        Ok(classes)
    }
}

#[derive(Debug, Deserialize)]
struct ApplicantRow {
    participant_id: String,
    application_id: String,
    national_id: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    birth_date: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    role: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    identity: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassRow {
    class_id: String,
    name: String,
    min_age: u8,
    max_age: u8,
    capacity: u32,
    #[serde(default)]
    enrolled: Option<u32>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_role(raw: &str) -> Option<ParticipantRole> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "child" => Some(ParticipantRole::Child),
        "parent" => Some(ParticipantRole::Parent),
        _ => None,
    }
}

pub fn parse_status(raw: &str) -> Option<ApplicantStatus> {
    match raw.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
        "pending_review" => Some(ApplicantStatus::PendingReview),
        "waitlisted" => Some(ApplicantStatus::Waitlisted),
        "admitted" => Some(ApplicantStatus::Admitted),
        "needs_supplement" => Some(ApplicantStatus::NeedsSupplement),
        "rejected" => Some(ApplicantStatus::Rejected),
        "withdrawal_pending" => Some(ApplicantStatus::WithdrawalPending),
        "withdrawal_approved" => Some(ApplicantStatus::WithdrawalApproved),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn imports_applicants_with_undetermined_fields() {
        let csv = "participant_id,application_id,national_id,birth_date,role,identity,status\n\
                   p-1,app-1,A123,2022-04-01,child,low_income,\n\
                   p-2,app-1,A124,,parent,,waitlisted\n\
                   p-3,app-2,B200,2021-11-30,guardian,alien,\n";
        let institution = InstitutionId("inst-1".to_string());
        let applicants = RosterImporter::applicants_from_reader(Cursor::new(csv), &institution)
            .expect("roster parses");

        assert_eq!(applicants.len(), 3);
        assert!(applicants[0].is_orderable());
        assert_eq!(applicants[0].status, ApplicantStatus::PendingReview);
        assert_eq!(applicants[1].status, ApplicantStatus::Waitlisted);
        assert_eq!(applicants[1].birth_date, None);
        assert_eq!(applicants[2].role, None);
        assert!(!applicants[2].is_orderable());
    }

    #[test]
    fn rejects_malformed_birth_dates() {
        let csv = "participant_id,application_id,national_id,birth_date,role,identity\n\
                   p-1,app-1,A123,04/01/2022,child,general\n";
        let institution = InstitutionId("inst-1".to_string());
        match RosterImporter::applicants_from_reader(Cursor::new(csv), &institution) {
            Err(RosterImportError::InvalidRow { row, .. }) => assert_eq!(row, 2),
            other => panic!("expected invalid row, got {other:?}"),
        }
    }

    #[test]
    fn imports_classes_and_validates_age_band() {
        let csv = "class_id,name,min_age,max_age,capacity,enrolled\n\
                   c-1,Sprouts,2,3,16,4\n\
                   c-2,Buds,3,4,20,\n";
        let classes = RosterImporter::classes_from_reader(Cursor::new(csv)).expect("classes parse");
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].remaining(), 12);
        assert_eq!(classes[1].enrolled, 0);

        let inverted = "class_id,name,min_age,max_age,capacity\nc-9,Odd,5,2,10\n";
        assert!(matches!(
            RosterImporter::classes_from_reader(Cursor::new(inverted)),
            Err(RosterImportError::InvalidRow { .. })
        ));
    }
}
