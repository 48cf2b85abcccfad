use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{ApplicantStatus, ApplicationId, ClassId, InstitutionId, NationalId};
use super::repository::{AdmissionNotifier, AdmissionRepository};
use super::service::{AdmissionError, AdmissionService};

/// Router builder exposing the lottery, admission, and waitlist endpoints.
pub fn admission_router<R, N>(service: Arc<AdmissionService<R, N>>) -> Router
where
    R: AdmissionRepository + 'static,
    N: AdmissionNotifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/institutions/:institution_id/lottery",
            post(run_lottery_handler::<R, N>).delete(reset_lottery_handler::<R, N>),
        )
        .route(
            "/api/v1/institutions/:institution_id/statistics",
            get(statistics_handler::<R, N>),
        )
        .route(
            "/api/v1/institutions/:institution_id/waitlist",
            post(assign_order_handler::<R, N>),
        )
        .route("/api/v1/admissions", post(manual_admit_handler::<R, N>))
        .route(
            "/api/v1/participants/status",
            put(change_status_handler::<R, N>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParticipantRef {
    pub(crate) application_id: String,
    pub(crate) national_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ManualAdmitRequest {
    pub(crate) application_id: String,
    pub(crate) national_id: String,
    pub(crate) class_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusChangeRequest {
    pub(crate) application_id: String,
    pub(crate) national_id: String,
    pub(crate) status: ApplicantStatus,
}

pub(crate) async fn run_lottery_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(institution_id): Path<String>,
) -> Response
where
    R: AdmissionRepository + 'static,
    N: AdmissionNotifier + 'static,
{
    match service.run_lottery(&InstitutionId(institution_id)) {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reset_lottery_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(institution_id): Path<String>,
) -> Response
where
    R: AdmissionRepository + 'static,
    N: AdmissionNotifier + 'static,
{
    match service.reset_lottery(&InstitutionId(institution_id)) {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn statistics_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(institution_id): Path<String>,
) -> Response
where
    R: AdmissionRepository + 'static,
    N: AdmissionNotifier + 'static,
{
    match service.statistics(&InstitutionId(institution_id)) {
        Ok(statistics) => (StatusCode::OK, axum::Json(statistics)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn assign_order_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(institution_id): Path<String>,
    axum::Json(request): axum::Json<ParticipantRef>,
) -> Response
where
    R: AdmissionRepository + 'static,
    N: AdmissionNotifier + 'static,
{
    match service.assign_waitlist_order(
        &InstitutionId(institution_id),
        &ApplicationId(request.application_id),
        &NationalId(request.national_id),
    ) {
        Ok(assignment) => (StatusCode::OK, axum::Json(assignment)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn manual_admit_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    axum::Json(request): axum::Json<ManualAdmitRequest>,
) -> Response
where
    R: AdmissionRepository + 'static,
    N: AdmissionNotifier + 'static,
{
    match service.manual_admit(
        &ApplicationId(request.application_id),
        &NationalId(request.national_id),
        &ClassId(request.class_id),
    ) {
        Ok(admission) => (StatusCode::OK, axum::Json(admission)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn change_status_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    axum::Json(request): axum::Json<StatusChangeRequest>,
) -> Response
where
    R: AdmissionRepository + 'static,
    N: AdmissionNotifier + 'static,
{
    match service.change_status(
        &ApplicationId(request.application_id),
        &NationalId(request.national_id),
        request.status,
    ) {
        Ok(change) => (StatusCode::OK, axum::Json(change)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) fn status_for(error: &AdmissionError) -> StatusCode {
    match error {
        AdmissionError::NoAvailableSlots { .. }
        | AdmissionError::LotteryInProgress(_)
        | AdmissionError::ClassFull(_)
        | AdmissionError::AlreadyAdmitted(_)
        | AdmissionError::InvalidTransition { .. } => StatusCode::CONFLICT,
        AdmissionError::InstitutionNotFound(_)
        | AdmissionError::ApplicantNotFound(_)
        | AdmissionError::ClassNotFound(_) => StatusCode::NOT_FOUND,
        AdmissionError::MissingBirthDate(_)
        | AdmissionError::InvalidIdentifier(_)
        | AdmissionError::NotAChild(_)
        | AdmissionError::NotOrderable(_)
        | AdmissionError::Ledger(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AdmissionError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_code(error: &AdmissionError) -> &'static str {
    match error {
        AdmissionError::NoAvailableSlots { .. } => "no_available_slots",
        AdmissionError::LotteryInProgress(_) => "lottery_in_progress",
        AdmissionError::InstitutionNotFound(_) => "institution_not_found",
        AdmissionError::ApplicantNotFound(_) => "applicant_not_found",
        AdmissionError::ClassNotFound(_) => "class_not_found",
        AdmissionError::ClassFull(_) => "class_full",
        AdmissionError::MissingBirthDate(_) => "missing_birth_date",
        AdmissionError::InvalidIdentifier(_) => "invalid_identifier",
        AdmissionError::NotAChild(_) => "not_a_child",
        AdmissionError::NotOrderable(_) => "not_orderable",
        AdmissionError::AlreadyAdmitted(_) => "already_admitted",
        AdmissionError::InvalidTransition { .. } => "invalid_transition",
        AdmissionError::Ledger(_) => "ledger_rejected",
        AdmissionError::Repository(_) => "repository_unavailable",
    }
}

pub(crate) fn error_response(error: AdmissionError) -> Response {
    let payload = json!({
        "error": error.to_string(),
        "code": error_code(&error),
    });
    (status_for(&error), axum::Json(payload)).into_response()
}
