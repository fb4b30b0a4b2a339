use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{
    Application, ApplicationId, EstablishmentId, Inspection, InspectionId, InspectionStatus,
    InspectorId, ValidationError,
};
use super::repository::{InspectionFilter, NotificationPublisher, SchedulingRepository};
use super::schedule::{deserialize_optional_date, deserialize_optional_time, ScheduleRequest};
use super::scheduler::{InspectionScheduler, SchedulingError};

type Scheduler<R, N> = Arc<InspectionScheduler<R, N>>;

/// Router builder exposing the scheduling, review, and registration endpoints.
pub fn inspection_router<R, N>(scheduler: Scheduler<R, N>) -> Router
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route("/api/v1/inspections", get(list_handler::<R, N>))
        .route(
            "/api/v1/inspections/:inspection_id",
            get(inspection_handler::<R, N>),
        )
        .route(
            "/api/v1/inspections/:inspection_id/history",
            get(history_handler::<R, N>),
        )
        .route(
            "/api/v1/inspections/:inspection_id/schedule",
            post(schedule_handler::<R, N>),
        )
        .route(
            "/api/v1/inspections/:inspection_id/clear",
            post(clear_handler::<R, N>),
        )
        .route(
            "/api/v1/inspections/:inspection_id/complete",
            post(complete_handler::<R, N>),
        )
        .route(
            "/api/v1/inspections/:inspection_id/reject",
            post(reject_handler::<R, N>),
        )
        .route(
            "/api/v1/inspections/:inspection_id/approve",
            post(approve_handler::<R, N>),
        )
        .route(
            "/api/v1/inspections/:inspection_id/reinspection",
            post(reinspection_handler::<R, N>),
        )
        .route(
            "/api/v1/inspectors/eligible",
            get(eligible_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/approve",
            post(approve_application_handler::<R, N>),
        )
        .route(
            "/api/v1/applications/:application_id/reject",
            post(reject_application_handler::<R, N>),
        )
        .route(
            "/api/v1/establishments/:establishment_id/pre-register",
            post(pre_register_handler::<R, N>),
        )
        .route(
            "/api/v1/establishments/:establishment_id/approve",
            post(approve_establishment_handler::<R, N>),
        )
        .route(
            "/api/v1/establishments/:establishment_id/reject",
            post(reject_establishment_handler::<R, N>),
        )
        .route(
            "/api/v1/establishments/:establishment_id/rejections",
            get(rejections_handler::<R, N>),
        )
        .with_state(scheduler)
}

impl SchedulingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SchedulingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SchedulingError::Conflict { .. } | SchedulingError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            SchedulingError::NotFound { .. } => StatusCode::NOT_FOUND,
            SchedulingError::Persistence(_) | SchedulingError::Cancelled => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    #[serde(default)]
    status: Option<InspectionStatus>,
    #[serde(default)]
    inspector_id: Option<InspectorId>,
    #[serde(default)]
    establishment_id: Option<EstablishmentId>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SlotQuery {
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "deserialize_optional_time")]
    start_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "deserialize_optional_time")]
    end_time: Option<NaiveTime>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RejectBody {
    #[serde(default)]
    reasons: Vec<String>,
    #[serde(default)]
    notes: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApproveBody {
    #[serde(default)]
    certificate_url: String,
}

#[derive(Debug, Serialize)]
struct ApplicationApproval {
    application: Application,
    inspection: Option<Inspection>,
}

fn respond<T: Serialize>(result: Result<T, SchedulingError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, axum::Json(body)).into_response(),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &SchedulingError) -> Response {
    let mut payload = json!({ "error": err.to_string() });
    if let SchedulingError::Conflict { inspector_id, .. } = err {
        payload["inspector_id"] = json!(inspector_id);
    }
    (err.status_code(), axum::Json(payload)).into_response()
}

pub(crate) async fn list_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Query(query): Query<ListQuery>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let filter = InspectionFilter {
        status: query.status,
        inspector_id: query.inspector_id,
        establishment_id: query.establishment_id,
        ..InspectionFilter::default()
    };
    respond(scheduler.inspections(&filter).await)
}

pub(crate) async fn inspection_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Path(inspection_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(scheduler.inspection(&InspectionId(inspection_id)).await)
}

pub(crate) async fn history_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Path(inspection_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        scheduler
            .inspection_history(&InspectionId(inspection_id))
            .await,
    )
}

pub(crate) async fn schedule_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Path(inspection_id): Path<String>,
    axum::Json(request): axum::Json<ScheduleRequest>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        scheduler
            .schedule_and_assign(&InspectionId(inspection_id), request)
            .await,
    )
}

pub(crate) async fn clear_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Path(inspection_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(scheduler.clear_schedule(&InspectionId(inspection_id)).await)
}

pub(crate) async fn complete_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Path(inspection_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        scheduler
            .complete_inspection(&InspectionId(inspection_id))
            .await,
    )
}

pub(crate) async fn reject_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Path(inspection_id): Path<String>,
    axum::Json(body): axum::Json<RejectBody>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        scheduler
            .reject(&InspectionId(inspection_id), body.reasons, body.notes)
            .await,
    )
}

pub(crate) async fn approve_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Path(inspection_id): Path<String>,
    axum::Json(body): axum::Json<ApproveBody>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        scheduler
            .approve(&InspectionId(inspection_id), body.certificate_url)
            .await,
    )
}

pub(crate) async fn reinspection_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Path(inspection_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        scheduler
            .request_reinspection(&InspectionId(inspection_id))
            .await,
    )
}

pub(crate) async fn eligible_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Query(slot): Query<SlotQuery>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let (date, start_time, end_time) = match slot_parts(&slot) {
        Ok(parts) => parts,
        Err(err) => return error_response(&SchedulingError::from(err)),
    };
    respond(
        scheduler
            .eligible_inspectors(date, start_time, end_time)
            .await,
    )
}

fn slot_parts(slot: &SlotQuery) -> Result<(NaiveDate, NaiveTime, NaiveTime), ValidationError> {
    Ok((
        slot.date.ok_or(ValidationError::MissingDate)?,
        slot.start_time.ok_or(ValidationError::MissingStartTime)?,
        slot.end_time.ok_or(ValidationError::MissingEndTime)?,
    ))
}

pub(crate) async fn approve_application_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let result = scheduler
        .synchronizer()
        .approve_application(&ApplicationId(application_id))
        .await
        .map(|(application, inspection)| ApplicationApproval {
            application,
            inspection,
        });
    respond(result)
}

pub(crate) async fn reject_application_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        scheduler
            .synchronizer()
            .reject_application(&ApplicationId(application_id))
            .await,
    )
}

pub(crate) async fn pre_register_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Path(establishment_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        scheduler
            .synchronizer()
            .pre_register(&EstablishmentId(establishment_id))
            .await,
    )
}

pub(crate) async fn approve_establishment_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Path(establishment_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        scheduler
            .synchronizer()
            .approve_establishment(&EstablishmentId(establishment_id))
            .await,
    )
}

pub(crate) async fn reject_establishment_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Path(establishment_id): Path<String>,
    axum::Json(body): axum::Json<RejectBody>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        scheduler
            .synchronizer()
            .reject_establishment(&EstablishmentId(establishment_id), body.reasons, body.notes)
            .await,
    )
}

pub(crate) async fn rejections_handler<R, N>(
    State(scheduler): State<Scheduler<R, N>>,
    Path(establishment_id): Path<String>,
) -> Response
where
    R: SchedulingRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        scheduler
            .synchronizer()
            .rejection_history(&EstablishmentId(establishment_id))
            .await,
    )
}
