use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Datelike;
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::conflict::{ConflictChecker, RecurrencePattern, RecurringRule, ScanMode};
use crate::error::ReservationError;
use crate::models::*;

type ApiResult<T> = Result<T, (StatusCode, String)>;

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
/// The full error is logged server-side for debugging, but clients only
/// see a generic message to avoid leaking internal details.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("Internal error: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

/// Map a domain error to its HTTP status. Everything except storage
/// failures is the caller's fault and is returned verbatim.
fn reservation_error(e: ReservationError) -> (StatusCode, String) {
    let status = match &e {
        ReservationError::InvalidTimeRange
        | ReservationError::InvalidRecurrencePattern(_)
        | ReservationError::InvalidRecurrenceRange(_)
        | ReservationError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ReservationError::NotFound(_) => StatusCode::NOT_FOUND,
        ReservationError::Conflict(_) | ReservationError::InvalidTransition { .. } => {
            StatusCode::CONFLICT
        }
        ReservationError::Forbidden(_) => StatusCode::FORBIDDEN,
        ReservationError::Storage(_) => return internal_error(e),
    };
    tracing::warn!("Request rejected: {}", e);
    (status, e.to_string())
}

fn not_found(entity: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{entity} not found"))
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Conflict checks
// ============================================================

pub async fn check_conflict(
    State(state): State<AppState>,
    Json(input): Json<CheckConflictRequest>,
) -> ApiResult<Json<CheckConflictResponse>> {
    let range = TimeRange::parse(&input.start_time, &input.end_time).map_err(reservation_error)?;

    ConflictChecker::new(&state.db)
        .check_conflicts(input.resource_id, input.date, &range)
        .map(|result| Json(result.into()))
        .map_err(reservation_error)
}

pub async fn check_recurring_conflicts(
    State(state): State<AppState>,
    Json(input): Json<CheckRecurringConflictsRequest>,
) -> ApiResult<Json<CheckRecurringConflictsResponse>> {
    let range = TimeRange::parse(&input.start_time, &input.end_time).map_err(reservation_error)?;
    let pattern: RecurrencePattern = input
        .recurrence_pattern
        .parse()
        .map_err(reservation_error)?;
    let rule = RecurringRule::candidate(
        input.resource_id,
        range,
        pattern,
        input.anchor_date,
        input.recurrence_end_date,
    )
    .map_err(reservation_error)?;
    let mode = if input.exhaustive {
        ScanMode::Exhaustive
    } else {
        ScanMode::FirstOnly
    };

    ConflictChecker::new(&state.db)
        .check_recurring_conflicts(&rule, mode)
        .map(|conflicts| Json(conflicts.into()))
        .map_err(reservation_error)
}

// ============================================================
// Laboratories
// ============================================================

pub async fn list_laboratories(State(state): State<AppState>) -> ApiResult<Json<Vec<Laboratory>>> {
    state.db.get_all_laboratories().map(Json).map_err(internal_error)
}

pub async fn create_laboratory(
    State(state): State<AppState>,
    Json(input): Json<CreateLaboratoryInput>,
) -> ApiResult<(StatusCode, Json<Laboratory>)> {
    if input.name.trim().is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "Laboratory name is required".to_string(),
        ));
    }
    state
        .db
        .create_laboratory(input)
        .map(|lab| (StatusCode::CREATED, Json(lab)))
        .map_err(internal_error)
}

pub async fn get_laboratory(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Laboratory>> {
    state
        .db
        .get_laboratory(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Laboratory"))
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

pub async fn get_calendar(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<CalendarQuery>,
) -> ApiResult<Json<Vec<CalendarEvent>>> {
    let today = state.clock.today();
    let year = query.year.unwrap_or(today.year());
    let month = query.month.unwrap_or(today.month());

    state
        .db
        .get_calendar_events(id, year, month)
        .map(Json)
        .map_err(reservation_error)
}

// ============================================================
// Reservations
// ============================================================

pub async fn create_reservation(
    State(state): State<AppState>,
    Path(laboratory_id): Path<Uuid>,
    Json(input): Json<CreateReservationInput>,
) -> ApiResult<(StatusCode, Json<LaboratoryReservation>)> {
    state
        .db
        .create_reservation(laboratory_id, input, state.clock.as_ref())
        .map(|r| (StatusCode::CREATED, Json(r)))
        .map_err(reservation_error)
}

pub async fn list_reservations(
    State(state): State<AppState>,
    Query(filter): Query<ReservationFilter>,
) -> ApiResult<Json<Vec<LaboratoryReservation>>> {
    state
        .db
        .list_reservations(&filter)
        .map(Json)
        .map_err(internal_error)
}

pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LaboratoryReservation>> {
    state
        .db
        .get_reservation(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Reservation"))
}

pub async fn approve_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LaboratoryReservation>> {
    state
        .db
        .approve_reservation(id)
        .map(Json)
        .map_err(reservation_error)
}

pub async fn reject_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<LaboratoryReservation>> {
    state
        .db
        .reject_reservation(id)
        .map(Json)
        .map_err(reservation_error)
}

pub async fn cancel_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<CancelReservationInput>,
) -> ApiResult<Json<LaboratoryReservation>> {
    state
        .db
        .cancel_reservation(id, input.user_id, state.clock.as_ref())
        .map(Json)
        .map_err(reservation_error)
}

// ============================================================
// Class schedules
// ============================================================

pub async fn list_schedules(
    State(state): State<AppState>,
    Path(laboratory_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ClassSchedule>>> {
    state
        .db
        .get_schedules_by_laboratory(laboratory_id)
        .map(Json)
        .map_err(internal_error)
}

pub async fn create_schedule(
    State(state): State<AppState>,
    Path(laboratory_id): Path<Uuid>,
    Json(input): Json<CreateScheduleInput>,
) -> ApiResult<(StatusCode, Json<ClassSchedule>)> {
    state
        .db
        .create_schedule(laboratory_id, input)
        .map(|s| (StatusCode::CREATED, Json(s)))
        .map_err(reservation_error)
}

pub async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateScheduleInput>,
) -> ApiResult<Json<ClassSchedule>> {
    state
        .db
        .update_schedule(id, input)
        .map(Json)
        .map_err(reservation_error)
}

pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.db.delete_schedule(id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("Schedule"))
    }
}

// ============================================================
// Academic calendar
// ============================================================

pub async fn list_academic_years(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<AcademicYearWithTerms>>> {
    state
        .db
        .get_academic_years()
        .map(Json)
        .map_err(internal_error)
}

pub async fn create_academic_year(
    State(state): State<AppState>,
    Json(input): Json<CreateAcademicYearInput>,
) -> ApiResult<(StatusCode, Json<AcademicYear>)> {
    state
        .db
        .create_academic_year(input)
        .map(|year| (StatusCode::CREATED, Json(year)))
        .map_err(reservation_error)
}

pub async fn get_academic_year(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AcademicYearWithTerms>> {
    state
        .db
        .get_academic_year(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Academic year"))
}

pub async fn create_academic_term(
    State(state): State<AppState>,
    Path(academic_year_id): Path<Uuid>,
    Json(input): Json<CreateAcademicTermInput>,
) -> ApiResult<(StatusCode, Json<AcademicTerm>)> {
    state
        .db
        .create_academic_term(academic_year_id, input)
        .map(|term| (StatusCode::CREATED, Json(term)))
        .map_err(reservation_error)
}

pub async fn get_current_term(State(state): State<AppState>) -> ApiResult<Json<AcademicTerm>> {
    state
        .db
        .get_current_term()
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Current academic term"))
}

pub async fn set_current_term(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AcademicTerm>> {
    state
        .db
        .set_current_term(id)
        .map(Json)
        .map_err(reservation_error)
}

// ============================================================
// Equipment requests
// ============================================================

pub async fn create_equipment_request(
    State(state): State<AppState>,
    Json(input): Json<CreateEquipmentRequestInput>,
) -> ApiResult<(StatusCode, Json<EquipmentRequest>)> {
    state
        .db
        .create_equipment_request(input)
        .map(|r| (StatusCode::CREATED, Json(r)))
        .map_err(reservation_error)
}

pub async fn get_equipment_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EquipmentRequest>> {
    state
        .db
        .get_equipment_request(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("Equipment request"))
}

pub async fn approve_equipment_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EquipmentRequest>> {
    state
        .db
        .approve_equipment_request(id)
        .map(Json)
        .map_err(reservation_error)
}

pub async fn reject_equipment_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EquipmentRequest>> {
    state
        .db
        .reject_equipment_request(id)
        .map(Json)
        .map_err(reservation_error)
}

pub async fn return_equipment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<ReturnEquipmentInput>,
) -> ApiResult<Json<EquipmentRequest>> {
    state
        .db
        .return_equipment(id, input, state.clock.as_ref())
        .map(Json)
        .map_err(reservation_error)
}

pub async fn list_overdue_equipment_requests(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<EquipmentRequest>>> {
    state
        .db
        .get_overdue_equipment_requests(state.clock.now())
        .map(Json)
        .map_err(internal_error)
}
