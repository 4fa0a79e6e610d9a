// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use shared_database::AppState;
use shared_models::error::AppError;
use shared_models::scheduling::DbId;
use shared_utils::extractor::Caller;

use crate::models::{
    AppointmentListQuery, BookAppointmentRequest, CancelAppointmentRequest, RescheduleAppointmentRequest,
    StatusDecisionRequest,
};
use crate::services::validation::{
    parse_decision, parse_list_query, validate_booking, validate_cancel_reason, validate_reschedule,
};
use crate::services::AppointmentBookingService;

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let patient_id = scope.patient_id()?;
    let spec = validate_booking(&request)?;

    let appointment = AppointmentBookingService::new(&state)
        .book_appointment(patient_id, &spec)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "appointment": appointment,
            "message": "Appointment booked",
        })),
    ))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(appointment_id): Path<DbId>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let patient_id = scope.patient_id()?;
    let spec = validate_reschedule(&request)?;

    let appointment = AppointmentBookingService::new(&state)
        .reschedule_appointment(patient_id, appointment_id, &spec)
        .await?;

    Ok(Json(json!({
        "appointment": appointment,
        "message": "Appointment rescheduled, awaiting confirmation",
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(appointment_id): Path<DbId>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let patient_id = scope.patient_id()?;
    let reason = validate_cancel_reason(request.reason.as_deref())?;

    let appointment = AppointmentBookingService::new(&state)
        .cancel_appointment(patient_id, appointment_id, reason.as_deref())
        .await?;

    Ok(Json(json!({
        "appointment": appointment,
        "message": "Appointment cancelled",
    })))
}

/// Doctor decision: confirm, decline, complete or no-show.
#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(appointment_id): Path<DbId>,
    Json(request): Json<StatusDecisionRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = scope.doctor_id()?;
    let decision = parse_decision(&request.decision)?;
    let reason = validate_cancel_reason(request.reason.as_deref())?;

    let appointment = AppointmentBookingService::new(&state)
        .decide(doctor_id, appointment_id, decision, reason.as_deref())
        .await?;

    Ok(Json(json!({
        "appointment": appointment,
        "message": format!("Appointment is now {}", appointment.status),
    })))
}

// ==============================================================================
// READ HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_my_appointments(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let filter = parse_list_query(&query)?;

    let appointments = AppointmentBookingService::new(&state)
        .list_appointments(&scope, &filter)
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(appointment_id): Path<DbId>,
) -> Result<Json<Value>, AppError> {
    let appointment = AppointmentBookingService::new(&state)
        .get_appointment(&scope, appointment_id)
        .await?;

    Ok(Json(json!(appointment)))
}
