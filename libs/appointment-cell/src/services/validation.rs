use shared_database::appointments::AppointmentListFilter;
use shared_models::error::AppError;
use shared_models::scheduling::{AppointmentStatus, ConsultationType};
use shared_utils::time::{ensure_time_order, parse_clock_time, parse_date};

use crate::models::{
    AppointmentDecision, AppointmentError, AppointmentListQuery, BookAppointmentRequest,
    RescheduleAppointmentRequest, BookingSpec, RescheduleSpec,
};

/// Longest free-text reason accepted on bookings and cancellations.
const MAX_REASON_LEN: usize = 500;

fn parse_type(raw: &str) -> Result<ConsultationType, AppointmentError> {
    raw.parse::<ConsultationType>().map_err(AppointmentError::Validation)
}

fn clean_reason(field: &str, raw: &str) -> Result<String, AppointmentError> {
    let reason = raw.trim();
    if reason.is_empty() {
        return Err(AppointmentError::Validation(format!("{} must not be empty", field)));
    }
    if reason.chars().count() > MAX_REASON_LEN {
        return Err(AppointmentError::Validation(format!(
            "{} must be at most {} characters",
            field, MAX_REASON_LEN
        )));
    }
    Ok(reason.to_string())
}

/// Shape checks on a booking payload. Calendar rules (past dates, doctor
/// offering the type, slot existence) are the conflict guard's job.
pub fn validate_booking(request: &BookAppointmentRequest) -> Result<BookingSpec, AppointmentError> {
    let date = parse_date("date", &request.date)?;
    let start_time = parse_clock_time("start_time", &request.start_time)?;
    let end_time = parse_clock_time("end_time", &request.end_time)?;
    ensure_time_order(start_time, end_time)?;

    Ok(BookingSpec {
        doctor_id: request.doctor_id,
        date,
        start_time,
        end_time,
        consultation_type: parse_type(&request.consultation_type)?,
        reason: clean_reason("reason", &request.reason)?,
    })
}

pub fn validate_reschedule(request: &RescheduleAppointmentRequest) -> Result<RescheduleSpec, AppointmentError> {
    let date = parse_date("date", &request.date)?;
    let start_time = parse_clock_time("start_time", &request.start_time)?;
    let end_time = parse_clock_time("end_time", &request.end_time)?;
    ensure_time_order(start_time, end_time)?;

    Ok(RescheduleSpec {
        date,
        start_time,
        end_time,
        consultation_type: request.consultation_type.as_deref().map(parse_type).transpose()?,
    })
}

/// Optional cancellation reason; blank means "no reason given".
pub fn validate_cancel_reason(raw: Option<&str>) -> Result<Option<String>, AppointmentError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(reason) => clean_reason("reason", reason).map(Some),
    }
}

pub fn parse_decision(raw: &str) -> Result<AppointmentDecision, AppointmentError> {
    raw.trim().parse().map_err(AppointmentError::Validation)
}

pub fn parse_list_query(query: &AppointmentListQuery) -> Result<AppointmentListFilter, AppError> {
    let status = query
        .status
        .as_deref()
        .map(|raw| raw.parse::<AppointmentStatus>().map_err(AppError::ValidationError))
        .transpose()?;
    let from_date = query.from.as_deref().map(|raw| parse_date("from", raw)).transpose()?;
    let to_date = query.to.as_deref().map(|raw| parse_date("to", raw)).transpose()?;

    if let (Some(from), Some(to)) = (from_date, to_date) {
        if from > to {
            return Err(AppError::ValidationError("from must not be after to".to_string()));
        }
    }

    Ok(AppointmentListFilter {
        status,
        from_date,
        to_date,
        limit: query.limit,
    })
}
