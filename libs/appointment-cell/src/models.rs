use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::scheduling::{AppointmentStatus, ConsultationType};
use waitlist_cell::models::WaitlistError;

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(rename = "type")]
    pub consultation_type: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    /// Keeps the current type when omitted.
    #[serde(rename = "type")]
    pub consultation_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusDecisionRequest {
    pub decision: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub status: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<i64>,
}

// ==============================================================================
// VALIDATED INPUTS
// ==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct BookingSpec {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub consultation_type: ConsultationType,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RescheduleSpec {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub consultation_type: Option<ConsultationType>,
}

// ==============================================================================
// LIFECYCLE
// ==============================================================================

/// What the doctor decides about one of their appointments.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AppointmentDecision {
    #[serde(rename = "confirm")]
    Confirm,
    #[serde(rename = "decline")]
    Decline,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "no-show", alias = "no_show")]
    NoShow,
}

impl FromStr for AppointmentDecision {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "confirm" => Ok(AppointmentDecision::Confirm),
            "decline" => Ok(AppointmentDecision::Decline),
            "complete" => Ok(AppointmentDecision::Complete),
            "no-show" | "no_show" => Ok(AppointmentDecision::NoShow),
            other => Err(format!(
                "decision must be one of confirm, decline, complete, no-show; got '{}'",
                other
            )),
        }
    }
}

/// Every way an appointment's status can be changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentAction {
    Confirm,
    Decline,
    Complete,
    NoShow,
    Cancel,
    Reschedule,
}

impl From<AppointmentDecision> for AppointmentAction {
    fn from(decision: AppointmentDecision) -> Self {
        match decision {
            AppointmentDecision::Confirm => AppointmentAction::Confirm,
            AppointmentDecision::Decline => AppointmentAction::Decline,
            AppointmentDecision::Complete => AppointmentAction::Complete,
            AppointmentDecision::NoShow => AppointmentAction::NoShow,
        }
    }
}

impl fmt::Display for AppointmentAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AppointmentAction::Confirm => "confirm",
            AppointmentAction::Decline => "decline",
            AppointmentAction::Complete => "complete",
            AppointmentAction::NoShow => "mark as no-show",
            AppointmentAction::Cancel => "cancel",
            AppointmentAction::Reschedule => "reschedule",
        };
        f.write_str(name)
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Doctor is not verified for bookings")]
    DoctorNotVerified,

    #[error("Doctor does not offer {0} consultations")]
    TypeNotOffered(ConsultationType),

    #[error("Slot no longer available")]
    SlotNotAvailable,

    #[error("Appointment conflicts with an existing booking")]
    ConflictDetected,

    #[error("Cannot {action} an appointment that is {status}")]
    InvalidStatusTransition {
        status: AppointmentStatus,
        action: AppointmentAction,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<sqlx::Error> for AppointmentError {
    fn from(err: sqlx::Error) -> Self {
        AppointmentError::App(err.into())
    }
}

impl From<WaitlistError> for AppointmentError {
    fn from(err: WaitlistError) -> Self {
        AppointmentError::App(err.into())
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound | AppointmentError::DoctorNotFound | AppointmentError::PatientNotFound => {
                AppError::NotFound(err.to_string())
            }
            AppointmentError::DoctorNotVerified | AppointmentError::TypeNotOffered(_) => {
                AppError::ValidationError(err.to_string())
            }
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::SlotNotAvailable | AppointmentError::ConflictDetected => {
                AppError::Conflict(err.to_string())
            }
            AppointmentError::InvalidStatusTransition { .. } => AppError::State(err.to_string()),
            AppointmentError::App(inner) => inner,
        }
    }
}
