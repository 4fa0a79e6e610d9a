use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::notifier::OutboundMessage;
use shared_models::error::AppError;
use shared_models::scheduling::{Appointment, ConsultationType, DbId, SlotTuple};

// ==============================================================================
// WAITLIST ENUMS
// ==============================================================================

/// Entry lifecycle. Only `Active` ever moves, and only forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WaitlistStatus {
    Active,
    Notified,
    Booked,
    Removed,
}

impl WaitlistStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitlistStatus::Active => "active",
            WaitlistStatus::Notified => "notified",
            WaitlistStatus::Booked => "booked",
            WaitlistStatus::Removed => "removed",
        }
    }
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaitlistStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(WaitlistStatus::Active),
            "notified" => Ok(WaitlistStatus::Notified),
            "booked" => Ok(WaitlistStatus::Booked),
            "removed" => Ok(WaitlistStatus::Removed),
            other => Err(format!("Unknown waitlist status '{}'", other)),
        }
    }
}

/// How the patient wants to hear about an opening. Stored only; the
/// notification sink decides the channel.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationPreference {
    #[default]
    #[serde(rename = "in-app", alias = "in_app")]
    InApp,
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "sms")]
    Sms,
}

impl NotificationPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationPreference::InApp => "in-app",
            NotificationPreference::Email => "email",
            NotificationPreference::Sms => "sms",
        }
    }
}

impl FromStr for NotificationPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "in-app" | "in_app" => Ok(NotificationPreference::InApp),
            "email" => Ok(NotificationPreference::Email),
            "sms" => Ok(NotificationPreference::Sms),
            other => Err(format!(
                "notification_preference must be 'in-app', 'email' or 'sms', got '{}'",
                other
            )),
        }
    }
}

// ==============================================================================
// CORE WAITLIST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaitlistEntry {
    pub id: DbId,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub desired_date: NaiveDate,
    pub desired_start_time: NaiveTime,
    pub desired_end_time: NaiveTime,
    #[serde(rename = "type")]
    pub consultation_type: ConsultationType,
    pub notification_preference: NotificationPreference,
    pub status: WaitlistStatus,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub booked_appointment_id: Option<DbId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WaitlistEntry {
    pub fn slot(&self) -> SlotTuple {
        SlotTuple {
            doctor_id: self.doctor_id,
            date: self.desired_date,
            start_time: self.desired_start_time,
            end_time: self.desired_end_time,
            consultation_type: self.consultation_type,
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinWaitlistRequest {
    pub doctor_id: Uuid,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(rename = "type")]
    pub consultation_type: String,
    pub notification_preference: Option<String>,
}

/// A validated join request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaitlistSpec {
    pub slot: SlotTuple,
    pub notification_preference: NotificationPreference,
}

// ==============================================================================
// ENGINE OUTCOMES
// ==============================================================================

/// Result of offering a freed slot to the head of its queue.
#[derive(Debug, Clone, PartialEq)]
pub enum FulfillmentOutcome {
    /// The oldest active entry now holds a new appointment.
    Booked {
        entry_id: DbId,
        appointment: Appointment,
        message: OutboundMessage,
    },
    /// Someone took the window first; nothing was written.
    SlotStillOccupied { entry_id: DbId },
    /// Nobody is waiting for this exact tuple.
    NoCandidate,
}

impl FulfillmentOutcome {
    pub fn into_messages(self) -> Vec<OutboundMessage> {
        match self {
            FulfillmentOutcome::Booked { message, .. } => vec![message],
            FulfillmentOutcome::SlotStillOccupied { .. } | FulfillmentOutcome::NoCandidate => Vec::new(),
        }
    }
}

/// Result of telling every waiting patient that a slot opened.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastOutcome {
    pub notified_entry_ids: Vec<DbId>,
    pub messages: Vec<OutboundMessage>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WaitlistError {
    #[error("Waitlist entry not found")]
    EntryNotFound,

    #[error("The slot is open, book it directly")]
    SlotOpen,

    #[error("No appointment holds this exact slot and type")]
    NotAHeldSlot,

    #[error("You already hold this slot")]
    AlreadyHolder,

    #[error("You are already on the waitlist for this slot")]
    AlreadyWaitlisted,

    #[error("Waitlist entry is {0}, only active entries can change")]
    NotActive(WaitlistStatus),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<sqlx::Error> for WaitlistError {
    fn from(err: sqlx::Error) -> Self {
        WaitlistError::App(err.into())
    }
}

impl From<WaitlistError> for AppError {
    fn from(err: WaitlistError) -> Self {
        match err {
            WaitlistError::EntryNotFound => AppError::NotFound(err.to_string()),
            WaitlistError::SlotOpen | WaitlistError::AlreadyHolder | WaitlistError::AlreadyWaitlisted => {
                AppError::Conflict(err.to_string())
            }
            WaitlistError::NotActive(_) => AppError::State(err.to_string()),
            WaitlistError::NotAHeldSlot => AppError::ValidationError(err.to_string()),
            WaitlistError::Validation(msg) => AppError::ValidationError(msg),
            WaitlistError::App(inner) => inner,
        }
    }
}
