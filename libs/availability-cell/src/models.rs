use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::scheduling::{ConsultationType, DbId};

// ==============================================================================
// CORE AVAILABILITY MODELS
// ==============================================================================

/// Recurring weekly window a doctor is bookable in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityPattern {
    pub id: DbId,
    pub doctor_id: Uuid,
    /// 0 = Sunday … 6 = Saturday.
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
    pub allowed_types: Vec<ConsultationType>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Date-specific exception: removes bookability (`is_available = false`) or
/// adds an extra window (`is_available = true`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityOverride {
    pub id: DbId,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
    pub allowed_types: Vec<ConsultationType>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One bookable window produced by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedSlot {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub allowed_types: Vec<ConsultationType>,
    pub override_id: Option<DbId>,
}

impl ResolvedSlot {
    pub fn allows(&self, consultation_type: ConsultationType) -> bool {
        self.allowed_types.contains(&consultation_type)
    }

    pub fn matches(&self, start_time: NaiveTime, end_time: NaiveTime) -> bool {
        self.start_time == start_time && self.end_time == end_time
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternInput {
    pub day_of_week: i16,
    pub start_time: String,
    pub end_time: String,
    pub slot_duration_minutes: i32,
    pub allowed_types: Vec<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacePatternsRequest {
    pub patterns: Vec<PatternInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOverrideRequest {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub is_available: bool,
    pub allowed_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOverrideRequest {
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub is_available: Option<bool>,
    pub allowed_types: Option<Vec<String>>,
}

/// A validated pattern, ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternSpec {
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_duration_minutes: i32,
    pub allowed_types: Vec<ConsultationType>,
    pub is_active: bool,
}

/// A validated override, ready to insert or write back.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideSpec {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
    pub allowed_types: Vec<ConsultationType>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Availability pattern not found")]
    PatternNotFound,

    #[error("Availability override not found")]
    OverrideNotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    App(#[from] AppError),
}

impl From<sqlx::Error> for AvailabilityError {
    fn from(err: sqlx::Error) -> Self {
        AvailabilityError::App(err.into())
    }
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::PatternNotFound | AvailabilityError::OverrideNotFound => {
                AppError::NotFound(err.to_string())
            }
            AvailabilityError::Validation(msg) => AppError::ValidationError(msg),
            AvailabilityError::App(inner) => inner,
        }
    }
}
