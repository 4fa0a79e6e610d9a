use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Primary key type of the scheduling tables.
pub type DbId = i64;

// ==============================================================================
// CONSULTATION TYPE
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConsultationType {
    #[serde(rename = "virtual")]
    Virtual,
    #[serde(rename = "in-person", alias = "in_person")]
    InPerson,
}

impl ConsultationType {
    pub const ALL: [ConsultationType; 2] = [ConsultationType::Virtual, ConsultationType::InPerson];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationType::Virtual => "virtual",
            ConsultationType::InPerson => "in-person",
        }
    }
}

impl fmt::Display for ConsultationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsultationType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "virtual" => Ok(ConsultationType::Virtual),
            "in-person" | "in_person" => Ok(ConsultationType::InPerson),
            other => Err(format!("Type must be 'virtual' or 'in-person', got '{}'", other)),
        }
    }
}

/// Parses a stored `TEXT[]` column into a sorted, deduplicated type set.
pub fn parse_type_set(raw: &[String]) -> Result<Vec<ConsultationType>, String> {
    let mut types = raw
        .iter()
        .map(|value| value.parse::<ConsultationType>())
        .collect::<Result<Vec<_>, _>>()?;
    types.sort();
    types.dedup();
    Ok(types)
}

pub fn type_set_to_strings(types: &[ConsultationType]) -> Vec<String> {
    types.iter().map(|t| t.as_str().to_string()).collect()
}

// ==============================================================================
// APPOINTMENT STATUS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AppointmentStatus {
    #[serde(rename = "scheduled")]
    Scheduled,
    #[serde(rename = "confirmed")]
    Confirmed,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "no-show", alias = "no_show")]
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no-show",
        }
    }

    /// Whether the appointment holds its time range against new bookings.
    /// `completed` and `no-show` keep occupying the slot indefinitely.
    pub fn occupies_slot(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    /// Storage names of every slot-occupying status, for `status = ANY($n)`.
    pub fn occupying() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|status| status.occupies_slot())
            .map(|status| status.as_str())
            .collect()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "no-show" | "no_show" => Ok(AppointmentStatus::NoShow),
            other => Err(format!("Unknown appointment status '{}'", other)),
        }
    }
}

// ==============================================================================
// APPOINTMENT
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: DbId,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub override_id: Option<DbId>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(rename = "type")]
    pub consultation_type: ConsultationType,
    pub status: AppointmentStatus,
    pub duration_minutes: i32,
    pub reason: String,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn slot(&self) -> SlotTuple {
        SlotTuple {
            doctor_id: self.doctor_id,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            consultation_type: self.consultation_type,
        }
    }
}

/// A (doctor, date, start, end, type) window, the unit a waitlist queues on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SlotTuple {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(rename = "type")]
    pub consultation_type: ConsultationType,
}

/// Half-open interval intersection: `[a_start, a_end)` against `[b_start, b_end)`.
pub fn ranges_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && a_end > b_start
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn consultation_type_wire_names() {
        assert_eq!(serde_json::to_string(&ConsultationType::InPerson).unwrap(), "\"in-person\"");
        assert_eq!("virtual".parse::<ConsultationType>(), Ok(ConsultationType::Virtual));
        assert!("phone".parse::<ConsultationType>().is_err());
    }

    #[test]
    fn cancelled_is_the_only_status_that_frees_the_slot() {
        assert!(AppointmentStatus::NoShow.occupies_slot());
        assert!(AppointmentStatus::Completed.occupies_slot());
        assert!(!AppointmentStatus::Cancelled.occupies_slot());
        assert_eq!(
            AppointmentStatus::occupying(),
            vec!["scheduled", "confirmed", "completed", "no-show"]
        );
    }

    #[test]
    fn adjacent_ranges_do_not_overlap() {
        assert!(!ranges_overlap(t(9, 0), t(9, 30), t(9, 30), t(10, 0)));
        assert!(ranges_overlap(t(9, 0), t(9, 31), t(9, 30), t(10, 0)));
        assert!(ranges_overlap(t(9, 0), t(12, 0), t(10, 0), t(10, 30)));
    }

    #[test]
    fn type_sets_are_sorted_and_deduplicated() {
        let raw = vec!["in-person".to_string(), "virtual".to_string(), "in-person".to_string()];
        assert_eq!(
            parse_type_set(&raw).unwrap(),
            vec![ConsultationType::Virtual, ConsultationType::InPerson]
        );
    }
}
