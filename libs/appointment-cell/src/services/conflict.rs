// libs/appointment-cell/src/services/conflict.rs
use chrono::{NaiveDate, NaiveTime};
use sqlx::PgConnection;
use tracing::{debug, warn};
use uuid::Uuid;

use availability_cell::models::ResolvedSlot;
use availability_cell::services::SlotResolverService;
use shared_database::appointments::AppointmentRepo;
use shared_database::identity::DoctorRecord;
use shared_models::scheduling::{ConsultationType, DbId};
use shared_utils::time::ensure_not_past;

use crate::models::AppointmentError;

/// A window somebody wants to occupy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestedSlot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub consultation_type: ConsultationType,
}

/// The checks every booking write runs inside its transaction, after the
/// doctor row is locked.
pub struct ConflictGuard;

impl ConflictGuard {
    /// The requested window must be one the doctor's schedule produces for
    /// that date, and allow the requested type. Returns the matching slot so
    /// the caller can record which override provided it.
    pub async fn check_slot_available(
        conn: &mut PgConnection,
        doctor: &DoctorRecord,
        requested: &RequestedSlot,
    ) -> Result<ResolvedSlot, AppointmentError> {
        debug!(
            "Checking that {} {}-{} ({}) is bookable with doctor {}",
            requested.date, requested.start_time, requested.end_time, requested.consultation_type, doctor.id
        );

        ensure_not_past(requested.date)?;

        if !doctor.offers(requested.consultation_type) {
            return Err(AppointmentError::TypeNotOffered(requested.consultation_type));
        }

        let slots = SlotResolverService::resolve(
            conn,
            doctor.id,
            requested.date,
            Some(requested.consultation_type),
        )
        .await?;

        match find_matching_slot(&slots, requested) {
            Some(slot) => Ok(slot.clone()),
            None => {
                warn!(
                    "No {} slot {}-{} on {} for doctor {}",
                    requested.consultation_type, requested.start_time, requested.end_time, requested.date, doctor.id
                );
                Err(AppointmentError::SlotNotAvailable)
            }
        }
    }

    /// Locks every occupying appointment that intersects the window and fails
    /// if there is any. `exclude` is the appointment being moved.
    pub async fn check_no_overlap(
        conn: &mut PgConnection,
        doctor_id: Uuid,
        requested: &RequestedSlot,
        exclude: Option<DbId>,
    ) -> Result<(), AppointmentError> {
        let overlapping = AppointmentRepo::lock_occupying_overlaps(
            conn,
            doctor_id,
            requested.date,
            requested.start_time,
            requested.end_time,
            exclude,
        )
        .await?;

        if let Some(existing) = overlapping.first() {
            warn!(
                "Conflict detected for doctor {} on {}: appointment {} holds {}-{}",
                doctor_id, requested.date, existing.id, existing.start_time, existing.end_time
            );
            return Err(AppointmentError::ConflictDetected);
        }
        Ok(())
    }
}

/// Exact (start, end) match that allows the requested type.
pub fn find_matching_slot<'a>(slots: &'a [ResolvedSlot], requested: &RequestedSlot) -> Option<&'a ResolvedSlot> {
    slots
        .iter()
        .find(|slot| slot.matches(requested.start_time, requested.end_time) && slot.allows(requested.consultation_type))
}
