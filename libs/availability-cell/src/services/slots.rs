use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use shared_database::appointments::AppointmentRepo;
use shared_database::identity::{self, DoctorRecord};
use shared_models::error::AppError;
use shared_models::scheduling::{ranges_overlap, Appointment, ConsultationType};
use shared_utils::time::ensure_not_past;

use crate::models::ResolvedSlot;
use crate::services::resolver::SlotResolverService;

/// Read-only view of what a patient could book right now.
pub struct OpenSlotService;

impl OpenSlotService {
    /// Resolved slots for `date` that no occupying appointment intersects,
    /// restricted to the consultation types the doctor currently offers.
    ///
    /// Nothing is locked; the booking transaction re-checks everything.
    pub async fn open_slots(
        pool: &PgPool,
        doctor_id: Uuid,
        date: NaiveDate,
        type_filter: Option<ConsultationType>,
    ) -> Result<Vec<ResolvedSlot>, AppError> {
        debug!("Listing open slots for doctor {} on {}", doctor_id, date);

        ensure_not_past(date)?;

        let doctor = identity::fetch_doctor(pool, doctor_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Doctor not found".to_string()))?;

        let mut conn = pool.acquire().await?;
        let resolved = SlotResolverService::resolve(&mut conn, doctor_id, date, type_filter).await?;
        let occupied = AppointmentRepo::occupying_on_date(&mut *conn, doctor_id, date).await?;

        Ok(filter_open(resolved, &occupied, &doctor))
    }
}

fn filter_open(resolved: Vec<ResolvedSlot>, occupied: &[Appointment], doctor: &DoctorRecord) -> Vec<ResolvedSlot> {
    resolved
        .into_iter()
        .filter(|slot| {
            !occupied
                .iter()
                .any(|a| ranges_overlap(slot.start_time, slot.end_time, a.start_time, a.end_time))
        })
        .filter_map(|mut slot| {
            slot.allowed_types.retain(|t| doctor.offers(*t));
            (!slot.allowed_types.is_empty()).then_some(slot)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc};
    use shared_models::scheduling::AppointmentStatus;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn slot(start: NaiveTime, end: NaiveTime) -> ResolvedSlot {
        ResolvedSlot {
            start_time: start,
            end_time: end,
            allowed_types: ConsultationType::ALL.to_vec(),
            override_id: None,
        }
    }

    fn doctor(virtual_available: bool, in_person_available: bool) -> DoctorRecord {
        DoctorRecord {
            id: Uuid::new_v4(),
            full_name: Some("Dr. Ada".to_string()),
            virtual_available,
            in_person_available,
            verification_status: "verified".to_string(),
        }
    }

    fn booked(start: NaiveTime, end: NaiveTime) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: 1,
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            override_id: None,
            date: now.date_naive(),
            start_time: start,
            end_time: end,
            consultation_type: ConsultationType::Virtual,
            status: AppointmentStatus::Confirmed,
            duration_minutes: 30,
            reason: "checkup".to_string(),
            cancelled_at: None,
            cancelled_by: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn occupied_windows_are_hidden() {
        let open = filter_open(
            vec![slot(t(9, 0), t(9, 30)), slot(t(9, 30), t(10, 0))],
            &[booked(t(9, 15), t(9, 45))],
            &doctor(true, true),
        );
        assert!(open.is_empty());

        let open = filter_open(
            vec![slot(t(9, 0), t(9, 30)), slot(t(9, 30), t(10, 0))],
            &[booked(t(9, 0), t(9, 30))],
            &doctor(true, true),
        );
        assert_eq!(open, vec![slot(t(9, 30), t(10, 0))]);
    }

    #[test]
    fn disabled_types_are_removed_and_empty_slots_dropped() {
        let mut virtual_only = slot(t(11, 0), t(11, 30));
        virtual_only.allowed_types = vec![ConsultationType::Virtual];

        let open = filter_open(
            vec![slot(t(9, 0), t(9, 30)), virtual_only],
            &[],
            &doctor(false, true),
        );
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].allowed_types, vec![ConsultationType::InPerson]);
    }
}
