// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::FreedSlotPolicy;
use shared_database::appointments::{AppointmentListFilter, AppointmentRepo, NewAppointment, RescheduleTarget};
use shared_database::identity::{self, DoctorRecord};
use shared_database::notifier::{dispatch, Notifier, OutboundMessage};
use shared_database::AppState;
use shared_models::auth::AccessScope;
use shared_models::error::AppError;
use shared_models::scheduling::{Appointment, DbId};
use waitlist_cell::handle_freed_slot;

use crate::models::{AppointmentAction, AppointmentDecision, AppointmentError, BookingSpec, RescheduleSpec};
use crate::services::conflict::{ConflictGuard, RequestedSlot};
use crate::services::lifecycle::AppointmentLifecycleService;

const PATIENT_CANCEL_REASON: &str = "Cancelled by patient";
const DOCTOR_DECLINE_REASON: &str = "Declined by doctor";

/// Every appointment write. Each operation runs in one transaction that locks
/// the doctor row first, then the appointment rows it touches; notifications
/// go out only after commit.
pub struct AppointmentBookingService {
    pool: PgPool,
    notifier: Arc<dyn Notifier>,
    freed_slot_policy: FreedSlotPolicy,
}

impl AppointmentBookingService {
    pub fn new(state: &AppState) -> Self {
        Self {
            pool: state.pool.clone(),
            notifier: Arc::clone(&state.notifier),
            freed_slot_policy: state.config.freed_slot_policy,
        }
    }

    /// Books a new appointment in `scheduled` status for the patient.
    pub async fn book_appointment(&self, patient_id: Uuid, spec: &BookingSpec) -> Result<Appointment, AppointmentError> {
        debug!(
            "Booking {} appointment for patient {} with doctor {} on {} {}-{}",
            spec.consultation_type, patient_id, spec.doctor_id, spec.date, spec.start_time, spec.end_time
        );

        let mut tx = self.pool.begin().await?;

        let doctor = lock_doctor(&mut *tx, spec.doctor_id).await?;
        if !doctor.is_verified() {
            warn!("Rejected booking with unverified doctor {}", doctor.id);
            return Err(AppointmentError::DoctorNotVerified);
        }
        if !identity::patient_exists(&mut *tx, patient_id).await? {
            return Err(AppointmentError::PatientNotFound);
        }

        let requested = RequestedSlot {
            date: spec.date,
            start_time: spec.start_time,
            end_time: spec.end_time,
            consultation_type: spec.consultation_type,
        };
        let slot = ConflictGuard::check_slot_available(&mut *tx, &doctor, &requested).await?;
        ConflictGuard::check_no_overlap(&mut *tx, doctor.id, &requested, None).await?;

        let appointment = AppointmentRepo::insert(
            &mut *tx,
            &NewAppointment {
                patient_id,
                doctor_id: doctor.id,
                override_id: slot.override_id,
                date: spec.date,
                start_time: spec.start_time,
                end_time: spec.end_time,
                consultation_type: spec.consultation_type,
                reason: spec.reason.clone(),
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            "Appointment {} booked for patient {} with doctor {} on {} {}-{}",
            appointment.id, patient_id, doctor.id, appointment.date, appointment.start_time, appointment.end_time
        );

        self.notify(vec![OutboundMessage::new(
            patient_id,
            doctor.id,
            Some(appointment.id),
            format!(
                "New {} appointment request for {} at {}.",
                appointment.consultation_type,
                appointment.date,
                window(&appointment)
            ),
        )])
        .await;

        Ok(appointment)
    }

    /// Moves the patient's appointment. Nothing changes unless the new window
    /// passes every check; the vacated window is then offered to the waitlist.
    pub async fn reschedule_appointment(
        &self,
        patient_id: Uuid,
        appointment_id: DbId,
        spec: &RescheduleSpec,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Rescheduling appointment {} for patient {}", appointment_id, patient_id);

        let mut tx = self.pool.begin().await?;
        let (doctor, current) = lock_appointment(&mut *tx, appointment_id).await?;
        if current.patient_id != patient_id {
            return Err(AppointmentError::NotFound);
        }
        AppointmentLifecycleService::validate_status_transition(current.status, AppointmentAction::Reschedule)?;

        let requested = RequestedSlot {
            date: spec.date,
            start_time: spec.start_time,
            end_time: spec.end_time,
            consultation_type: spec.consultation_type.unwrap_or(current.consultation_type),
        };
        let slot = ConflictGuard::check_slot_available(&mut *tx, &doctor, &requested).await?;
        ConflictGuard::check_no_overlap(&mut *tx, doctor.id, &requested, Some(current.id)).await?;

        let updated = AppointmentRepo::reschedule(
            &mut *tx,
            current.id,
            &RescheduleTarget {
                override_id: slot.override_id,
                date: requested.date,
                start_time: requested.start_time,
                end_time: requested.end_time,
                consultation_type: requested.consultation_type,
            },
        )
        .await?;

        let mut messages = self.release_slot(&mut *tx, &current).await?;
        tx.commit().await?;

        info!(
            "Appointment {} moved from {} {} to {} {}",
            updated.id,
            current.date,
            window(&current),
            updated.date,
            window(&updated)
        );

        messages.push(OutboundMessage::new(
            patient_id,
            doctor.id,
            Some(updated.id),
            format!(
                "Appointment #{} was moved to {} at {} and needs confirmation.",
                updated.id,
                updated.date,
                window(&updated)
            ),
        ));
        self.notify(messages).await;

        Ok(updated)
    }

    /// Patient cancellation. The freed window goes to the waitlist in the same
    /// transaction.
    pub async fn cancel_appointment(
        &self,
        patient_id: Uuid,
        appointment_id: DbId,
        reason: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment {} for patient {}", appointment_id, patient_id);

        let mut tx = self.pool.begin().await?;
        let (doctor, current) = lock_appointment(&mut *tx, appointment_id).await?;
        if current.patient_id != patient_id {
            return Err(AppointmentError::NotFound);
        }
        AppointmentLifecycleService::validate_status_transition(current.status, AppointmentAction::Cancel)?;

        let cancelled = AppointmentRepo::cancel(
            &mut *tx,
            current.id,
            patient_id,
            reason.unwrap_or(PATIENT_CANCEL_REASON),
        )
        .await?;

        let mut messages = self.release_slot(&mut *tx, &current).await?;
        tx.commit().await?;

        info!("Appointment {} cancelled by patient {}", cancelled.id, patient_id);

        messages.push(OutboundMessage::new(
            patient_id,
            doctor.id,
            Some(cancelled.id),
            format!(
                "The appointment on {} at {} was cancelled by the patient.",
                cancelled.date,
                window(&cancelled)
            ),
        ));
        self.notify(messages).await;

        Ok(cancelled)
    }

    /// Doctor confirm / decline / complete / no-show.
    pub async fn decide(
        &self,
        doctor_id: Uuid,
        appointment_id: DbId,
        decision: AppointmentDecision,
        reason: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Doctor {} applying {:?} to appointment {}", doctor_id, decision, appointment_id);

        let mut tx = self.pool.begin().await?;
        let (doctor, current) = lock_appointment(&mut *tx, appointment_id).await?;
        if current.doctor_id != doctor_id {
            return Err(AppointmentError::NotFound);
        }

        let action = AppointmentAction::from(decision);
        let next_status = AppointmentLifecycleService::validate_status_transition(current.status, action)?;

        let (updated, mut messages) = match decision {
            AppointmentDecision::Decline => {
                let declined = AppointmentRepo::cancel(
                    &mut *tx,
                    current.id,
                    doctor_id,
                    reason.unwrap_or(DOCTOR_DECLINE_REASON),
                )
                .await?;
                let freed = self.release_slot(&mut *tx, &current).await?;
                (declined, freed)
            }
            AppointmentDecision::Confirm | AppointmentDecision::Complete | AppointmentDecision::NoShow => {
                let updated = AppointmentRepo::set_status(&mut *tx, current.id, next_status).await?;
                (updated, Vec::new())
            }
        };

        tx.commit().await?;

        info!(
            "Appointment {} moved from {} to {} by doctor {}",
            updated.id, current.status, updated.status, doctor_id
        );

        messages.push(OutboundMessage::new(
            doctor_id,
            updated.patient_id,
            Some(updated.id),
            format!(
                "Your appointment with {} on {} at {} is now {}.",
                doctor.display_name(),
                updated.date,
                window(&updated),
                updated.status
            ),
        ));
        self.notify(messages).await;

        Ok(updated)
    }

    /// One appointment, visible only to its patient and its doctor.
    pub async fn get_appointment(&self, scope: &AccessScope, appointment_id: DbId) -> Result<Appointment, AppointmentError> {
        let appointment = AppointmentRepo::fetch(&self.pool, appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        let is_party = match scope {
            AccessScope::Patient(id) => appointment.patient_id == *id,
            AccessScope::Doctor(id) => appointment.doctor_id == *id,
        };
        if !is_party {
            return Err(AppointmentError::NotFound);
        }
        Ok(appointment)
    }

    pub async fn list_appointments(
        &self,
        scope: &AccessScope,
        filter: &AppointmentListFilter,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(AppointmentRepo::list_for_scope(&self.pool, scope, filter).await?)
    }

    /// Offers the window `previous` occupied to the waitlist, using the
    /// configured policy.
    async fn release_slot(
        &self,
        conn: &mut PgConnection,
        previous: &Appointment,
    ) -> Result<Vec<OutboundMessage>, AppointmentError> {
        Ok(handle_freed_slot(conn, self.freed_slot_policy, &previous.slot()).await?)
    }

    async fn notify(&self, messages: Vec<OutboundMessage>) {
        if messages.is_empty() {
            return;
        }
        dispatch(self.notifier.as_ref(), &messages).await;
    }
}

async fn lock_doctor(conn: &mut PgConnection, doctor_id: Uuid) -> Result<DoctorRecord, AppointmentError> {
    identity::lock_doctor(conn, doctor_id).await.map_err(|e| match e {
        AppError::NotFound(_) => AppointmentError::DoctorNotFound,
        other => other.into(),
    })
}

/// Locks the appointment's doctor, then the appointment itself. Same order as
/// a new booking, so writes on one doctor cannot deadlock each other.
async fn lock_appointment(
    conn: &mut PgConnection,
    appointment_id: DbId,
) -> Result<(DoctorRecord, Appointment), AppointmentError> {
    let doctor_id = AppointmentRepo::fetch(&mut *conn, appointment_id)
        .await?
        .ok_or(AppointmentError::NotFound)?
        .doctor_id;

    let doctor = lock_doctor(&mut *conn, doctor_id).await?;
    let appointment = AppointmentRepo::lock(&mut *conn, appointment_id)
        .await?
        .ok_or(AppointmentError::NotFound)?;

    Ok((doctor, appointment))
}

fn window(appointment: &Appointment) -> String {
    format!(
        "{}-{}",
        appointment.start_time.format("%H:%M"),
        appointment.end_time.format("%H:%M")
    )
}
