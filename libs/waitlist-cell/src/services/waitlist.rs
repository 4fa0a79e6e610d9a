use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::appointments::AppointmentRepo;
use shared_database::identity;
use shared_models::auth::AccessScope;
use shared_models::error::AppError;
use shared_models::scheduling::{ConsultationType, DbId, SlotTuple};
use shared_utils::time::{ensure_not_past, ensure_time_order, parse_clock_time, parse_date};

use crate::models::{
    JoinWaitlistRequest, NotificationPreference, WaitlistEntry, WaitlistError, WaitlistSpec, WaitlistStatus,
};
use crate::services::store::WaitlistStore;

pub struct WaitlistService;

impl WaitlistService {
    /// Queues the patient on an occupied slot.
    ///
    /// Open slots are rejected: the patient should book them directly.
    pub async fn join(pool: &PgPool, patient_id: Uuid, spec: &WaitlistSpec) -> Result<WaitlistEntry, WaitlistError> {
        let slot = spec.slot;
        debug!(
            "Patient {} joining waitlist for doctor {} on {} {}-{}",
            patient_id, slot.doctor_id, slot.date, slot.start_time, slot.end_time
        );

        let mut tx = pool.begin().await?;

        // Doctor row first, then appointment rows: the same order as every booking write.
        identity::lock_doctor(&mut *tx, slot.doctor_id).await?;
        if !identity::patient_exists(&mut *tx, patient_id).await? {
            return Err(AppError::NotFound("Patient not found".to_string()).into());
        }

        let overlapping = AppointmentRepo::lock_occupying_overlaps(
            &mut *tx,
            slot.doctor_id,
            slot.date,
            slot.start_time,
            slot.end_time,
            None,
        )
        .await?;

        if overlapping.is_empty() {
            warn!("Rejected waitlist join for open slot of doctor {}", slot.doctor_id);
            return Err(WaitlistError::SlotOpen);
        }

        // Only an exact tuple is ever handed to the fulfillment engine.
        let Some(holder) = overlapping.iter().find(|a| a.slot() == slot) else {
            warn!(
                "Rejected waitlist join for doctor {}: no appointment holds {} {}-{} ({})",
                slot.doctor_id, slot.date, slot.start_time, slot.end_time, slot.consultation_type
            );
            return Err(WaitlistError::NotAHeldSlot);
        };
        if holder.patient_id == patient_id {
            return Err(WaitlistError::AlreadyHolder);
        }

        let entry = WaitlistStore::insert(&mut *tx, patient_id, spec)
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => WaitlistError::AlreadyWaitlisted,
                other => other.into(),
            })?;

        tx.commit().await?;

        info!("Patient {} joined waitlist as entry {}", patient_id, entry.id);
        Ok(entry)
    }

    pub async fn list(
        pool: &PgPool,
        scope: &AccessScope,
        status: Option<WaitlistStatus>,
    ) -> Result<Vec<WaitlistEntry>, WaitlistError> {
        Ok(WaitlistStore::list_for_scope(pool, scope, status).await?)
    }

    /// Removes the patient's own active entry. Entries of other patients are
    /// reported as missing.
    pub async fn leave(pool: &PgPool, patient_id: Uuid, entry_id: DbId) -> Result<WaitlistEntry, WaitlistError> {
        let mut tx = pool.begin().await?;

        let entry = WaitlistStore::lock(&mut *tx, entry_id)
            .await?
            .filter(|entry| entry.patient_id == patient_id)
            .ok_or(WaitlistError::EntryNotFound)?;

        if entry.status != WaitlistStatus::Active {
            return Err(WaitlistError::NotActive(entry.status));
        }

        let removed = WaitlistStore::mark_removed(&mut *tx, entry.id).await?;
        tx.commit().await?;

        info!("Patient {} left waitlist entry {}", patient_id, entry_id);
        Ok(removed)
    }
}

pub fn validate_join_request(request: &JoinWaitlistRequest) -> Result<WaitlistSpec, WaitlistError> {
    let date = parse_date("date", &request.date)?;
    ensure_not_past(date)?;
    let start_time = parse_clock_time("start_time", &request.start_time)?;
    let end_time = parse_clock_time("end_time", &request.end_time)?;
    ensure_time_order(start_time, end_time)?;

    let consultation_type = request
        .consultation_type
        .parse::<ConsultationType>()
        .map_err(WaitlistError::Validation)?;
    let notification_preference = request
        .notification_preference
        .as_deref()
        .map(str::parse::<NotificationPreference>)
        .transpose()
        .map_err(WaitlistError::Validation)?
        .unwrap_or_default();

    Ok(WaitlistSpec {
        slot: SlotTuple {
            doctor_id: request.doctor_id,
            date,
            start_time,
            end_time,
            consultation_type,
        },
        notification_preference,
    })
}

pub fn parse_status_filter(raw: Option<&str>) -> Result<Option<WaitlistStatus>, WaitlistError> {
    raw.map(|value| value.parse::<WaitlistStatus>().map_err(WaitlistError::Validation))
        .transpose()
}
