//! SQL for the `waitlist_entries` table.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use shared_models::auth::AccessScope;
use shared_models::error::AppError;
use shared_models::scheduling::{DbId, SlotTuple};

use crate::models::{WaitlistEntry, WaitlistSpec, WaitlistStatus};

const COLUMNS: &str = "\
    id, patient_id, doctor_id, desired_date, desired_start_time, desired_end_time, \
    appointment_type, notification_preference, status, last_notified_at, \
    booked_appointment_id, created_at, updated_at";

/// Exact-tuple match on active entries, shared by the queue queries.
const ACTIVE_FOR_TUPLE: &str = "\
    doctor_id = $1 AND desired_date = $2 AND desired_start_time = $3 \
    AND desired_end_time = $4 AND appointment_type = $5 AND status = 'active'";

#[derive(Debug, sqlx::FromRow)]
struct WaitlistRow {
    id: DbId,
    patient_id: Uuid,
    doctor_id: Uuid,
    desired_date: NaiveDate,
    desired_start_time: NaiveTime,
    desired_end_time: NaiveTime,
    appointment_type: String,
    notification_preference: String,
    status: String,
    last_notified_at: Option<DateTime<Utc>>,
    booked_appointment_id: Option<DbId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WaitlistRow> for WaitlistEntry {
    type Error = AppError;

    fn try_from(row: WaitlistRow) -> Result<Self, Self::Error> {
        Ok(WaitlistEntry {
            id: row.id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            desired_date: row.desired_date,
            desired_start_time: row.desired_start_time,
            desired_end_time: row.desired_end_time,
            consultation_type: row.appointment_type.parse().map_err(AppError::Database)?,
            notification_preference: row.notification_preference.parse().map_err(AppError::Database)?,
            status: row.status.parse().map_err(AppError::Database)?,
            last_notified_at: row.last_notified_at,
            booked_appointment_id: row.booked_appointment_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_entries(rows: Vec<WaitlistRow>) -> Result<Vec<WaitlistEntry>, AppError> {
    rows.into_iter().map(WaitlistEntry::try_from).collect()
}

pub struct WaitlistStore;

impl WaitlistStore {
    pub async fn insert<'e, E>(executor: E, patient_id: Uuid, spec: &WaitlistSpec) -> Result<WaitlistEntry, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "INSERT INTO waitlist_entries \
                (patient_id, doctor_id, desired_date, desired_start_time, desired_end_time, \
                 appointment_type, notification_preference) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WaitlistRow>(&query)
            .bind(patient_id)
            .bind(spec.slot.doctor_id)
            .bind(spec.slot.date)
            .bind(spec.slot.start_time)
            .bind(spec.slot.end_time)
            .bind(spec.slot.consultation_type.as_str())
            .bind(spec.notification_preference.as_str())
            .fetch_one(executor)
            .await?
            .try_into()
    }

    pub async fn lock<'e, E>(executor: E, id: DbId) -> Result<Option<WaitlistEntry>, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM waitlist_entries WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, WaitlistRow>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?
            .map(WaitlistEntry::try_from)
            .transpose()
    }

    /// Head of the queue for `slot`: the oldest active entry, ties broken by id.
    ///
    /// Rows locked by a concurrent engine run are skipped, so two runs for the
    /// same tuple never pick the same entry.
    pub async fn lock_next_active<'e, E>(executor: E, slot: &SlotTuple) -> Result<Option<WaitlistEntry>, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM waitlist_entries WHERE {ACTIVE_FOR_TUPLE} \
             ORDER BY created_at, id \
             LIMIT 1 \
             FOR UPDATE SKIP LOCKED"
        );
        sqlx::query_as::<_, WaitlistRow>(&query)
            .bind(slot.doctor_id)
            .bind(slot.date)
            .bind(slot.start_time)
            .bind(slot.end_time)
            .bind(slot.consultation_type.as_str())
            .fetch_optional(executor)
            .await?
            .map(WaitlistEntry::try_from)
            .transpose()
    }

    /// Every active entry for `slot` in queue order, skipping locked rows.
    pub async fn lock_all_active<'e, E>(executor: E, slot: &SlotTuple) -> Result<Vec<WaitlistEntry>, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM waitlist_entries WHERE {ACTIVE_FOR_TUPLE} \
             ORDER BY created_at, id \
             FOR UPDATE SKIP LOCKED"
        );
        let rows = sqlx::query_as::<_, WaitlistRow>(&query)
            .bind(slot.doctor_id)
            .bind(slot.date)
            .bind(slot.start_time)
            .bind(slot.end_time)
            .bind(slot.consultation_type.as_str())
            .fetch_all(executor)
            .await?;
        into_entries(rows)
    }

    pub async fn mark_booked<'e, E>(executor: E, id: DbId, appointment_id: DbId) -> Result<WaitlistEntry, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE waitlist_entries \
             SET status = $2, booked_appointment_id = $3, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WaitlistRow>(&query)
            .bind(id)
            .bind(WaitlistStatus::Booked.as_str())
            .bind(appointment_id)
            .fetch_one(executor)
            .await?
            .try_into()
    }

    pub async fn mark_notified<'e, E>(executor: E, id: DbId) -> Result<WaitlistEntry, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE waitlist_entries \
             SET status = $2, last_notified_at = NOW(), updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WaitlistRow>(&query)
            .bind(id)
            .bind(WaitlistStatus::Notified.as_str())
            .fetch_one(executor)
            .await?
            .try_into()
    }

    pub async fn mark_removed<'e, E>(executor: E, id: DbId) -> Result<WaitlistEntry, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE waitlist_entries SET status = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WaitlistRow>(&query)
            .bind(id)
            .bind(WaitlistStatus::Removed.as_str())
            .fetch_one(executor)
            .await?
            .try_into()
    }

    /// Patients see their own entries, doctors the entries queued on them.
    pub async fn list_for_scope<'e, E>(
        executor: E,
        scope: &AccessScope,
        status: Option<WaitlistStatus>,
    ) -> Result<Vec<WaitlistEntry>, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM waitlist_entries \
             WHERE {owner} = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY desired_date, desired_start_time, created_at, id",
            owner = scope.owner_column()
        );
        let rows = sqlx::query_as::<_, WaitlistRow>(&query)
            .bind(scope.user_id())
            .bind(status.map(|s| s.as_str()))
            .fetch_all(executor)
            .await?;
        into_entries(rows)
    }

    /// The available override that provides exactly this window, if any.
    pub async fn matching_override_id<'e, E>(executor: E, slot: &SlotTuple) -> Result<Option<DbId>, AppError>
    where
        E: PgExecutor<'e>,
    {
        let id = sqlx::query_scalar::<_, DbId>(
            "SELECT id FROM availability_overrides \
             WHERE doctor_id = $1 AND override_date = $2 \
               AND start_time = $3 AND end_time = $4 AND is_available \
             ORDER BY id LIMIT 1",
        )
        .bind(slot.doctor_id)
        .bind(slot.date)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .fetch_optional(executor)
        .await?;
        Ok(id)
    }
}
