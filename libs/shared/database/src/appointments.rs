//! SQL for the `appointments` table.
//!
//! Both the booking flow and the waitlist engine write appointments, so the
//! row mapping and the occupancy queries live here once.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use shared_models::auth::AccessScope;
use shared_models::error::AppError;
use shared_models::scheduling::{Appointment, AppointmentStatus, ConsultationType, DbId};

/// Column list for `appointments` queries.
const COLUMNS: &str = "\
    id, patient_id, doctor_id, override_id, appointment_date, start_time, end_time, \
    appointment_type, status, duration_minutes, reason, \
    cancelled_at, cancelled_by, cancellation_reason, created_at, updated_at";

/// Maximum page size for appointment listings.
const MAX_LIMIT: i64 = 200;

#[derive(Debug, sqlx::FromRow)]
struct AppointmentRow {
    id: DbId,
    patient_id: Uuid,
    doctor_id: Uuid,
    override_id: Option<DbId>,
    appointment_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    appointment_type: String,
    status: String,
    duration_minutes: i32,
    reason: String,
    cancelled_at: Option<DateTime<Utc>>,
    cancelled_by: Option<Uuid>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = AppError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Appointment {
            id: row.id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            override_id: row.override_id,
            date: row.appointment_date,
            start_time: row.start_time,
            end_time: row.end_time,
            consultation_type: row.appointment_type.parse().map_err(AppError::Database)?,
            status: row.status.parse().map_err(AppError::Database)?,
            duration_minutes: row.duration_minutes,
            reason: row.reason,
            cancelled_at: row.cancelled_at,
            cancelled_by: row.cancelled_by,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_appointments(rows: Vec<AppointmentRow>) -> Result<Vec<Appointment>, AppError> {
    rows.into_iter().map(Appointment::try_from).collect()
}

/// Fields of a freshly booked appointment; status is always `scheduled`.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub override_id: Option<DbId>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub consultation_type: ConsultationType,
    pub reason: String,
}

/// Where an appointment is being moved to.
#[derive(Debug, Clone)]
pub struct RescheduleTarget {
    pub override_id: Option<DbId>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub consultation_type: ConsultationType,
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentListFilter {
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

pub struct AppointmentRepo;

impl AppointmentRepo {
    pub async fn insert<'e, E>(executor: E, new: &NewAppointment) -> Result<Appointment, AppError>
    where
        E: PgExecutor<'e>,
    {
        let duration = (new.end_time - new.start_time).num_minutes() as i32;
        let query = format!(
            "INSERT INTO appointments \
                (patient_id, doctor_id, override_id, appointment_date, start_time, end_time, \
                 appointment_type, status, duration_minutes, reason) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&query)
            .bind(new.patient_id)
            .bind(new.doctor_id)
            .bind(new.override_id)
            .bind(new.date)
            .bind(new.start_time)
            .bind(new.end_time)
            .bind(new.consultation_type.as_str())
            .bind(AppointmentStatus::Scheduled.as_str())
            .bind(duration)
            .bind(&new.reason)
            .fetch_one(executor)
            .await?;
        row.try_into()
    }

    pub async fn fetch<'e, E>(executor: E, id: DbId) -> Result<Option<Appointment>, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM appointments WHERE id = $1");
        sqlx::query_as::<_, AppointmentRow>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?
            .map(Appointment::try_from)
            .transpose()
    }

    /// Same as [`fetch`](Self::fetch) but holds a row lock until the transaction ends.
    pub async fn lock<'e, E>(executor: E, id: DbId) -> Result<Option<Appointment>, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!("SELECT {COLUMNS} FROM appointments WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, AppointmentRow>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?
            .map(Appointment::try_from)
            .transpose()
    }

    /// Locks every slot-occupying appointment of the doctor that intersects
    /// `[start, end)` on `date`, skipping `exclude` (the appointment being moved).
    pub async fn lock_occupying_overlaps<'e, E>(
        executor: E,
        doctor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
        exclude: Option<DbId>,
    ) -> Result<Vec<Appointment>, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM appointments \
             WHERE doctor_id = $1 AND appointment_date = $2 \
               AND status = ANY($3) \
               AND start_time < $5 AND end_time > $4 \
               AND ($6::BIGINT IS NULL OR id <> $6) \
             ORDER BY start_time, id \
             FOR UPDATE"
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&query)
            .bind(doctor_id)
            .bind(date)
            .bind(AppointmentStatus::occupying())
            .bind(start_time)
            .bind(end_time)
            .bind(exclude)
            .fetch_all(executor)
            .await?;
        into_appointments(rows)
    }

    /// Slot-occupying appointments of a doctor on one date, without locking.
    pub async fn occupying_on_date<'e, E>(
        executor: E,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM appointments \
             WHERE doctor_id = $1 AND appointment_date = $2 AND status = ANY($3) \
             ORDER BY start_time, id"
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&query)
            .bind(doctor_id)
            .bind(date)
            .bind(AppointmentStatus::occupying())
            .fetch_all(executor)
            .await?;
        into_appointments(rows)
    }

    pub async fn set_status<'e, E>(
        executor: E,
        id: DbId,
        status: AppointmentStatus,
    ) -> Result<Appointment, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE appointments SET status = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AppointmentRow>(&query)
            .bind(id)
            .bind(status.as_str())
            .fetch_one(executor)
            .await?
            .try_into()
    }

    pub async fn cancel<'e, E>(
        executor: E,
        id: DbId,
        cancelled_by: Uuid,
        reason: &str,
    ) -> Result<Appointment, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "UPDATE appointments \
             SET status = $2, cancelled_at = NOW(), cancelled_by = $3, \
                 cancellation_reason = $4, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AppointmentRow>(&query)
            .bind(id)
            .bind(AppointmentStatus::Cancelled.as_str())
            .bind(cancelled_by)
            .bind(reason)
            .fetch_one(executor)
            .await?
            .try_into()
    }

    /// Moves an appointment and puts it back to `scheduled` with no
    /// cancellation metadata, so the doctor has to confirm it again.
    pub async fn reschedule<'e, E>(
        executor: E,
        id: DbId,
        target: &RescheduleTarget,
    ) -> Result<Appointment, AppError>
    where
        E: PgExecutor<'e>,
    {
        let duration = (target.end_time - target.start_time).num_minutes() as i32;
        let query = format!(
            "UPDATE appointments \
             SET override_id = $2, appointment_date = $3, start_time = $4, end_time = $5, \
                 appointment_type = $6, duration_minutes = $7, status = $8, \
                 cancelled_at = NULL, cancelled_by = NULL, cancellation_reason = NULL, \
                 updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AppointmentRow>(&query)
            .bind(id)
            .bind(target.override_id)
            .bind(target.date)
            .bind(target.start_time)
            .bind(target.end_time)
            .bind(target.consultation_type.as_str())
            .bind(duration)
            .bind(AppointmentStatus::Scheduled.as_str())
            .fetch_one(executor)
            .await?
            .try_into()
    }

    /// Appointments visible to the caller: their own as patient or as doctor.
    pub async fn list_for_scope<'e, E>(
        executor: E,
        scope: &AccessScope,
        filter: &AppointmentListFilter,
    ) -> Result<Vec<Appointment>, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM appointments \
             WHERE {owner} = $1 \
               AND ($2::TEXT IS NULL OR status = $2) \
               AND ($3::DATE IS NULL OR appointment_date >= $3) \
               AND ($4::DATE IS NULL OR appointment_date <= $4) \
             ORDER BY appointment_date, start_time, id \
             LIMIT $5",
            owner = scope.owner_column()
        );
        let limit = filter.limit.unwrap_or(MAX_LIMIT).clamp(1, MAX_LIMIT);
        let rows = sqlx::query_as::<_, AppointmentRow>(&query)
            .bind(scope.user_id())
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.from_date)
            .bind(filter.to_date)
            .bind(limit)
            .fetch_all(executor)
            .await?;
        into_appointments(rows)
    }
}
