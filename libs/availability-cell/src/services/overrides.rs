use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{PgExecutor, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::identity;
use shared_models::error::AppError;
use shared_models::scheduling::{parse_type_set, type_set_to_strings, ConsultationType, DbId};
use shared_utils::time::{ensure_not_past, ensure_time_order, parse_clock_time, parse_date, DATE_FORMAT, TIME_FORMAT};

use crate::models::{
    AvailabilityError, AvailabilityOverride, CreateOverrideRequest, OverrideSpec, UpdateOverrideRequest,
};

const COLUMNS: &str = "\
    id, doctor_id, override_date, start_time, end_time, is_available, \
    allowed_types, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct OverrideRow {
    id: DbId,
    doctor_id: Uuid,
    override_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    is_available: bool,
    allowed_types: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OverrideRow> for AvailabilityOverride {
    type Error = AppError;

    fn try_from(row: OverrideRow) -> Result<Self, Self::Error> {
        Ok(AvailabilityOverride {
            id: row.id,
            doctor_id: row.doctor_id,
            date: row.override_date,
            start_time: row.start_time,
            end_time: row.end_time,
            is_available: row.is_available,
            allowed_types: parse_type_set(&row.allowed_types).map_err(AppError::Database)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_overrides(rows: Vec<OverrideRow>) -> Result<Vec<AvailabilityOverride>, AppError> {
    rows.into_iter().map(AvailabilityOverride::try_from).collect()
}

/// Persistence for date-specific availability overrides.
pub struct OverrideStore;

impl OverrideStore {
    pub async fn list<'e, E>(
        executor: E,
        doctor_id: Uuid,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
    ) -> Result<Vec<AvailabilityOverride>, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM availability_overrides \
             WHERE doctor_id = $1 \
               AND ($2::DATE IS NULL OR override_date >= $2) \
               AND ($3::DATE IS NULL OR override_date <= $3) \
             ORDER BY override_date, start_time"
        );
        let rows = sqlx::query_as::<_, OverrideRow>(&query)
            .bind(doctor_id)
            .bind(from_date)
            .bind(to_date)
            .fetch_all(executor)
            .await?;
        into_overrides(rows)
    }

    pub async fn for_date<'e, E>(
        executor: E,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<AvailabilityOverride>, AppError>
    where
        E: PgExecutor<'e>,
    {
        Self::list(executor, doctor_id, Some(date), Some(date)).await
    }

    pub async fn create(
        pool: &PgPool,
        doctor_id: Uuid,
        spec: &OverrideSpec,
    ) -> Result<AvailabilityOverride, AvailabilityError> {
        debug!("Creating availability override for doctor {} on {}", doctor_id, spec.date);

        if identity::fetch_doctor(pool, doctor_id).await?.is_none() {
            return Err(AppError::NotFound("Doctor not found".to_string()).into());
        }

        let query = format!(
            "INSERT INTO availability_overrides \
                (doctor_id, override_date, start_time, end_time, is_available, allowed_types) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, OverrideRow>(&query)
            .bind(doctor_id)
            .bind(spec.date)
            .bind(spec.start_time)
            .bind(spec.end_time)
            .bind(spec.is_available)
            .bind(type_set_to_strings(&spec.allowed_types))
            .fetch_one(pool)
            .await
            .map_err(duplicate_as_conflict)?;

        let created = AvailabilityOverride::try_from(row)?;
        info!(
            "Created {} override {} for doctor {} on {}",
            if created.is_available { "available" } else { "unavailable" },
            created.id,
            doctor_id,
            created.date
        );
        Ok(created)
    }

    /// Applies a partial update. The merged result is validated as a whole.
    pub async fn update(
        pool: &PgPool,
        doctor_id: Uuid,
        override_id: DbId,
        request: &UpdateOverrideRequest,
    ) -> Result<AvailabilityOverride, AvailabilityError> {
        debug!("Updating availability override {} for doctor {}", override_id, doctor_id);

        let mut tx = pool.begin().await?;

        let select = format!(
            "SELECT {COLUMNS} FROM availability_overrides \
             WHERE id = $1 AND doctor_id = $2 FOR UPDATE"
        );
        let current: AvailabilityOverride = sqlx::query_as::<_, OverrideRow>(&select)
            .bind(override_id)
            .bind(doctor_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AvailabilityError::OverrideNotFound)?
            .try_into()?;

        let spec = merge_override_update(&current, request)?;

        let update = format!(
            "UPDATE availability_overrides \
             SET override_date = $2, start_time = $3, end_time = $4, is_available = $5, \
                 allowed_types = $6, updated_at = NOW() \
             WHERE id = $1 RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, OverrideRow>(&update)
            .bind(override_id)
            .bind(spec.date)
            .bind(spec.start_time)
            .bind(spec.end_time)
            .bind(spec.is_available)
            .bind(type_set_to_strings(&spec.allowed_types))
            .fetch_one(&mut *tx)
            .await
            .map_err(duplicate_as_conflict)?;

        tx.commit().await?;

        info!("Updated availability override {} for doctor {}", override_id, doctor_id);
        Ok(AvailabilityOverride::try_from(row)?)
    }

    pub async fn delete(pool: &PgPool, doctor_id: Uuid, override_id: DbId) -> Result<(), AvailabilityError> {
        let result = sqlx::query("DELETE FROM availability_overrides WHERE id = $1 AND doctor_id = $2")
            .bind(override_id)
            .bind(doctor_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AvailabilityError::OverrideNotFound);
        }

        info!("Deleted availability override {} for doctor {}", override_id, doctor_id);
        Ok(())
    }
}

fn duplicate_as_conflict(err: sqlx::Error) -> AvailabilityError {
    match AppError::from(err) {
        AppError::Conflict(_) => AppError::Conflict(
            "An override already starts at this time on this date".to_string(),
        )
        .into(),
        other => other.into(),
    }
}

pub fn validate_new_override(request: &CreateOverrideRequest) -> Result<OverrideSpec, AvailabilityError> {
    build_override_spec(
        &request.date,
        &request.start_time,
        &request.end_time,
        request.is_available,
        request.allowed_types.as_deref(),
    )
}

fn merge_override_update(
    current: &AvailabilityOverride,
    request: &UpdateOverrideRequest,
) -> Result<OverrideSpec, AvailabilityError> {
    let date = request
        .date
        .clone()
        .unwrap_or_else(|| current.date.format(DATE_FORMAT).to_string());
    let start = request
        .start_time
        .clone()
        .unwrap_or_else(|| current.start_time.format(TIME_FORMAT).to_string());
    let end = request
        .end_time
        .clone()
        .unwrap_or_else(|| current.end_time.format(TIME_FORMAT).to_string());
    let current_types: Vec<String> = type_set_to_strings(&current.allowed_types);

    build_override_spec(
        &date,
        &start,
        &end,
        request.is_available.unwrap_or(current.is_available),
        Some(request.allowed_types.as_deref().unwrap_or(&current_types)),
    )
}

fn build_override_spec(
    date: &str,
    start_time: &str,
    end_time: &str,
    is_available: bool,
    allowed_types: Option<&[String]>,
) -> Result<OverrideSpec, AvailabilityError> {
    let validation = |e: AppError| AvailabilityError::Validation(e.message().to_string());

    let date = parse_date("date", date).map_err(validation)?;
    ensure_not_past(date).map_err(validation)?;
    let start_time = parse_clock_time("start_time", start_time).map_err(validation)?;
    let end_time = parse_clock_time("end_time", end_time).map_err(validation)?;
    ensure_time_order(start_time, end_time).map_err(validation)?;

    let allowed_types = match allowed_types {
        Some(raw) => parse_type_set(raw).map_err(AvailabilityError::Validation)?,
        None => ConsultationType::ALL.to_vec(),
    };
    if is_available && allowed_types.is_empty() {
        return Err(AvailabilityError::Validation(
            "An available override must allow at least one type".to_string(),
        ));
    }

    Ok(OverrideSpec {
        date,
        start_time,
        end_time,
        is_available,
        allowed_types,
    })
}
