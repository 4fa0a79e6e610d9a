use chrono::{DateTime, NaiveTime, Utc};
use sqlx::{PgExecutor, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::identity;
use shared_models::error::AppError;
use shared_models::scheduling::{parse_type_set, ranges_overlap, type_set_to_strings, DbId};
use shared_utils::time::{ensure_time_order, minutes_between, parse_clock_time};

use crate::models::{AvailabilityError, AvailabilityPattern, PatternInput, PatternSpec};

const COLUMNS: &str = "\
    id, doctor_id, day_of_week, start_time, end_time, slot_duration_minutes, \
    allowed_types, is_active, created_at";

#[derive(Debug, sqlx::FromRow)]
struct PatternRow {
    id: DbId,
    doctor_id: Uuid,
    day_of_week: i16,
    start_time: NaiveTime,
    end_time: NaiveTime,
    slot_duration_minutes: i32,
    allowed_types: Vec<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<PatternRow> for AvailabilityPattern {
    type Error = AppError;

    fn try_from(row: PatternRow) -> Result<Self, Self::Error> {
        Ok(AvailabilityPattern {
            id: row.id,
            doctor_id: row.doctor_id,
            day_of_week: row.day_of_week,
            start_time: row.start_time,
            end_time: row.end_time,
            slot_duration_minutes: row.slot_duration_minutes,
            allowed_types: parse_type_set(&row.allowed_types).map_err(AppError::Database)?,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

fn into_patterns(rows: Vec<PatternRow>) -> Result<Vec<AvailabilityPattern>, AppError> {
    rows.into_iter().map(AvailabilityPattern::try_from).collect()
}

/// Persistence for the recurring weekly templates.
pub struct PatternStore;

impl PatternStore {
    pub async fn list_for_doctor<'e, E>(executor: E, doctor_id: Uuid) -> Result<Vec<AvailabilityPattern>, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM availability_patterns \
             WHERE doctor_id = $1 ORDER BY day_of_week, start_time"
        );
        let rows = sqlx::query_as::<_, PatternRow>(&query)
            .bind(doctor_id)
            .fetch_all(executor)
            .await?;
        into_patterns(rows)
    }

    pub async fn active_for_day<'e, E>(
        executor: E,
        doctor_id: Uuid,
        day_of_week: i16,
    ) -> Result<Vec<AvailabilityPattern>, AppError>
    where
        E: PgExecutor<'e>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM availability_patterns \
             WHERE doctor_id = $1 AND day_of_week = $2 AND is_active \
             ORDER BY start_time"
        );
        let rows = sqlx::query_as::<_, PatternRow>(&query)
            .bind(doctor_id)
            .bind(day_of_week)
            .fetch_all(executor)
            .await?;
        into_patterns(rows)
    }

    /// Deletes every pattern of the doctor and inserts `specs`, atomically.
    pub async fn replace_all(
        pool: &PgPool,
        doctor_id: Uuid,
        specs: &[PatternSpec],
    ) -> Result<Vec<AvailabilityPattern>, AvailabilityError> {
        debug!("Replacing availability patterns for doctor {} with {} entries", doctor_id, specs.len());

        let mut tx = pool.begin().await?;

        identity::lock_doctor(&mut *tx, doctor_id).await?;

        sqlx::query("DELETE FROM availability_patterns WHERE doctor_id = $1")
            .bind(doctor_id)
            .execute(&mut *tx)
            .await?;

        let insert = format!(
            "INSERT INTO availability_patterns \
                (doctor_id, day_of_week, start_time, end_time, slot_duration_minutes, allowed_types, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );

        let mut created = Vec::with_capacity(specs.len());
        for spec in specs {
            let row = sqlx::query_as::<_, PatternRow>(&insert)
                .bind(doctor_id)
                .bind(spec.day_of_week)
                .bind(spec.start_time)
                .bind(spec.end_time)
                .bind(spec.slot_duration_minutes)
                .bind(type_set_to_strings(&spec.allowed_types))
                .bind(spec.is_active)
                .fetch_one(&mut *tx)
                .await?;
            created.push(AvailabilityPattern::try_from(row)?);
        }

        tx.commit().await?;

        info!("Replaced availability patterns for doctor {} ({} patterns)", doctor_id, created.len());
        Ok(created)
    }

    pub async fn delete(pool: &PgPool, doctor_id: Uuid, pattern_id: DbId) -> Result<(), AvailabilityError> {
        let result = sqlx::query("DELETE FROM availability_patterns WHERE id = $1 AND doctor_id = $2")
            .bind(pattern_id)
            .bind(doctor_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AvailabilityError::PatternNotFound);
        }

        info!("Deleted availability pattern {} for doctor {}", pattern_id, doctor_id);
        Ok(())
    }
}

/// Validates a full replacement payload.
///
/// Besides per-pattern checks, windows on the same weekday may neither share a
/// start time nor overlap.
pub fn validate_patterns(inputs: &[PatternInput]) -> Result<Vec<PatternSpec>, AvailabilityError> {
    let specs = inputs
        .iter()
        .enumerate()
        .map(|(index, input)| {
            validate_pattern(input)
                .map_err(|e| AvailabilityError::Validation(format!("patterns[{}]: {}", index, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    for (i, a) in specs.iter().enumerate() {
        for b in specs.iter().skip(i + 1) {
            if a.day_of_week == b.day_of_week
                && ranges_overlap(a.start_time, a.end_time, b.start_time, b.end_time)
            {
                return Err(AvailabilityError::Validation(format!(
                    "Patterns on day {} overlap ({}-{} and {}-{})",
                    a.day_of_week, a.start_time, a.end_time, b.start_time, b.end_time
                )));
            }
        }
    }

    Ok(specs)
}

fn validate_pattern(input: &PatternInput) -> Result<PatternSpec, String> {
    if !(0..=6).contains(&input.day_of_week) {
        return Err("day_of_week must be between 0 (Sunday) and 6 (Saturday)".to_string());
    }

    let start_time = parse_clock_time("start_time", &input.start_time).map_err(|e| e.message().to_string())?;
    let end_time = parse_clock_time("end_time", &input.end_time).map_err(|e| e.message().to_string())?;
    ensure_time_order(start_time, end_time).map_err(|e| e.message().to_string())?;

    if input.slot_duration_minutes <= 0 {
        return Err("slot_duration_minutes must be positive".to_string());
    }
    if input.slot_duration_minutes > minutes_between(start_time, end_time) {
        return Err("slot_duration_minutes must fit inside the window".to_string());
    }

    let allowed_types = parse_type_set(&input.allowed_types)?;
    if allowed_types.is_empty() {
        return Err("allowed_types must contain at least one type".to_string());
    }

    Ok(PatternSpec {
        day_of_week: input.day_of_week,
        start_time,
        end_time,
        slot_duration_minutes: input.slot_duration_minutes,
        allowed_types,
        is_active: input.is_active.unwrap_or(true),
    })
}
