// libs/availability-cell/src/handlers.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::AppState;
use shared_models::auth::AccessScope;
use shared_models::error::AppError;
use shared_models::scheduling::{ConsultationType, DbId};
use shared_utils::extractor::Caller;
use shared_utils::time::parse_date;

use crate::models::{CreateOverrideRequest, ReplacePatternsRequest, UpdateOverrideRequest};
use crate::services::overrides::validate_new_override;
use crate::services::patterns::validate_patterns;
use crate::services::{OpenSlotService, OverrideStore, PatternStore};

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct PatternQuery {
    pub doctor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct OverrideQuery {
    pub doctor_id: Option<Uuid>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenSlotQuery {
    pub date: String,
    #[serde(rename = "type")]
    pub consultation_type: Option<String>,
}

/// Doctors read their own schedule; patients must name the doctor.
fn schedule_owner(scope: &AccessScope, requested: Option<Uuid>) -> Result<Uuid, AppError> {
    match scope {
        AccessScope::Doctor(id) => Ok(*id),
        AccessScope::Patient(_) => {
            requested.ok_or_else(|| AppError::ValidationError("doctor_id is required".to_string()))
        }
    }
}

fn parse_type_filter(raw: Option<&str>) -> Result<Option<ConsultationType>, AppError> {
    raw.map(|value| value.parse::<ConsultationType>().map_err(AppError::ValidationError))
        .transpose()
}

// ==============================================================================
// WEEKLY PATTERN HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_patterns(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Query(query): Query<PatternQuery>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = schedule_owner(&scope, query.doctor_id)?;
    let patterns = PatternStore::list_for_doctor(&state.pool, doctor_id).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "patterns": patterns,
        "total": patterns.len(),
    })))
}

/// Replaces the caller's whole weekly schedule.
#[axum::debug_handler]
pub async fn replace_patterns(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Json(request): Json<ReplacePatternsRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = scope.doctor_id()?;
    let specs = validate_patterns(&request.patterns)?;

    let patterns = PatternStore::replace_all(&state.pool, doctor_id, &specs).await?;

    Ok(Json(json!({
        "patterns": patterns,
        "total": patterns.len(),
        "message": "Availability patterns replaced",
    })))
}

#[axum::debug_handler]
pub async fn delete_pattern(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(pattern_id): Path<DbId>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = scope.doctor_id()?;
    PatternStore::delete(&state.pool, doctor_id, pattern_id).await?;

    Ok(Json(json!({
        "message": "Availability pattern deleted",
    })))
}

// ==============================================================================
// OVERRIDE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_overrides(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Query(query): Query<OverrideQuery>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = schedule_owner(&scope, query.doctor_id)?;
    let from_date = query.from.as_deref().map(|raw| parse_date("from", raw)).transpose()?;
    let to_date = query.to.as_deref().map(|raw| parse_date("to", raw)).transpose()?;

    let overrides = OverrideStore::list(&state.pool, doctor_id, from_date, to_date).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "overrides": overrides,
        "total": overrides.len(),
    })))
}

#[axum::debug_handler]
pub async fn create_override(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Json(request): Json<CreateOverrideRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let doctor_id = scope.doctor_id()?;
    let spec = validate_new_override(&request)?;

    let created = OverrideStore::create(&state.pool, doctor_id, &spec).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "override": created,
            "message": "Availability override created",
        })),
    ))
}

#[axum::debug_handler]
pub async fn update_override(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(override_id): Path<DbId>,
    Json(request): Json<UpdateOverrideRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = scope.doctor_id()?;
    let updated = OverrideStore::update(&state.pool, doctor_id, override_id, &request).await?;

    Ok(Json(json!({
        "override": updated,
        "message": "Availability override updated",
    })))
}

#[axum::debug_handler]
pub async fn delete_override(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(override_id): Path<DbId>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = scope.doctor_id()?;
    OverrideStore::delete(&state.pool, doctor_id, override_id).await?;

    Ok(Json(json!({
        "message": "Availability override deleted",
    })))
}

// ==============================================================================
// OPEN SLOT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_open_slots(
    State(state): State<AppState>,
    Caller(_scope): Caller,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<OpenSlotQuery>,
) -> Result<Json<Value>, AppError> {
    let date = parse_date("date", &query.date)?;
    let type_filter = parse_type_filter(query.consultation_type.as_deref())?;

    let slots = OpenSlotService::open_slots(&state.pool, doctor_id, date, type_filter).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": date,
        "slots": slots,
        "total": slots.len(),
    })))
}
