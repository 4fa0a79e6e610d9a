// libs/waitlist-cell/src/handlers.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use shared_database::AppState;
use shared_models::error::AppError;
use shared_models::scheduling::DbId;
use shared_utils::extractor::Caller;

use crate::models::JoinWaitlistRequest;
use crate::services::waitlist::{parse_status_filter, validate_join_request};
use crate::services::WaitlistService;

#[derive(Debug, Deserialize)]
pub struct WaitlistQuery {
    pub status: Option<String>,
}

#[axum::debug_handler]
pub async fn join_waitlist(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Json(request): Json<JoinWaitlistRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let patient_id = scope.patient_id()?;
    let spec = validate_join_request(&request)?;

    let entry = WaitlistService::join(&state.pool, patient_id, &spec).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "entry": entry,
            "message": "Added to the waitlist",
        })),
    ))
}

#[axum::debug_handler]
pub async fn list_waitlist(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Query(query): Query<WaitlistQuery>,
) -> Result<Json<Value>, AppError> {
    let status = parse_status_filter(query.status.as_deref())?;
    let entries = WaitlistService::list(&state.pool, &scope, status).await?;

    Ok(Json(json!({
        "entries": entries,
        "total": entries.len(),
    })))
}

#[axum::debug_handler]
pub async fn leave_waitlist(
    State(state): State<AppState>,
    Caller(scope): Caller,
    Path(entry_id): Path<DbId>,
) -> Result<Json<Value>, AppError> {
    let patient_id = scope.patient_id()?;
    let entry = WaitlistService::leave(&state.pool, patient_id, entry_id).await?;

    Ok(Json(json!({
        "entry": entry,
        "message": "Removed from the waitlist",
    })))
}
