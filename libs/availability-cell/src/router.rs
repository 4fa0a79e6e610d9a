// libs/availability-cell/src/router.rs
use axum::{
    middleware,
    routing::{delete, get, put},
    Router,
};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn availability_routes(state: AppState) -> Router {
    let protected_routes = Router::new()
        // Weekly templates
        .route("/patterns", get(handlers::get_patterns).post(handlers::replace_patterns))
        .route("/patterns/{pattern_id}", delete(handlers::delete_pattern))
        // Date-specific overrides
        .route("/slots", get(handlers::get_overrides).post(handlers::create_override))
        .route(
            "/slots/{override_id}",
            put(handlers::update_override).delete(handlers::delete_override),
        )
        .route("/doctors/{doctor_id}/open-slots", get(handlers::get_open_slots))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
