// libs/waitlist-cell/src/router.rs
use axum::{
    middleware,
    routing::{delete, get},
    Router,
};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn waitlist_routes(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/", get(handlers::list_waitlist).post(handlers::join_waitlist))
        .route("/{entry_id}", delete(handlers::leave_waitlist))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
