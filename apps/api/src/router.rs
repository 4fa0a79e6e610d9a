use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use availability_cell::router::availability_routes;
use shared_database::AppState;
use waitlist_cell::router::waitlist_routes;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .nest("/availability", availability_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/waitlist", waitlist_routes(state))
}
