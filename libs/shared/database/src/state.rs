use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use shared_config::AppConfig;

use crate::notifier::{LogNotifier, Notifier, SupabaseNotifier};

/// Router state shared by every cell.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pool: PgPool,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Picks the Supabase notifier when messaging is configured, else logs only.
    pub fn new(config: Arc<AppConfig>, pool: PgPool) -> Self {
        let notifier: Arc<dyn Notifier> = if config.is_notifier_configured() {
            Arc::new(SupabaseNotifier::new(&config))
        } else {
            Arc::new(LogNotifier)
        };
        Self::with_notifier(config, pool, notifier)
    }

    pub fn with_notifier(config: Arc<AppConfig>, pool: PgPool, notifier: Arc<dyn Notifier>) -> Self {
        Self { config, pool, notifier }
    }
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.config)
    }
}
