pub mod appointments;
pub mod identity;
pub mod notifier;
pub mod postgres;
pub mod state;
pub mod supabase;

pub use state::AppState;
