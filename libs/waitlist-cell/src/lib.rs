pub mod handlers;
pub mod router;
pub mod models;
pub mod services;

pub use models::*;
pub use services::fulfillment::{
    fulfill_waitlist_for_cancelled_appointment, handle_freed_slot, notify_patients_for_cancellation,
};
