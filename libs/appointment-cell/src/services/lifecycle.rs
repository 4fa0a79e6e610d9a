// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use shared_models::scheduling::AppointmentStatus;

use crate::models::{AppointmentAction, AppointmentError};

/// Appointment state machine.
///
/// ```text
/// scheduled ──confirm──> confirmed ──complete──> completed
///     │                     │  └────no-show────> no-show
///     └──decline/cancel─────┴──cancel──────────> cancelled
/// ```
///
/// Rescheduling keeps the row but puts it back to `scheduled`.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    /// Statuses `action` may be applied from.
    pub fn allowed_from(action: AppointmentAction) -> &'static [AppointmentStatus] {
        match action {
            AppointmentAction::Confirm | AppointmentAction::Decline => &[AppointmentStatus::Scheduled],
            AppointmentAction::Complete | AppointmentAction::NoShow => &[AppointmentStatus::Confirmed],
            AppointmentAction::Cancel | AppointmentAction::Reschedule => {
                &[AppointmentStatus::Scheduled, AppointmentStatus::Confirmed]
            }
        }
    }

    pub fn target_status(action: AppointmentAction) -> AppointmentStatus {
        match action {
            AppointmentAction::Confirm => AppointmentStatus::Confirmed,
            AppointmentAction::Decline | AppointmentAction::Cancel => AppointmentStatus::Cancelled,
            AppointmentAction::Complete => AppointmentStatus::Completed,
            AppointmentAction::NoShow => AppointmentStatus::NoShow,
            AppointmentAction::Reschedule => AppointmentStatus::Scheduled,
        }
    }

    /// Checks `action` against the current status and returns the status it leads to.
    pub fn validate_status_transition(
        current_status: AppointmentStatus,
        action: AppointmentAction,
    ) -> Result<AppointmentStatus, AppointmentError> {
        debug!("Validating '{}' on an appointment that is {}", action, current_status);

        if current_status.is_terminal() || !Self::allowed_from(action).contains(&current_status) {
            warn!("Invalid status transition attempted: {} on {}", action, current_status);
            return Err(AppointmentError::InvalidStatusTransition {
                status: current_status,
                action,
            });
        }

        Ok(Self::target_status(action))
    }

    /// Every status reachable in one step from `current_status`.
    pub fn get_valid_transitions(current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        if current_status.is_terminal() {
            return Vec::new();
        }

        let mut targets: Vec<AppointmentStatus> = [
            AppointmentAction::Confirm,
            AppointmentAction::Decline,
            AppointmentAction::Complete,
            AppointmentAction::NoShow,
            AppointmentAction::Cancel,
            AppointmentAction::Reschedule,
        ]
        .into_iter()
        .filter(|action| Self::allowed_from(*action).contains(&current_status))
        .map(Self::target_status)
        .collect();

        targets.dedup();
        targets
    }
}
