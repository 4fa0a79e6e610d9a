use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, warn};

use shared_config::FreedSlotPolicy;
use shared_database::appointments::{AppointmentRepo, NewAppointment};
use shared_database::identity;
use shared_database::notifier::{dispatch, Notifier, OutboundMessage};
use shared_models::scheduling::SlotTuple;

use crate::models::{BroadcastOutcome, FulfillmentOutcome, WaitlistError};
use crate::services::store::WaitlistStore;

/// Reason stored on appointments the engine books for a waitlisted patient.
pub const WAITLIST_BOOKING_REASON: &str = "Booked automatically from the waitlist";

/// Offers a freed slot to the oldest active entry waiting on exactly that tuple.
///
/// Runs on the caller's transaction. At most one entry wins: the queue head is
/// taken with `SKIP LOCKED`, and the window is re-checked under lock before
/// anything is written. If the window is taken the call writes nothing and
/// reports [`FulfillmentOutcome::SlotStillOccupied`].
pub async fn fulfill_waitlist_for_cancelled_appointment(
    conn: &mut PgConnection,
    slot: &SlotTuple,
) -> Result<FulfillmentOutcome, WaitlistError> {
    debug!(
        "Offering freed slot {} {}-{} ({}) of doctor {} to the waitlist",
        slot.date, slot.start_time, slot.end_time, slot.consultation_type, slot.doctor_id
    );

    // Same lock every booking takes first, so this write serializes with them.
    identity::lock_doctor(&mut *conn, slot.doctor_id).await?;

    let Some(entry) = WaitlistStore::lock_next_active(&mut *conn, slot).await? else {
        debug!("No active waitlist entries for the freed slot");
        return Ok(FulfillmentOutcome::NoCandidate);
    };

    let occupying = AppointmentRepo::lock_occupying_overlaps(
        &mut *conn,
        slot.doctor_id,
        slot.date,
        slot.start_time,
        slot.end_time,
        None,
    )
    .await?;
    if !occupying.is_empty() {
        warn!(
            "Freed slot for waitlist entry {} is occupied again by appointment {}",
            entry.id, occupying[0].id
        );
        return Ok(FulfillmentOutcome::SlotStillOccupied { entry_id: entry.id });
    }

    let override_id = WaitlistStore::matching_override_id(&mut *conn, slot).await?;
    let appointment = AppointmentRepo::insert(
        &mut *conn,
        &NewAppointment {
            patient_id: entry.patient_id,
            doctor_id: slot.doctor_id,
            override_id,
            date: slot.date,
            start_time: slot.start_time,
            end_time: slot.end_time,
            consultation_type: slot.consultation_type,
            reason: WAITLIST_BOOKING_REASON.to_string(),
        },
    )
    .await?;

    WaitlistStore::mark_booked(&mut *conn, entry.id, appointment.id).await?;

    info!(
        "Waitlist entry {} booked into appointment {} for patient {}",
        entry.id, appointment.id, entry.patient_id
    );

    let message = OutboundMessage::new(
        slot.doctor_id,
        entry.patient_id,
        Some(appointment.id),
        booked_message(slot),
    );

    Ok(FulfillmentOutcome::Booked {
        entry_id: entry.id,
        appointment,
        message,
    })
}

/// Marks every active entry on the tuple as notified and returns one message
/// per entry. Books nothing.
pub async fn notify_patients_for_cancellation(
    conn: &mut PgConnection,
    slot: &SlotTuple,
) -> Result<BroadcastOutcome, WaitlistError> {
    let entries = WaitlistStore::lock_all_active(&mut *conn, slot).await?;

    let mut outcome = BroadcastOutcome::default();
    for entry in entries {
        WaitlistStore::mark_notified(&mut *conn, entry.id).await?;
        outcome.notified_entry_ids.push(entry.id);
        outcome
            .messages
            .push(OutboundMessage::new(slot.doctor_id, entry.patient_id, None, opened_message(slot)));
    }

    if !outcome.notified_entry_ids.is_empty() {
        info!(
            "Notified {} waitlisted patients that doctor {} has an opening on {} at {}",
            outcome.notified_entry_ids.len(),
            slot.doctor_id,
            slot.date,
            slot.start_time
        );
    }
    Ok(outcome)
}

/// Runs whichever primitive `policy` selects and returns the messages to send
/// once the caller commits.
pub async fn handle_freed_slot(
    conn: &mut PgConnection,
    policy: FreedSlotPolicy,
    slot: &SlotTuple,
) -> Result<Vec<OutboundMessage>, WaitlistError> {
    match policy {
        FreedSlotPolicy::AutoBook => Ok(fulfill_waitlist_for_cancelled_appointment(conn, slot)
            .await?
            .into_messages()),
        FreedSlotPolicy::Broadcast => Ok(notify_patients_for_cancellation(conn, slot).await?.messages),
    }
}

/// Standalone entry points that own their transaction and deliver the
/// messages after commit.
pub struct WaitlistFulfillmentEngine;

impl WaitlistFulfillmentEngine {
    pub async fn fulfill(
        pool: &PgPool,
        notifier: &dyn Notifier,
        slot: &SlotTuple,
    ) -> Result<FulfillmentOutcome, WaitlistError> {
        let mut tx = pool.begin().await?;
        let outcome = fulfill_waitlist_for_cancelled_appointment(&mut *tx, slot).await?;
        tx.commit().await?;

        if let FulfillmentOutcome::Booked { message, .. } = &outcome {
            dispatch(notifier, std::slice::from_ref(message)).await;
        }
        Ok(outcome)
    }

    pub async fn broadcast(
        pool: &PgPool,
        notifier: &dyn Notifier,
        slot: &SlotTuple,
    ) -> Result<BroadcastOutcome, WaitlistError> {
        let mut tx = pool.begin().await?;
        let outcome = notify_patients_for_cancellation(&mut *tx, slot).await?;
        tx.commit().await?;

        dispatch(notifier, &outcome.messages).await;
        Ok(outcome)
    }
}

fn booked_message(slot: &SlotTuple) -> String {
    format!(
        "A {} appointment opened on {} at {}-{} and you have been booked into it from the waitlist.",
        slot.consultation_type,
        slot.date,
        slot.start_time.format("%H:%M"),
        slot.end_time.format("%H:%M")
    )
}

fn opened_message(slot: &SlotTuple) -> String {
    format!(
        "A {} appointment on {} at {}-{} you are waiting for is now open. Book it before someone else does.",
        slot.consultation_type,
        slot.date,
        slot.start_time.format("%H:%M"),
        slot.end_time.format("%H:%M")
    )
}
