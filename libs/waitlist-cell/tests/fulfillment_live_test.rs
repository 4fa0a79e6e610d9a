// Runs against a real Postgres. Enable with LIVE_DATABASE_TESTS=true and DATABASE_URL.

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{NaiveTime, Weekday};
use sqlx::PgPool;
use uuid::Uuid;

use shared_database::appointments::{AppointmentRepo, NewAppointment};
use shared_database::notifier::LogNotifier;
use shared_database::{identity, postgres};
use shared_models::auth::AccessScope;
use shared_models::scheduling::{AppointmentStatus, ConsultationType, SlotTuple};
use shared_utils::test_utils::{live_database_enabled, upcoming, TestConfig};
use waitlist_cell::models::{FulfillmentOutcome, JoinWaitlistRequest, WaitlistError, WaitlistStatus};
use waitlist_cell::services::waitlist::validate_join_request;
use waitlist_cell::services::{WaitlistFulfillmentEngine, WaitlistService, WaitlistStore};

async fn live_pool() -> PgPool {
    let config = TestConfig::default().to_app_config();
    let pool = postgres::connect(&config).await.expect("DATABASE_URL must point at a test database");
    postgres::run_migrations(&pool).await.expect("migrations apply");
    pool
}

async fn seed_doctor(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO doctors (id, full_name, verification_status) VALUES ($1, 'Dr. Waitlist', 'verified')")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
    id
}

async fn seed_patient(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO patients (id, full_name) VALUES ($1, 'Waitlist Patient')")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
    id
}

fn afternoon_slot(doctor_id: Uuid) -> SlotTuple {
    SlotTuple {
        doctor_id,
        date: upcoming(Weekday::Mon),
        start_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
        consultation_type: ConsultationType::Virtual,
    }
}

async fn book(pool: &PgPool, patient_id: Uuid, slot: &SlotTuple) -> i64 {
    AppointmentRepo::insert(
        pool,
        &NewAppointment {
            patient_id,
            doctor_id: slot.doctor_id,
            override_id: None,
            date: slot.date,
            start_time: slot.start_time,
            end_time: slot.end_time,
            consultation_type: slot.consultation_type,
            reason: "Follow-up".to_string(),
        },
    )
    .await
    .unwrap()
    .id
}

fn join_request(slot: &SlotTuple) -> JoinWaitlistRequest {
    JoinWaitlistRequest {
        doctor_id: slot.doctor_id,
        date: slot.date.to_string(),
        start_time: slot.start_time.format("%H:%M").to_string(),
        end_time: slot.end_time.format("%H:%M").to_string(),
        consultation_type: slot.consultation_type.to_string(),
        notification_preference: Some("email".to_string()),
    }
}

async fn join(pool: &PgPool, patient_id: Uuid, slot: &SlotTuple) -> Result<i64, WaitlistError> {
    let spec = validate_join_request(&join_request(slot))?;
    WaitlistService::join(pool, patient_id, &spec).await.map(|entry| entry.id)
}

#[tokio::test]
async fn test_live_oldest_entry_wins_and_second_run_writes_nothing() {
    if !live_database_enabled() {
        println!("Skipping live database test (set LIVE_DATABASE_TESTS=true)");
        return;
    }
    let pool = live_pool().await;
    let doctor_id = seed_doctor(&pool).await;
    let (holder, first, second) = (seed_patient(&pool).await, seed_patient(&pool).await, seed_patient(&pool).await);
    let slot = afternoon_slot(doctor_id);

    let held = book(&pool, holder, &slot).await;
    let first_entry = join(&pool, first, &slot).await.unwrap();
    let second_entry = join(&pool, second, &slot).await.unwrap();

    AppointmentRepo::cancel(&pool, held, holder, "Travelling").await.unwrap();

    let outcome = WaitlistFulfillmentEngine::fulfill(&pool, &LogNotifier, &slot).await.unwrap();
    let appointment = assert_matches!(
        outcome,
        FulfillmentOutcome::Booked { entry_id, appointment, .. } if entry_id == first_entry => appointment
    );
    assert_eq!(appointment.patient_id, first);
    assert_eq!(appointment.status, AppointmentStatus::Scheduled);

    let mut conn = pool.acquire().await.unwrap();
    let booked = WaitlistStore::lock(&mut *conn, first_entry).await.unwrap().unwrap();
    assert_eq!(booked.status, WaitlistStatus::Booked);
    assert_eq!(booked.booked_appointment_id, Some(appointment.id));

    // The window is taken again: the next entry stays active.
    let outcome = WaitlistFulfillmentEngine::fulfill(&pool, &LogNotifier, &slot).await.unwrap();
    assert_eq!(outcome, FulfillmentOutcome::SlotStillOccupied { entry_id: second_entry });

    let untouched = WaitlistStore::lock(&mut *conn, second_entry).await.unwrap().unwrap();
    assert_eq!(untouched.status, WaitlistStatus::Active);
    let occupying = AppointmentRepo::occupying_on_date(&pool, doctor_id, slot.date).await.unwrap();
    assert_eq!(occupying.len(), 1);
}

#[tokio::test]
async fn test_live_broadcast_notifies_everyone_and_books_nothing() {
    if !live_database_enabled() {
        return;
    }
    let pool = live_pool().await;
    let doctor_id = seed_doctor(&pool).await;
    let (holder, first, second) = (seed_patient(&pool).await, seed_patient(&pool).await, seed_patient(&pool).await);
    let slot = afternoon_slot(doctor_id);

    let held = book(&pool, holder, &slot).await;
    let first_entry = join(&pool, first, &slot).await.unwrap();
    let second_entry = join(&pool, second, &slot).await.unwrap();
    AppointmentRepo::cancel(&pool, held, holder, "Travelling").await.unwrap();

    let outcome = WaitlistFulfillmentEngine::broadcast(&pool, &LogNotifier, &slot).await.unwrap();
    assert_eq!(outcome.notified_entry_ids, vec![first_entry, second_entry]);
    assert_eq!(outcome.messages.len(), 2);

    let mut conn = pool.acquire().await.unwrap();
    let notified = WaitlistStore::lock(&mut *conn, first_entry).await.unwrap().unwrap();
    assert_eq!(notified.status, WaitlistStatus::Notified);
    assert!(notified.last_notified_at.is_some());
    assert!(AppointmentRepo::occupying_on_date(&pool, doctor_id, slot.date).await.unwrap().is_empty());

    // Notified entries are out of the queue for good.
    let again = WaitlistFulfillmentEngine::fulfill(&pool, &LogNotifier, &slot).await.unwrap();
    assert_eq!(again, FulfillmentOutcome::NoCandidate);
}

#[tokio::test]
async fn test_live_join_rules() {
    if !live_database_enabled() {
        return;
    }
    let pool = live_pool().await;
    let doctor_id = seed_doctor(&pool).await;
    let (holder, waiter) = (seed_patient(&pool).await, seed_patient(&pool).await);
    let slot = afternoon_slot(doctor_id);

    assert_matches!(join(&pool, waiter, &slot).await, Err(WaitlistError::SlotOpen));

    book(&pool, holder, &slot).await;
    assert_matches!(join(&pool, holder, &slot).await, Err(WaitlistError::AlreadyHolder));

    let entry = join(&pool, waiter, &slot).await.unwrap();
    assert_matches!(join(&pool, waiter, &slot).await, Err(WaitlistError::AlreadyWaitlisted));

    let removed = WaitlistService::leave(&pool, waiter, entry).await.unwrap();
    assert_eq!(removed.status, WaitlistStatus::Removed);
    assert_matches!(
        WaitlistService::leave(&pool, waiter, entry).await,
        Err(WaitlistError::NotActive(WaitlistStatus::Removed))
    );
    assert_matches!(
        WaitlistService::leave(&pool, holder, entry).await,
        Err(WaitlistError::EntryNotFound)
    );
}

#[tokio::test]
async fn test_live_join_requires_the_exact_held_tuple() {
    if !live_database_enabled() {
        return;
    }
    let pool = live_pool().await;
    let doctor_id = seed_doctor(&pool).await;
    let (holder, waiter) = (seed_patient(&pool).await, seed_patient(&pool).await);
    let slot = afternoon_slot(doctor_id);
    let held = book(&pool, holder, &slot).await;

    let other_type = SlotTuple {
        consultation_type: ConsultationType::InPerson,
        ..slot
    };
    assert_matches!(join(&pool, waiter, &other_type).await, Err(WaitlistError::NotAHeldSlot));

    let shifted = SlotTuple {
        start_time: NaiveTime::from_hms_opt(14, 15, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(14, 45, 0).unwrap(),
        ..slot
    };
    assert_matches!(join(&pool, waiter, &shifted).await, Err(WaitlistError::NotAHeldSlot));

    // Nothing stale is left behind once the holder leaves.
    AppointmentRepo::cancel(&pool, held, holder, "Travelling").await.unwrap();
    let entries = WaitlistService::list(&pool, &AccessScope::Patient(waiter), None).await.unwrap();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_live_join_waits_for_the_doctor_lock() {
    if !live_database_enabled() {
        return;
    }
    let pool = live_pool().await;
    let doctor_id = seed_doctor(&pool).await;
    let (holder, waiter) = (seed_patient(&pool).await, seed_patient(&pool).await);
    let slot = afternoon_slot(doctor_id);
    book(&pool, holder, &slot).await;

    // A booking write in flight holds the doctor row.
    let mut tx = pool.begin().await.unwrap();
    identity::lock_doctor(&mut *tx, doctor_id).await.unwrap();

    let join_pool = pool.clone();
    let pending = tokio::spawn(async move { join(&join_pool, waiter, &slot).await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!pending.is_finished(), "join must queue behind the doctor lock");

    tx.commit().await.unwrap();
    assert!(pending.await.unwrap().is_ok());
}
