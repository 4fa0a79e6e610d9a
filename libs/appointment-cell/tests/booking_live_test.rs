// Runs against a real Postgres. Enable with LIVE_DATABASE_TESTS=true and DATABASE_URL.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Weekday};
use sqlx::PgPool;
use uuid::Uuid;

use appointment_cell::models::{AppointmentDecision, AppointmentError, BookingSpec, RescheduleSpec};
use appointment_cell::services::AppointmentBookingService;
use shared_database::appointments::AppointmentRepo;
use shared_database::notifier::{Notifier, OutboundMessage};
use shared_database::{postgres, AppState};
use shared_models::auth::AccessScope;
use shared_models::scheduling::{AppointmentStatus, ConsultationType, SlotTuple};
use shared_utils::test_utils::{live_database_enabled, upcoming, TestConfig};
use shared_utils::time::day_of_week_index;
use waitlist_cell::models::{NotificationPreference, WaitlistError, WaitlistSpec, WaitlistStatus};
use waitlist_cell::services::{WaitlistService, WaitlistStore};

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingNotifier {
    fn received_by(&self, receiver: Uuid) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.receiver_id == receiver)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct Clinic {
    state: AppState,
    notifier: Arc<RecordingNotifier>,
    doctor_id: Uuid,
    monday: NaiveDate,
}

impl Clinic {
    fn service(&self) -> AppointmentBookingService {
        AppointmentBookingService::new(&self.state)
    }

    fn pool(&self) -> &PgPool {
        &self.state.pool
    }
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// A verified doctor with Monday 09:00-12:00 in 30-minute slots, both types.
async fn clinic(verification_status: &str) -> Clinic {
    let config = TestConfig::default().to_arc();
    let pool = postgres::connect(&config).await.expect("DATABASE_URL must point at a test database");
    postgres::run_migrations(&pool).await.expect("migrations apply");

    let doctor_id = Uuid::new_v4();
    sqlx::query("INSERT INTO doctors (id, full_name, verification_status) VALUES ($1, 'Dr. Live', $2)")
        .bind(doctor_id)
        .bind(verification_status)
        .execute(&pool)
        .await
        .unwrap();

    let monday = upcoming(Weekday::Mon);
    sqlx::query(
        "INSERT INTO availability_patterns \
            (doctor_id, day_of_week, start_time, end_time, slot_duration_minutes, allowed_types) \
         VALUES ($1, $2, '09:00', '12:00', 30, ARRAY['virtual', 'in-person'])",
    )
    .bind(doctor_id)
    .bind(day_of_week_index(monday))
    .execute(&pool)
    .await
    .unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState::with_notifier(config, pool, notifier.clone());

    Clinic {
        state,
        notifier,
        doctor_id,
        monday,
    }
}

async fn seed_patient(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO patients (id, full_name) VALUES ($1, 'Live Patient')")
        .bind(id)
        .execute(pool)
        .await
        .unwrap();
    id
}

fn waitlist_spec(clinic: &Clinic, start: NaiveTime, end: NaiveTime) -> WaitlistSpec {
    WaitlistSpec {
        slot: SlotTuple {
            doctor_id: clinic.doctor_id,
            date: clinic.monday,
            start_time: start,
            end_time: end,
            consultation_type: ConsultationType::Virtual,
        },
        notification_preference: NotificationPreference::InApp,
    }
}

fn booking(clinic: &Clinic, start: NaiveTime, end: NaiveTime) -> BookingSpec {
    BookingSpec {
        doctor_id: clinic.doctor_id,
        date: clinic.monday,
        start_time: start,
        end_time: end,
        consultation_type: ConsultationType::Virtual,
        reason: "Persistent cough".to_string(),
    }
}

#[tokio::test]
async fn test_live_concurrent_bookings_for_one_slot_admit_exactly_one() {
    if !live_database_enabled() {
        println!("Skipping live database test (set LIVE_DATABASE_TESTS=true)");
        return;
    }
    let clinic = clinic("verified").await;
    let (first, second) = (seed_patient(clinic.pool()).await, seed_patient(clinic.pool()).await);
    let spec = booking(&clinic, t(10, 0), t(10, 30));

    let (service_a, service_b) = (clinic.service(), clinic.service());
    let (a, b) = tokio::join!(
        service_a.book_appointment(first, &spec),
        service_b.book_appointment(second, &spec)
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_matches!(
        outcomes.iter().find(|r| r.is_err()),
        Some(Err(AppointmentError::ConflictDetected))
    );

    let occupying = AppointmentRepo::occupying_on_date(clinic.pool(), clinic.doctor_id, clinic.monday)
        .await
        .unwrap();
    assert_eq!(occupying.len(), 1);
    assert_eq!(occupying[0].status, AppointmentStatus::Scheduled);
}

#[tokio::test]
async fn test_live_booking_must_match_the_schedule() {
    if !live_database_enabled() {
        return;
    }
    let clinic = clinic("verified").await;
    let patient = seed_patient(clinic.pool()).await;
    let service = clinic.service();

    // Straddles two generated slots.
    assert_matches!(
        service.book_appointment(patient, &booking(&clinic, t(9, 15), t(9, 45))).await,
        Err(AppointmentError::SlotNotAvailable)
    );
    // Outside working hours.
    assert_matches!(
        service.book_appointment(patient, &booking(&clinic, t(13, 0), t(13, 30))).await,
        Err(AppointmentError::SlotNotAvailable)
    );
    assert_matches!(
        service.book_appointment(Uuid::new_v4(), &booking(&clinic, t(9, 0), t(9, 30))).await,
        Err(AppointmentError::PatientNotFound)
    );

    let booked = service.book_appointment(patient, &booking(&clinic, t(9, 0), t(9, 30))).await.unwrap();
    assert_eq!(booked.duration_minutes, 30);
    assert_eq!(clinic.notifier.received_by(clinic.doctor_id).len(), 1);
}

#[tokio::test]
async fn test_live_unverified_doctor_cannot_be_booked() {
    if !live_database_enabled() {
        return;
    }
    let clinic = clinic("pending").await;
    let patient = seed_patient(clinic.pool()).await;

    assert_matches!(
        clinic.service().book_appointment(patient, &booking(&clinic, t(9, 0), t(9, 30))).await,
        Err(AppointmentError::DoctorNotVerified)
    );
}

#[tokio::test]
async fn test_live_decline_hands_the_slot_to_the_waitlist() {
    if !live_database_enabled() {
        return;
    }
    let clinic = clinic("verified").await;
    let (holder, waiter) = (seed_patient(clinic.pool()).await, seed_patient(clinic.pool()).await);
    let service = clinic.service();

    let held = service.book_appointment(holder, &booking(&clinic, t(11, 0), t(11, 30))).await.unwrap();
    let entry = WaitlistService::join(clinic.pool(), waiter, &waitlist_spec(&clinic, t(11, 0), t(11, 30)))
        .await
        .unwrap();

    let declined = service
        .decide(clinic.doctor_id, held.id, AppointmentDecision::Decline, None)
        .await
        .unwrap();
    assert_eq!(declined.status, AppointmentStatus::Cancelled);
    assert_eq!(declined.cancellation_reason.as_deref(), Some("Declined by doctor"));

    let occupying = AppointmentRepo::occupying_on_date(clinic.pool(), clinic.doctor_id, clinic.monday)
        .await
        .unwrap();
    assert_eq!(occupying.len(), 1);
    assert_eq!(occupying[0].patient_id, waiter);

    let mut conn = clinic.pool().acquire().await.unwrap();
    let booked_entry = WaitlistStore::lock(&mut *conn, entry.id).await.unwrap().unwrap();
    assert_eq!(booked_entry.status, WaitlistStatus::Booked);
    assert_eq!(booked_entry.booked_appointment_id, Some(occupying[0].id));

    // The waiter hears about the new booking, the holder about the decline.
    assert_eq!(clinic.notifier.received_by(waiter).len(), 1);
    let to_holder = clinic.notifier.received_by(holder);
    assert_eq!(to_holder.len(), 1);
    assert!(to_holder[0].content.contains("Dr. Live"));
}

#[tokio::test]
async fn test_live_reschedule_into_a_taken_window_changes_nothing() {
    if !live_database_enabled() {
        return;
    }
    let clinic = clinic("verified").await;
    let (first, second) = (seed_patient(clinic.pool()).await, seed_patient(clinic.pool()).await);
    let service = clinic.service();

    let mine = service.book_appointment(first, &booking(&clinic, t(9, 0), t(9, 30))).await.unwrap();
    service.book_appointment(second, &booking(&clinic, t(9, 30), t(10, 0))).await.unwrap();

    let attempt = service
        .reschedule_appointment(
            first,
            mine.id,
            &RescheduleSpec {
                date: clinic.monday,
                start_time: t(9, 30),
                end_time: t(10, 0),
                consultation_type: None,
            },
        )
        .await;
    assert_matches!(attempt, Err(AppointmentError::ConflictDetected));

    let unchanged = service.get_appointment(&AccessScope::Patient(first), mine.id).await.unwrap();
    assert_eq!(unchanged.start_time, t(9, 0));
    assert_eq!(unchanged.status, AppointmentStatus::Scheduled);

    let moved = service
        .reschedule_appointment(
            first,
            mine.id,
            &RescheduleSpec {
                date: clinic.monday,
                start_time: t(10, 30),
                end_time: t(11, 0),
                consultation_type: Some(ConsultationType::InPerson),
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.id, mine.id);
    assert_eq!(moved.start_time, t(10, 30));
    assert_eq!(moved.consultation_type, ConsultationType::InPerson);
}

#[tokio::test]
async fn test_live_only_the_parties_see_or_change_an_appointment() {
    if !live_database_enabled() {
        return;
    }
    let clinic = clinic("verified").await;
    let (owner, stranger) = (seed_patient(clinic.pool()).await, seed_patient(clinic.pool()).await);
    let service = clinic.service();

    let booked = service.book_appointment(owner, &booking(&clinic, t(9, 0), t(9, 30))).await.unwrap();

    assert_matches!(
        service.get_appointment(&AccessScope::Patient(stranger), booked.id).await,
        Err(AppointmentError::NotFound)
    );
    assert_matches!(
        service.cancel_appointment(stranger, booked.id, None).await,
        Err(AppointmentError::NotFound)
    );
    assert_matches!(
        service
            .decide(Uuid::new_v4(), booked.id, AppointmentDecision::Confirm, None)
            .await,
        Err(AppointmentError::NotFound)
    );

    let confirmed = service
        .decide(clinic.doctor_id, booked.id, AppointmentDecision::Confirm, None)
        .await
        .unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert_matches!(
        service
            .decide(clinic.doctor_id, booked.id, AppointmentDecision::Decline, None)
            .await,
        Err(AppointmentError::InvalidStatusTransition { .. })
    );

    let cancelled = service.cancel_appointment(owner, booked.id, Some("Feeling better")).await.unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.cancelled_by, Some(owner));
}

#[tokio::test]
async fn test_live_join_racing_a_cancellation_never_deadlocks() {
    if !live_database_enabled() {
        return;
    }
    for _ in 0..10 {
        let clinic = clinic("verified").await;
        let (holder, waiter) = (seed_patient(clinic.pool()).await, seed_patient(clinic.pool()).await);
        let service = clinic.service();
        let held = service.book_appointment(holder, &booking(&clinic, t(11, 0), t(11, 30))).await.unwrap();
        let spec = waitlist_spec(&clinic, t(11, 0), t(11, 30));

        let (joined, cancelled) = tokio::join!(
            WaitlistService::join(clinic.pool(), waiter, &spec),
            service.cancel_appointment(holder, held.id, None)
        );

        assert_eq!(cancelled.unwrap().status, AppointmentStatus::Cancelled);
        let occupying = AppointmentRepo::occupying_on_date(clinic.pool(), clinic.doctor_id, clinic.monday)
            .await
            .unwrap();
        match joined {
            // Joined first: the cancellation promoted the waiter.
            Ok(_) => {
                assert_eq!(occupying.len(), 1);
                assert_eq!(occupying[0].patient_id, waiter);
            }
            Err(WaitlistError::SlotOpen) => assert!(occupying.is_empty()),
            Err(other) => panic!("unexpected join failure: {other}"),
        }
    }
}
