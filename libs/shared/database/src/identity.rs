use serde::Serialize;
use sqlx::PgExecutor;
use uuid::Uuid;

use shared_models::error::AppError;
use shared_models::scheduling::ConsultationType;

/// The doctor flags the scheduling core reads from the profile store.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DoctorRecord {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub virtual_available: bool,
    pub in_person_available: bool,
    pub verification_status: String,
}

impl DoctorRecord {
    pub fn offers(&self, consultation_type: ConsultationType) -> bool {
        match consultation_type {
            ConsultationType::Virtual => self.virtual_available,
            ConsultationType::InPerson => self.in_person_available,
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verification_status == "verified"
    }

    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or("your doctor")
    }
}

const DOCTOR_COLUMNS: &str = "id, full_name, virtual_available, in_person_available, verification_status";

pub async fn fetch_doctor<'e, E>(executor: E, doctor_id: Uuid) -> Result<Option<DoctorRecord>, AppError>
where
    E: PgExecutor<'e>,
{
    let query = format!("SELECT {DOCTOR_COLUMNS} FROM doctors WHERE id = $1");
    let doctor = sqlx::query_as::<_, DoctorRecord>(&query)
        .bind(doctor_id)
        .fetch_optional(executor)
        .await?;
    Ok(doctor)
}

/// Locks the doctor row for the rest of the transaction.
///
/// Every booking write for a doctor takes this lock first, which serializes
/// competing bookings for that doctor.
pub async fn lock_doctor<'e, E>(executor: E, doctor_id: Uuid) -> Result<DoctorRecord, AppError>
where
    E: PgExecutor<'e>,
{
    let query = format!("SELECT {DOCTOR_COLUMNS} FROM doctors WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, DoctorRecord>(&query)
        .bind(doctor_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| AppError::NotFound("Doctor not found".to_string()))
}

pub async fn patient_exists<'e, E>(executor: E, patient_id: Uuid) -> Result<bool, AppError>
where
    E: PgExecutor<'e>,
{
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM patients WHERE id = $1)")
        .bind(patient_id)
        .fetch_one(executor)
        .await?;
    Ok(exists)
}
