use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

/// The caller's capability, resolved once per request from the verified user.
///
/// Queries take a scope instead of re-checking the role string, so a patient
/// and a doctor reading "my appointments" go through the same code with a
/// different filter column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    Patient(Uuid),
    Doctor(Uuid),
}

impl AccessScope {
    pub fn from_user(user: &User) -> Result<Self, AppError> {
        let id = Uuid::parse_str(&user.id)
            .map_err(|_| AppError::Auth("User id is not a valid UUID".to_string()))?;

        match user.role.as_deref() {
            Some("patient") => Ok(AccessScope::Patient(id)),
            Some("doctor") => Ok(AccessScope::Doctor(id)),
            Some(other) => Err(AppError::Forbidden(format!(
                "Role '{}' cannot access scheduling",
                other
            ))),
            None => Err(AppError::Forbidden("User has no role".to_string())),
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            AccessScope::Patient(id) | AccessScope::Doctor(id) => *id,
        }
    }

    pub fn patient_id(&self) -> Result<Uuid, AppError> {
        match self {
            AccessScope::Patient(id) => Ok(*id),
            AccessScope::Doctor(_) => Err(AppError::Forbidden(
                "Only patients can perform this action".to_string(),
            )),
        }
    }

    pub fn doctor_id(&self) -> Result<Uuid, AppError> {
        match self {
            AccessScope::Doctor(id) => Ok(*id),
            AccessScope::Patient(_) => Err(AppError::Forbidden(
                "Only doctors can perform this action".to_string(),
            )),
        }
    }

    /// Column used to restrict row-level reads to the caller.
    pub fn owner_column(&self) -> &'static str {
        match self {
            AccessScope::Patient(_) => "patient_id",
            AccessScope::Doctor(_) => "doctor_id",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn user(role: Option<&str>) -> User {
        User {
            id: Uuid::new_v4().to_string(),
            email: None,
            role: role.map(str::to_string),
            metadata: None,
            created_at: None,
        }
    }

    #[test]
    fn resolves_patient_and_doctor_scopes() {
        let patient = user(Some("patient"));
        let scope = AccessScope::from_user(&patient).unwrap();
        assert_eq!(scope.user_id().to_string(), patient.id);
        assert_eq!(scope.owner_column(), "patient_id");
        assert!(scope.doctor_id().is_err());

        let doctor = user(Some("doctor"));
        let scope = AccessScope::from_user(&doctor).unwrap();
        assert_matches!(scope, AccessScope::Doctor(_));
        assert!(scope.patient_id().is_err());
    }

    #[test]
    fn rejects_unknown_roles_and_bad_ids() {
        assert_matches!(AccessScope::from_user(&user(Some("admin"))), Err(AppError::Forbidden(_)));
        assert_matches!(AccessScope::from_user(&user(None)), Err(AppError::Forbidden(_)));

        let mut broken = user(Some("patient"));
        broken.id = "not-a-uuid".to_string();
        assert_matches!(AccessScope::from_user(&broken), Err(AppError::Auth(_)));
    }
}
