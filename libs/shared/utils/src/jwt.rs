use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use shared_models::auth::{JwtClaims, User};

type HmacSha256 = Hmac<Sha256>;

/// Verifies an HS256 token and returns the user it was issued to.
///
/// The scheduling role is read from `app_metadata.role`, then
/// `user_metadata.role`, then the top-level `role` claim; the auth provider
/// stores the generic "authenticated" role at the top level.
pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let mut parts = token.split('.');
    let (header_b64, claims_b64, signature_b64) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(c), Some(s), None) => (h, c, s),
        _ => return Err("Invalid token format".to_string()),
    };

    let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|e| {
        debug!("Failed to decode signature: {}", e);
        "Invalid signature encoding".to_string()
    })?;

    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(format!("{}.{}", header_b64, claims_b64).as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let claims_json = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| "Invalid claims encoding".to_string())?;

    let claims: JwtClaims = serde_json::from_str(&claims_json).map_err(|e| {
        debug!("Failed to parse claims: {}", e);
        "Invalid claims format".to_string()
    })?;

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err("Token expired".to_string());
        }
    }

    let role = scheduling_role(&claims);
    let created_at = claims
        .iat
        .and_then(|timestamp| Utc.timestamp_opt(timestamp as i64, 0).single());

    let user = User {
        id: claims.sub,
        email: claims.email,
        role,
        metadata: claims.user_metadata,
        created_at,
    };

    debug!("Token validated successfully for user: {}", user.id);
    Ok(user)
}

fn scheduling_role(claims: &JwtClaims) -> Option<String> {
    let from_metadata = |metadata: &Option<serde_json::Value>| {
        metadata
            .as_ref()
            .and_then(|value| value.get("role"))
            .and_then(|role| role.as_str())
            .map(str::to_string)
    };

    from_metadata(&claims.app_metadata)
        .or_else(|| from_metadata(&claims.user_metadata))
        .or_else(|| claims.role.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{JwtTestUtils, TestUser};

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn accepts_a_token_signed_with_the_secret() {
        let user = TestUser::doctor("doc@example.com");
        let token = JwtTestUtils::create_test_token(&user, SECRET, Some(1));

        let validated = validate_token(&token, SECRET).unwrap();
        assert_eq!(validated.id, user.id);
        assert_eq!(validated.role.as_deref(), Some("doctor"));
    }

    #[test]
    fn rejects_wrong_secret_expired_and_malformed_tokens() {
        let user = TestUser::patient("pat@example.com");

        let wrong = JwtTestUtils::create_invalid_signature_token(&user);
        assert_eq!(validate_token(&wrong, SECRET).unwrap_err(), "Invalid token signature");

        let expired = JwtTestUtils::create_expired_token(&user, SECRET);
        assert_eq!(validate_token(&expired, SECRET).unwrap_err(), "Token expired");

        assert!(validate_token("only.two", SECRET).is_err());
        assert!(validate_token(&JwtTestUtils::create_malformed_token(), SECRET).is_err());
        assert_eq!(validate_token("a.b.c", "").unwrap_err(), "JWT secret is not set");
    }

    #[test]
    fn metadata_role_wins_over_generic_claim() {
        let user = TestUser::patient("pat@example.com");
        let token = JwtTestUtils::create_provider_style_token(&user, SECRET);

        let validated = validate_token(&token, SECRET).unwrap();
        assert_eq!(validated.role.as_deref(), Some("patient"));
    }
}
