use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request},
    middleware::Next,
    response::Response,
};

use headers::{authorization::Bearer, Authorization, HeaderMapExt};

use shared_config::AppConfig;
use shared_models::auth::{AccessScope, User};
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Verifies the bearer token and stores the [`User`] in request extensions.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = request
        .headers()
        .typed_try_get::<Authorization<Bearer>>()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let user = validate_token(bearer.token(), &config.supabase_jwt_secret).map_err(AppError::Auth)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// The authenticated caller, resolved to an [`AccessScope`] once per request.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub AccessScope);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<User>()
            .ok_or_else(|| AppError::Auth("User not found in request extensions".to_string()))?;

        AccessScope::from_user(user).map(Caller)
    }
}
