use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use shared_config::AppConfig;
use shared_models::{auth::User, error::AppError};

use crate::jwt::{validate_token, TokenError};

/// Authenticated caller. The token is read from the `Authorization: Bearer` header,
/// or from the `access_token` query parameter for clients (such as `EventSource`)
/// that cannot set headers.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AppConfig>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<AppConfig>::from_ref(state);

        let token = bearer_token(parts)
            .or_else(|| query_token(parts))
            .ok_or_else(|| AppError::Auth("Missing access token".to_string()))?;

        let user = validate_token(&token, &config.supabase_jwt_secret).map_err(|e| match e {
            TokenError::MissingSecret => AppError::Internal(e.to_string()),
            _ => AppError::Auth(e.to_string()),
        })?;

        Ok(AuthenticatedUser(user))
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn query_token(parts: &Parts) -> Option<String> {
    parts.uri.query()?.split('&').find_map(|pair| {
        pair.strip_prefix("access_token=")
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    })
}
