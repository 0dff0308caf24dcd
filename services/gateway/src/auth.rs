use crate::error::AppError;
use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use types::ids::UserId;

/// Caller identity header; credentials are issued and checked upstream
pub const USER_ID_HEADER: &str = "X-User-Id";

pub struct AuthenticatedUser {
    pub user_id: UserId,
}

impl AuthenticatedUser {
    fn from_headers(parts: &Parts) -> Result<Option<Self>, AppError> {
        let Some(value) = parts.headers.get(USER_ID_HEADER) else {
            return Ok(None);
        };
        let user_id = value
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse::<UserId>().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("Malformed {} header", USER_ID_HEADER)))?;
        Ok(Some(Self { user_id }))
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(parts)?
            .ok_or_else(|| AppError::Unauthorized("Missing authentication credentials".to_string()))
    }
}

/// Anonymous callers are allowed where the user is optional
impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Self::from_headers(parts)
    }
}
