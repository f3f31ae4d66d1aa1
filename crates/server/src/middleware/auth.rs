//! Bearer-token authentication extractors.
//!
//! Handlers take [`RequireAuth`] or [`RequireAdmin`] to demand a valid access
//! token, or [`OptionalAuth`] when anonymous callers are allowed.
//!
//! The token only identifies the account. Admin rights come from the stored
//! row, so demoted or deleted accounts lose access immediately.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use pawdia_core::UserId;

use crate::db::UserRepository;
use crate::error::{AppError, set_sentry_user};
use crate::state::AppState;

/// The caller identified by a valid access token, as currently stored.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub is_admin: bool,
}

/// Extractor that requires a valid `Authorization: Bearer` token.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(RequireAuth(user): RequireAuth) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireAuth(pub AuthUser);

/// Extractor that requires an admin's access token.
pub struct RequireAdmin(pub AuthUser);

/// Extractor that identifies the caller when a token is present.
///
/// Missing or invalid tokens yield `None` instead of rejecting the request.
pub struct OptionalAuth(pub Option<AuthUser>);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_owned()))?;
        let user = authenticate(state, token).await?;
        set_sentry_user(&user.id, Some(&user.email));
        Ok(Self(user))
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireAuth(user) = RequireAuth::from_request_parts(parts, state).await?;
        if !user.is_admin {
            tracing::warn!(user_id = %user.id, path = %parts.uri.path(), "Non-admin on admin route");
            return Err(AppError::Forbidden("Admin access required".to_owned()));
        }
        Ok(Self(user))
    }
}

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(Self(None));
        };
        Ok(Self(authenticate(state, token).await.ok()))
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header.
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

async fn authenticate(state: &AppState, token: &str) -> Result<AuthUser, AppError> {
    let claims = state.jwt().validate(token)?;
    let user = UserRepository::new(state.pool())
        .get_by_id(claims.user_id()?)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_owned()))?;

    Ok(AuthUser {
        id: user.id,
        email: user.email.to_string(),
        is_admin: user.is_admin,
    })
}
