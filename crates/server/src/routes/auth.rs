//! Authentication API handlers.
//!
//! All endpoints live under `/api/auth` and sit behind the strict rate
//! limiter. Endpoints that take an email address respond identically whether
//! or not an account exists.

use axum::{extract::State, response::IntoResponse, response::Response};
use serde::{Deserialize, Serialize};

use crate::db::VerifyOutcome;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::RequireAuth;
use crate::models::User;
use crate::routes::response::{ApiJson, created, message, ok};
use crate::services::auth::AuthService;
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Registration request.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request carrying only an email address.
#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

/// Request carrying a one-time token.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

/// Password reset completion.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Password change for a signed-in user.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Access token plus the signed-in user.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: User,
}

/// A user profile.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

/// Verification result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub message: &'static str,
    pub already_verified: bool,
    pub user: User,
}

// =============================================================================
// Handlers
// =============================================================================

/// Register a new account.
///
/// POST /api/auth/register
///
/// Sends a verification email; a delivery failure is logged and does not
/// fail registration.
///
/// # Errors
///
/// Returns 400 for invalid input or an email that is already registered.
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<Response> {
    let auth = AuthService::new(state.pool());
    let user = auth
        .register(
            &req.name,
            &req.email,
            &req.password,
            state.config().credits.signup_bonus,
        )
        .await?;

    send_verification(&state, &auth, &user).await;

    let token = state.jwt().issue(&user)?;
    add_breadcrumb("auth", "Registered", None);

    Ok(created(SessionResponse {
        token,
        user: user.as_of(chrono::Utc::now()),
    })
    .into_response())
}

/// Sign in with email and password.
///
/// POST /api/auth/login
///
/// # Errors
///
/// Returns 401 for an unknown email or a wrong password.
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Response> {
    let user = AuthService::new(state.pool())
        .login(&req.email, &req.password)
        .await?;
    let token = state.jwt().issue(&user)?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(ok(SessionResponse {
        token,
        user: user.as_of(chrono::Utc::now()),
    })
    .into_response())
}

/// Current user.
///
/// GET /api/auth/me
///
/// # Errors
///
/// Returns 401 without a valid token and 404 if the account was deleted.
pub async fn me(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
) -> Result<Response> {
    let user = AuthService::new(state.pool()).get_user(caller.id).await?;
    Ok(ok(UserResponse {
        user: user.as_of(chrono::Utc::now()),
    })
    .into_response())
}

/// Verify an email address from a token posted by the SPA.
///
/// POST /api/auth/verify-email
///
/// # Errors
///
/// Returns 400 for an unknown or expired token.
pub async fn verify_email(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TokenRequest>,
) -> Result<Response> {
    let outcome = AuthService::new(state.pool())
        .verify_email(&req.token)
        .await?;

    let response = match outcome {
        VerifyOutcome::Verified(user) => VerifyResponse {
            message: "Email verified",
            already_verified: false,
            user,
        },
        VerifyOutcome::AlreadyVerified(user) => VerifyResponse {
            message: "Email already verified",
            already_verified: true,
            user,
        },
        VerifyOutcome::Expired => {
            return Err(AppError::BadRequest(
                "Verification link has expired".to_owned(),
            ));
        }
        VerifyOutcome::Invalid => {
            return Err(AppError::BadRequest(
                "Invalid verification link".to_owned(),
            ));
        }
    };

    Ok(ok(response).into_response())
}

/// Send a fresh verification email.
///
/// POST /api/auth/resend-verification
///
/// # Errors
///
/// Returns 500 only on database failure.
pub async fn resend_verification(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<EmailRequest>,
) -> Result<Response> {
    let auth = AuthService::new(state.pool());
    if let Some(user) = auth.find_unverified(&req.email).await? {
        send_verification(&state, &auth, &user).await;
    }

    Ok(message(
        "If that account exists and is unverified, a new verification email has been sent",
    ))
}

/// Start a password reset.
///
/// POST /api/auth/forgot-password
///
/// # Errors
///
/// Returns 500 only on database failure.
pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<EmailRequest>,
) -> Result<Response> {
    if let Some((user, token)) = AuthService::new(state.pool())
        .start_password_reset(&req.email)
        .await?
        && let Err(e) = state.email().send_password_reset(&user, &token.raw).await
    {
        tracing::error!(user_id = %user.id, error = %e, "Failed to send password reset email");
    }

    Ok(message(
        "If an account exists for that email, a password reset link has been sent",
    ))
}

/// Complete a password reset.
///
/// POST /api/auth/reset-password
///
/// # Errors
///
/// Returns 400 for a weak password or an invalid/expired token.
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> Result<Response> {
    AuthService::new(state.pool())
        .reset_password(&req.token, &req.password)
        .await?;

    Ok(message("Password has been reset. You can now sign in"))
}

/// Change the signed-in user's password.
///
/// POST /api/auth/change-password
///
/// # Errors
///
/// Returns 401 if the current password is wrong, 400 if the new one is weak.
pub async fn change_password(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<Response> {
    AuthService::new(state.pool())
        .change_password(caller.id, &req.current_password, &req.new_password)
        .await?;

    Ok(message("Password changed"))
}

/// Issue a verification link and email it. Failures are only logged.
async fn send_verification(state: &AppState, auth: &AuthService<'_>, user: &User) {
    let link = match auth.issue_verification(user).await {
        Ok(link) => link,
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Failed to create verification link");
            return;
        }
    };

    if let Err(e) = state.email().send_verification(user, &link.short_id).await {
        tracing::error!(user_id = %user.id, error = %e, "Failed to send verification email");
    }
}
