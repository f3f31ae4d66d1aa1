//! Signed-in user's profile, credits and orders.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use pawdia_core::{Credits, Subscription};

use crate::db::{CreditLedger, CreditReason, CreditTransaction, OrderRepository, UserRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{Order, User};
use crate::routes::response::{ApiJson, ok};
use crate::services::credits::CreditService;
use crate::state::AppState;

/// Longest accepted display name.
const MAX_NAME_LENGTH: usize = 100;

/// Profile update.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
}

/// Credit spend request.
#[derive(Debug, Deserialize)]
pub struct UseCreditsRequest {
    pub amount: u32,
    #[serde(default)]
    pub reference: Option<String>,
}

/// History query.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

const fn default_history_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub credits: Credits,
    pub subscription: Subscription,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub transactions: Vec<CreditTransaction>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UseCreditsResponse {
    pub credits_remaining: Credits,
}

#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
}

async fn load_user(state: &AppState, caller: &crate::middleware::AuthUser) -> Result<User> {
    UserRepository::new(state.pool())
        .get_by_id(caller.id)
        .await?
        .map(|u| u.as_of(Utc::now()))
        .ok_or_else(|| AppError::NotFound("User not found".to_owned()))
}

/// GET /api/users/profile
///
/// # Errors
///
/// Returns 404 if the account was deleted.
pub async fn profile(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
) -> Result<Response> {
    let user = load_user(&state, &caller).await?;
    Ok(ok(UserResponse { user }).into_response())
}

/// PUT /api/users/profile
///
/// # Errors
///
/// Returns 400 for an empty or overlong name.
pub async fn update_profile(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Response> {
    let name = req.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LENGTH {
        return Err(AppError::BadRequest(format!(
            "name must be 1-{MAX_NAME_LENGTH} characters"
        )));
    }

    let user = UserRepository::new(state.pool())
        .update_profile(caller.id, name)
        .await?;

    Ok(ok(UserResponse {
        user: user.as_of(Utc::now()),
    })
    .into_response())
}

/// GET /api/users/credits
///
/// # Errors
///
/// Returns 404 if the account was deleted.
pub async fn credits(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
) -> Result<Response> {
    let user = load_user(&state, &caller).await?;
    Ok(ok(CreditsResponse {
        credits: user.credits,
        subscription: user.subscription,
    })
    .into_response())
}

/// GET /api/users/credits/history
///
/// # Errors
///
/// Returns 500 on database failure.
pub async fn credit_history(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    Query(query): Query<HistoryQuery>,
) -> Result<Response> {
    let transactions = CreditLedger::new(state.pool())
        .history(caller.id, query.limit)
        .await?;
    Ok(ok(HistoryResponse { transactions }).into_response())
}

/// POST /api/users/credits/use
///
/// # Errors
///
/// Returns 402 if the balance is too low and 400 for a zero amount.
pub async fn use_credits(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    ApiJson(req): ApiJson<UseCreditsRequest>,
) -> Result<Response> {
    let remaining = CreditService::new(state.pool())
        .spend(
            caller.id,
            req.amount,
            CreditReason::Usage,
            req.reference.as_deref(),
        )
        .await?;

    tracing::info!(user_id = %caller.id, amount = req.amount, %remaining, "Credits used");

    Ok(ok(UseCreditsResponse {
        credits_remaining: remaining,
    })
    .into_response())
}

/// GET /api/users/orders
///
/// # Errors
///
/// Returns 500 on database failure.
pub async fn orders(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
) -> Result<Response> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(caller.id)
        .await?;
    Ok(ok(OrdersResponse { orders }).into_response())
}
