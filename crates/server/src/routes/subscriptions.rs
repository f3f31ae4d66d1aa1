//! Subscription plans.
//!
//! A subscription is a prepaid 30-day period bought with a one-off PayPal
//! order. It is activated by `POST /api/payments/capture-order`.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use pawdia_core::{Price, Subscription, SubscriptionPlan};

use crate::db::UserRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::routes::payments::CheckoutResponse;
use crate::routes::response::{ApiJson, ok};
use crate::services::checkout::{CheckoutService, Purchase};
use crate::state::AppState;

/// A plan offer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOffer {
    pub id: SubscriptionPlan,
    pub name: &'static str,
    pub price: Price,
    pub display_price: String,
    pub monthly_credits: u32,
    pub period_days: i64,
}

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub plans: Vec<PlanOffer>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub plan: SubscriptionPlan,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub subscription: Subscription,
    pub is_active: bool,
}

/// GET /api/subscriptions/plans
pub async fn plans() -> Response {
    let plans = SubscriptionPlan::PAID
        .into_iter()
        .map(|plan| PlanOffer {
            id: plan,
            name: plan.display_name(),
            price: plan.price(),
            display_price: plan.price().display(),
            monthly_credits: plan.monthly_credits(),
            period_days: pawdia_core::SUBSCRIPTION_PERIOD_DAYS,
        })
        .collect();
    ok(PlansResponse { plans }).into_response()
}

/// POST /api/subscriptions/subscribe
///
/// # Errors
///
/// Returns 503 if PayPal isn't configured, 400 for the free plan and 502 if
/// PayPal rejects the order.
pub async fn subscribe(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    ApiJson(req): ApiJson<SubscribeRequest>,
) -> Result<Response> {
    let paypal = state.paypal()?;

    let checkout = CheckoutService::new(state.pool());
    let priced = checkout.price(&Purchase::Subscription(req.plan)).await?;

    let frontend = &state.config().frontend_url;
    let started = checkout
        .start(
            caller.id,
            priced,
            paypal,
            &format!("{frontend}/subscription/success"),
            &format!("{frontend}/subscription/cancel"),
        )
        .await?;

    Ok(ok(CheckoutResponse::from(started)).into_response())
}

/// GET /api/subscriptions/status
///
/// # Errors
///
/// Returns 404 if the account was deleted.
pub async fn status(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
) -> Result<Response> {
    let user = UserRepository::new(state.pool())
        .get_by_id(caller.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_owned()))?;

    let now = Utc::now();
    Ok(ok(StatusResponse {
        subscription: user.subscription.effective_at(now),
        is_active: user.subscription.is_active_at(now),
    })
    .into_response())
}

/// POST /api/subscriptions/cancel
///
/// Credits and the paid period are kept.
///
/// # Errors
///
/// Returns 400 if there is no active subscription.
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
) -> Result<Response> {
    let user = UserRepository::new(state.pool())
        .cancel_subscription(caller.id)
        .await?
        .ok_or_else(|| AppError::BadRequest("No active subscription to cancel".to_owned()))?;
    tracing::info!(user_id = %caller.id, plan = ?user.subscription.plan, "Subscription cancelled");

    let now = Utc::now();
    Ok(ok(StatusResponse {
        subscription: user.subscription.effective_at(now),
        is_active: user.subscription.is_active_at(now),
    })
    .into_response())
}
