//! PayPal checkout handlers.
//!
//! Flow: `create-order` prices the purchase and returns a PayPal approval
//! URL; after the buyer approves, the SPA calls `capture-order`, which
//! completes the order and grants credits. A capture can be retried safely.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use pawdia_core::{OrderId, Price};

use crate::db::OrderRepository;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::models::{Order, User};
use crate::routes::response::{ApiJson, ok};
use crate::services::checkout::{
    CartLine, CheckoutService, CreditPack, Fulfilment, Purchase, StartedCheckout,
};
use crate::state::AppState;

/// Body of `POST /api/payments/create-order`: either cart items or a credit pack.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub items: Vec<CartLine>,
    #[serde(default)]
    pub credit_pack: Option<CreditPack>,
}

impl CreateOrderRequest {
    fn into_purchase(self) -> Result<Purchase> {
        match (self.items.is_empty(), self.credit_pack) {
            (true, Some(pack)) => Ok(Purchase::CreditPack(pack)),
            (false, None) => Ok(Purchase::Products(self.items)),
            (true, None) => Err(AppError::BadRequest(
                "Provide items or a creditPack".to_owned(),
            )),
            (false, Some(_)) => Err(AppError::BadRequest(
                "Buy items and credit packs in separate orders".to_owned(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOrderRequest {
    pub paypal_order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrderRequest {
    pub order_id: OrderId,
}

/// Response for a started checkout.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: OrderId,
    pub paypal_order_id: String,
    pub approval_url: String,
    pub total: Price,
}

impl From<StartedCheckout> for CheckoutResponse {
    fn from(started: StartedCheckout) -> Self {
        Self {
            order_id: started.order.id,
            total: started.order.total(),
            paypal_order_id: started.paypal_order_id,
            approval_url: started.approval_url,
        }
    }
}

/// Response for a capture.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResponse {
    pub order: Order,
    pub already_captured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order: Order,
}

/// A credit pack offer.
#[derive(Debug, Serialize)]
pub struct CreditPackOffer {
    pub id: CreditPack,
    pub credits: u32,
    pub price: Price,
    #[serde(rename = "displayPrice")]
    pub display_price: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditPacksResponse {
    pub credit_packs: Vec<CreditPackOffer>,
}

/// GET /api/payments/credit-packs
pub async fn credit_packs() -> Response {
    let credit_packs = CreditPack::ALL
        .into_iter()
        .map(|pack| CreditPackOffer {
            id: pack,
            credits: pack.credits(),
            price: pack.price(),
            display_price: pack.price().display(),
        })
        .collect();
    ok(CreditPacksResponse { credit_packs }).into_response()
}

/// POST /api/payments/create-order
///
/// # Errors
///
/// Returns 503 if PayPal isn't configured, 400 for an invalid purchase and
/// 502 if PayPal rejects the order.
pub async fn create_order(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    ApiJson(req): ApiJson<CreateOrderRequest>,
) -> Result<Response> {
    let paypal = state.paypal()?;
    let purchase = req.into_purchase()?;

    let checkout = CheckoutService::new(state.pool());
    let priced = checkout.price(&purchase).await?;

    let frontend = &state.config().frontend_url;
    let started = checkout
        .start(
            caller.id,
            priced,
            paypal,
            &format!("{frontend}/checkout/success"),
            &format!("{frontend}/checkout/cancel"),
        )
        .await?;

    Ok(ok(CheckoutResponse::from(started)).into_response())
}

/// POST /api/payments/capture-order
///
/// # Errors
///
/// Returns 404 for orders that aren't the caller's, 402 if PayPal didn't
/// complete the payment, 400 for closed orders and 503 if PayPal isn't
/// configured.
pub async fn capture_order(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    ApiJson(req): ApiJson<CaptureOrderRequest>,
) -> Result<Response> {
    let paypal = state.paypal()?;
    let paypal_order_id = req.paypal_order_id.trim();
    if paypal_order_id.is_empty() {
        return Err(AppError::BadRequest("paypalOrderId is required".to_owned()));
    }

    let Fulfilment {
        order,
        newly_completed,
        user,
    } = CheckoutService::new(state.pool())
        .capture(caller.id, paypal_order_id, paypal)
        .await?;

    if newly_completed
        && let Some(user) = &user
        && let Err(e) = state.email().send_order_confirmation(user, &order).await
    {
        tracing::error!(order_id = %order.id, error = %e, "Failed to send order confirmation");
    }

    Ok(ok(CaptureResponse {
        order,
        already_captured: !newly_completed,
        user: user.map(|u| u.as_of(chrono::Utc::now())),
    })
    .into_response())
}

/// POST /api/payments/cancel-order
///
/// # Errors
///
/// Returns 404 for orders that aren't the caller's and 400 if the order is
/// no longer pending.
pub async fn cancel_order(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    ApiJson(req): ApiJson<CancelOrderRequest>,
) -> Result<Response> {
    let order = CheckoutService::new(state.pool())
        .cancel(caller.id, req.order_id)
        .await?;

    tracing::info!(order_id = %order.id, "Order cancelled");
    Ok(ok(OrderResponse { order }).into_response())
}

/// GET /api/payments/orders/{id}
///
/// # Errors
///
/// Returns 404 for unknown orders and orders owned by someone else.
pub async fn get_order(
    State(state): State<AppState>,
    RequireAuth(caller): RequireAuth,
    Path(id): Path<i32>,
) -> Result<Response> {
    let order = OrderRepository::new(state.pool())
        .get(OrderId::new(id))
        .await?
        .filter(|o| o.user_id == caller.id || caller.is_admin)
        .ok_or_else(|| AppError::NotFound("Order not found".to_owned()))?;

    Ok(ok(OrderResponse { order }).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(items: usize, pack: Option<CreditPack>) -> CreateOrderRequest {
        CreateOrderRequest {
            items: (0..items)
                .map(|_| CartLine {
                    product_id: pawdia_core::ProductId::new(1),
                    size: None,
                    quantity: 1,
                })
                .collect(),
            credit_pack: pack,
        }
    }

    #[test]
    fn test_exactly_one_purchase_kind() {
        assert!(matches!(
            request(0, Some(CreditPack::Small)).into_purchase(),
            Ok(Purchase::CreditPack(CreditPack::Small))
        ));
        assert!(matches!(
            request(2, None).into_purchase(),
            Ok(Purchase::Products(lines)) if lines.len() == 2
        ));
        assert!(request(0, None).into_purchase().is_err());
        assert!(request(1, Some(CreditPack::Large)).into_purchase().is_err());
    }
}
