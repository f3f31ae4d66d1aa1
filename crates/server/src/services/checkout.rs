//! Order pricing, PayPal checkout and fulfilment.
//!
//! Orders are always priced on the server. A capture completes the order and
//! grants its credits (and subscription period) in one database transaction,
//! so a repeated or concurrent capture can never grant twice.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use pawdia_core::{
    CurrencyCode, OrderId, OrderKind, OrderStatus, Price, ProductId, SubscriptionPlan, UserId,
};

use crate::db::credits::apply_adjustment;
use crate::db::orders::mark_completed_in;
use crate::db::users::{lock_subscription, set_subscription_in};
use crate::db::{
    CreditReason, NewOrder, OrderRepository, ProductRepository, RepositoryError, UserRepository,
};
use crate::models::{Order, OrderItem, User};
use crate::services::paypal::{OrderRequest, PayPalClient, PaymentError};

/// Most lines accepted in one cart.
const MAX_CART_LINES: usize = 20;

/// Most units of one line.
const MAX_LINE_QUANTITY: u32 = 20;

/// Errors from checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The request doesn't describe a purchasable order.
    #[error("{0}")]
    InvalidOrder(String),

    /// Order does not exist or belongs to someone else.
    #[error("order not found")]
    OrderNotFound,

    /// The order is already closed.
    #[error("order is {0}")]
    NotPending(OrderStatus),

    /// PayPal did not complete the payment.
    #[error("payment was not completed (PayPal status {0})")]
    NotCompleted(String),

    /// PayPal request failed.
    #[error("payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Database operation failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Credit packs sold for one-off payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditPack {
    Small,
    Medium,
    Large,
}

impl CreditPack {
    /// All packs, smallest first.
    pub const ALL: [Self; 3] = [Self::Small, Self::Medium, Self::Large];

    /// Credits in the pack.
    #[must_use]
    pub const fn credits(self) -> u32 {
        match self {
            Self::Small => 10,
            Self::Medium => 50,
            Self::Large => 120,
        }
    }

    /// Pack price.
    #[must_use]
    pub fn price(self) -> Price {
        match self {
            Self::Small => Price::from_cents(499, CurrencyCode::USD),
            Self::Medium => Price::from_cents(1999, CurrencyCode::USD),
            Self::Large => Price::from_cents(3999, CurrencyCode::USD),
        }
    }

    /// Line item name.
    #[must_use]
    pub fn label(self) -> String {
        format!("{} credits", self.credits())
    }
}

/// One requested cart line.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    #[serde(default)]
    pub size: Option<String>,
    pub quantity: u32,
}

/// What the customer wants to buy.
#[derive(Debug, Clone)]
pub enum Purchase {
    Products(Vec<CartLine>),
    CreditPack(CreditPack),
    Subscription(SubscriptionPlan),
}

/// A purchase priced against the catalogue.
#[derive(Debug, Clone)]
pub struct PricedOrder {
    pub kind: OrderKind,
    pub items: Vec<OrderItem>,
    pub total: Price,
    pub credits: u32,
    pub plan: Option<SubscriptionPlan>,
}

impl PricedOrder {
    fn single(kind: OrderKind, name: String, price: Price, credits: u32) -> Self {
        Self {
            kind,
            items: vec![OrderItem {
                product_id: None,
                name,
                size: None,
                price: price.amount,
                quantity: 1,
            }],
            total: price,
            credits,
            plan: None,
        }
    }
}

/// A local order with its PayPal approval link.
#[derive(Debug, Clone)]
pub struct StartedCheckout {
    pub order: Order,
    pub paypal_order_id: String,
    pub approval_url: String,
}

/// Result of a capture.
#[derive(Debug, Clone)]
pub struct Fulfilment {
    pub order: Order,
    /// Whether this call completed the order (and granted its benefits).
    pub newly_completed: bool,
    /// The user after fulfilment, when this call completed the order.
    pub user: Option<User>,
}

/// Checkout service.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
    orders: OrderRepository<'a>,
    products: ProductRepository<'a>,
}

impl<'a> CheckoutService<'a> {
    /// Create a new checkout service.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            orders: OrderRepository::new(pool),
            products: ProductRepository::new(pool),
        }
    }

    /// Price a purchase. Client-sent prices are never consulted.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::InvalidOrder` for empty carts, bad quantities,
    /// unknown or inactive products, unavailable sizes, or the free plan.
    pub async fn price(&self, purchase: &Purchase) -> Result<PricedOrder, CheckoutError> {
        match purchase {
            Purchase::CreditPack(pack) => Ok(PricedOrder::single(
                OrderKind::CreditPack,
                pack.label(),
                pack.price(),
                pack.credits(),
            )),
            Purchase::Subscription(plan) => {
                if !plan.is_paid() {
                    return Err(CheckoutError::InvalidOrder(
                        "the free plan cannot be purchased".to_owned(),
                    ));
                }
                let mut priced = PricedOrder::single(
                    OrderKind::Subscription,
                    format!("{} plan (30 days)", plan.display_name()),
                    plan.price(),
                    plan.monthly_credits(),
                );
                priced.plan = Some(*plan);
                Ok(priced)
            }
            Purchase::Products(lines) => self.price_cart(lines).await,
        }
    }

    async fn price_cart(&self, lines: &[CartLine]) -> Result<PricedOrder, CheckoutError> {
        validate_cart(lines)?;

        let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let catalogue: HashMap<ProductId, _> = self
            .products
            .get_many(&ids)
            .await?
            .into_iter()
            .filter(|p| p.is_active)
            .map(|p| (p.id, p))
            .collect();

        let mut items = Vec::with_capacity(lines.len());
        let mut currency: Option<CurrencyCode> = None;
        let mut total = Decimal::ZERO;

        for line in lines {
            let product = catalogue.get(&line.product_id).ok_or_else(|| {
                CheckoutError::InvalidOrder(format!("product {} is not available", line.product_id))
            })?;
            let size = line.size.as_deref().map(str::trim).filter(|s| !s.is_empty());
            if !product.accepts_size(size) {
                return Err(CheckoutError::InvalidOrder(format!(
                    "size {} is not available for {}",
                    size.unwrap_or("(none)"),
                    product.name
                )));
            }
            if *currency.get_or_insert(product.price.currency_code) != product.price.currency_code {
                return Err(CheckoutError::InvalidOrder(
                    "all items must use the same currency".to_owned(),
                ));
            }

            let item = OrderItem {
                product_id: Some(product.id),
                name: product.name.clone(),
                size: size.map(str::to_owned),
                price: product.price.amount,
                quantity: line.quantity,
            };
            total += item.line_total();
            items.push(item);
        }

        Ok(PricedOrder {
            kind: OrderKind::Product,
            items,
            total: Price::new(total, currency.unwrap_or_default()),
            credits: 0,
            plan: None,
        })
    }

    /// Store a PENDING order and create the matching PayPal order.
    ///
    /// If PayPal rejects the order the local order is marked FAILED.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Payment` if PayPal fails.
    #[instrument(skip(self, priced, paypal, return_url, cancel_url), fields(kind = ?priced.kind))]
    pub async fn start(
        &self,
        user_id: UserId,
        priced: PricedOrder,
        paypal: &PayPalClient,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<StartedCheckout, CheckoutError> {
        let description = priced
            .items
            .iter()
            .map(|i| i.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let order = self
            .orders
            .create(&NewOrder {
                user_id,
                kind: priced.kind,
                items: priced.items,
                total_amount: priced.total.amount,
                currency: priced.total.currency_code,
                credits_granted: priced.credits,
                subscription_plan: priced.plan,
            })
            .await?;

        let reference = order.id.to_string();
        let created = match paypal
            .create_order(&OrderRequest {
                amount: priced.total,
                reference: &reference,
                description: &description,
                return_url,
                cancel_url,
            })
            .await
        {
            Ok(created) => created,
            Err(e) => {
                if let Err(mark_err) = self.orders.mark_status(order.id, OrderStatus::Failed).await {
                    tracing::error!(order_id = %order.id, error = %mark_err, "Failed to mark order failed");
                }
                return Err(e.into());
            }
        };

        let order = self
            .orders
            .attach_paypal_order(order.id, &created.paypal_order_id)
            .await?;

        tracing::info!(order_id = %order.id, paypal_order_id = %created.paypal_order_id, "Checkout started");

        Ok(StartedCheckout {
            order,
            paypal_order_id: created.paypal_order_id,
            approval_url: created.approval_url,
        })
    }

    /// Capture an approved PayPal order and fulfil it.
    ///
    /// Capturing an order that is already COMPLETED returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::OrderNotFound` for unknown or foreign orders.
    /// Returns `CheckoutError::NotPending` for cancelled or failed orders.
    /// Returns `CheckoutError::NotCompleted` if PayPal didn't complete the payment.
    #[instrument(skip(self, paypal))]
    pub async fn capture(
        &self,
        user_id: UserId,
        paypal_order_id: &str,
        paypal: &PayPalClient,
    ) -> Result<Fulfilment, CheckoutError> {
        let order = self
            .orders
            .get_by_paypal_order_id(paypal_order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or(CheckoutError::OrderNotFound)?;

        match order.status {
            OrderStatus::Pending => {}
            OrderStatus::Completed => {
                tracing::info!(order_id = %order.id, "Order already captured");
                return Ok(Fulfilment {
                    order,
                    newly_completed: false,
                    user: None,
                });
            }
            other => return Err(CheckoutError::NotPending(other)),
        }

        let captured = paypal.capture_order(paypal_order_id).await?;
        let capture_id = match captured.capture_id.as_deref() {
            Some(id) if captured.is_completed() => id,
            _ => {
                tracing::warn!(order_id = %order.id, status = %captured.status, "Capture not completed");
                self.orders.mark_status(order.id, OrderStatus::Failed).await?;
                return Err(CheckoutError::NotCompleted(captured.status));
            }
        };

        self.fulfil(order.id, capture_id).await
    }

    /// Complete a PENDING order and grant what it bought, atomically.
    ///
    /// Only the call that flips the order to COMPLETED grants anything;
    /// repeated or concurrent calls return the order unchanged.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::OrderNotFound` if the order does not exist.
    /// Returns `CheckoutError::Repository` if a database operation fails.
    pub async fn fulfil(
        &self,
        order_id: OrderId,
        capture_id: &str,
    ) -> Result<Fulfilment, CheckoutError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let Some(order) = mark_completed_in(&mut tx, order_id, capture_id).await? else {
            // Lost a race with another capture of the same order
            tx.rollback().await.map_err(RepositoryError::from)?;
            let order = self.orders.get(order_id).await?.ok_or(CheckoutError::OrderNotFound)?;
            return Ok(Fulfilment {
                order,
                newly_completed: false,
                user: None,
            });
        };

        let reference = order.id.to_string();

        if let Some(plan) = order.subscription_plan {
            let current = lock_subscription(&mut tx, order.user_id).await?;
            set_subscription_in(&mut tx, order.user_id, &current.renewed(plan, Utc::now())).await?;
        }

        if order.credits_granted > 0 {
            let delta = i32::try_from(order.credits_granted)
                .map_err(|_| RepositoryError::Conflict("credit amount out of range".to_owned()))?;
            let reason = if order.kind == OrderKind::Subscription {
                CreditReason::Subscription
            } else {
                CreditReason::Purchase
            };
            apply_adjustment(&mut tx, order.user_id, delta, reason, Some(&reference))
                .await?
                .ok_or(RepositoryError::NotFound)?;
        }

        tx.commit().await.map_err(RepositoryError::from)?;

        let user = UserRepository::new(self.pool).get_by_id(order.user_id).await?;

        tracing::info!(
            order_id = %order.id,
            user_id = %order.user_id,
            credits = order.credits_granted,
            "Order fulfilled"
        );

        Ok(Fulfilment {
            order,
            newly_completed: true,
            user,
        })
    }

    /// Cancel one of the caller's PENDING orders.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::OrderNotFound` for unknown or foreign orders.
    /// Returns `CheckoutError::NotPending` if the order is already closed.
    pub async fn cancel(&self, user_id: UserId, order_id: OrderId) -> Result<Order, CheckoutError> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or(CheckoutError::OrderNotFound)?;

        self.orders
            .mark_status(order.id, OrderStatus::Cancelled)
            .await?
            .ok_or(CheckoutError::NotPending(order.status))
    }
}

/// Check cart shape before touching the database.
fn validate_cart(lines: &[CartLine]) -> Result<(), CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::InvalidOrder("cart is empty".to_owned()));
    }
    if lines.len() > MAX_CART_LINES {
        return Err(CheckoutError::InvalidOrder(format!(
            "at most {MAX_CART_LINES} items per order"
        )));
    }
    if lines
        .iter()
        .any(|l| l.quantity == 0 || l.quantity > MAX_LINE_QUANTITY)
    {
        return Err(CheckoutError::InvalidOrder(format!(
            "quantity must be between 1 and {MAX_LINE_QUANTITY}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(1),
            size: None,
            quantity,
        }
    }

    #[test]
    fn test_credit_pack_catalogue() {
        assert_eq!(CreditPack::Small.credits(), 10);
        assert_eq!(CreditPack::Small.price().display(), "$4.99");
        assert_eq!(CreditPack::Medium.credits(), 50);
        assert_eq!(CreditPack::Medium.price().display(), "$19.99");
        assert_eq!(CreditPack::Large.credits(), 120);
        assert_eq!(CreditPack::Large.price().display(), "$39.99");
        assert_eq!(CreditPack::Medium.label(), "50 credits");
    }

    #[test]
    fn test_credit_pack_deserializes_lowercase() {
        let pack: CreditPack = serde_json::from_str("\"large\"").unwrap();
        assert_eq!(pack, CreditPack::Large);
        assert!(serde_json::from_str::<CreditPack>("\"huge\"").is_err());
    }

    #[test]
    fn test_validate_cart() {
        assert!(validate_cart(&[]).is_err());
        assert!(validate_cart(&[line(0)]).is_err());
        assert!(validate_cart(&[line(MAX_LINE_QUANTITY + 1)]).is_err());
        assert!(validate_cart(&vec![line(1); MAX_CART_LINES + 1]).is_err());
        assert!(validate_cart(&[line(1), line(MAX_LINE_QUANTITY)]).is_ok());
    }

    #[test]
    fn test_single_item_order() {
        let priced = PricedOrder::single(
            OrderKind::CreditPack,
            CreditPack::Small.label(),
            CreditPack::Small.price(),
            10,
        );
        assert_eq!(priced.items.len(), 1);
        assert_eq!(priced.items.first().unwrap().line_total(), Decimal::new(499, 2));
        assert_eq!(priced.total.to_paypal_value(), "4.99");
        assert!(priced.plan.is_none());
    }
}
