//! Order types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use pawdia_core::{
    CurrencyCode, OrderId, OrderKind, OrderStatus, Price, ProductId, SubscriptionPlan, UserId,
};

/// A line item snapshot, frozen at order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    /// Catalogue product, if the item came from the catalogue.
    pub product_id: Option<ProductId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Unit price.
    pub price: Decimal,
    pub quantity: u32,
}

impl OrderItem {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// An order paid through PayPal.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub kind: OrderKind,
    pub items: Vec<OrderItem>,
    pub total_amount: Decimal,
    pub currency: CurrencyCode,
    pub status: OrderStatus,
    /// Credits added to the balance when the order completes.
    pub credits_granted: u32,
    /// Plan activated when a subscription order completes.
    pub subscription_plan: Option<SubscriptionPlan>,
    pub paypal_order_id: Option<String>,
    pub paypal_capture_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Order total as a [`Price`].
    #[must_use]
    pub const fn total(&self) -> Price {
        Price::new(self.total_amount, self.currency)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_line_total() {
        let item = OrderItem {
            product_id: Some(ProductId::new(3)),
            name: "Royal Portrait".to_owned(),
            size: Some("8x10".to_owned()),
            price: Decimal::new(2999, 2),
            quantity: 2,
        };
        assert_eq!(item.line_total(), Decimal::new(5998, 2));
    }

    #[test]
    fn test_item_json_shape() {
        let json = r#"{"productId":null,"name":"50 credits","price":"19.99","quantity":1}"#;
        let item: OrderItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.size, None);
        assert_eq!(item.price, Decimal::new(1999, 2));
        let back = serde_json::to_value(&item).unwrap();
        assert!(back.get("size").is_none());
    }
}
