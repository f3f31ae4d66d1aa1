//! Order repository.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use pawdia_core::{
    CurrencyCode, OrderId, OrderKind, OrderStatus, SubscriptionPlan, UserId,
};

use super::RepositoryError;
use crate::models::{Order, OrderItem};

const ORDER_COLUMNS: &str = "id, user_id, kind, items, total_amount, currency, status, \
     credits_granted, subscription_plan, paypal_order_id, paypal_capture_id, \
     created_at, updated_at, completed_at";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    user_id: UserId,
    kind: OrderKind,
    items: Json<Vec<OrderItem>>,
    total_amount: Decimal,
    currency: String,
    status: OrderStatus,
    credits_granted: i32,
    subscription_plan: Option<SubscriptionPlan>,
    paypal_order_id: Option<String>,
    paypal_capture_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let currency = CurrencyCode::from_str(&r.currency)
            .map_err(|e| RepositoryError::DataCorruption(format!("order {}: {e}", r.id)))?;
        let credits_granted = u32::try_from(r.credits_granted).map_err(|_| {
            RepositoryError::DataCorruption(format!("order {}: negative credits_granted", r.id))
        })?;

        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            kind: r.kind,
            items: r.items.0,
            total_amount: r.total_amount,
            currency,
            status: r.status,
            credits_granted,
            subscription_plan: r.subscription_plan,
            paypal_order_id: r.paypal_order_id,
            paypal_capture_id: r.paypal_capture_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
            completed_at: r.completed_at,
        })
    }
}

/// Fields for a new PENDING order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub kind: OrderKind,
    pub items: Vec<OrderItem>,
    pub total_amount: Decimal,
    pub currency: CurrencyCode,
    pub credits_granted: u32,
    pub subscription_plan: Option<SubscriptionPlan>,
}

/// Order counts and revenue for the admin dashboard.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub pending: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub failed: i64,
    /// Sum of completed order totals.
    pub revenue: Decimal,
}

/// Repository for orders.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a PENDING order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, new: &NewOrder) -> Result<Order, RepositoryError> {
        let credits_granted = i32::try_from(new.credits_granted)
            .map_err(|_| RepositoryError::Conflict("credit amount out of range".to_owned()))?;

        let row: OrderRow = sqlx::query_as(&format!(
            "INSERT INTO orders \
             (user_id, kind, items, total_amount, currency, credits_granted, subscription_plan) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {ORDER_COLUMNS}"
        ))
        .bind(new.user_id)
        .bind(new.kind)
        .bind(Json(&new.items))
        .bind(new.total_amount)
        .bind(new.currency.code())
        .bind(credits_granted)
        .bind(new.subscription_plan)
        .fetch_one(self.pool)
        .await?;

        row.try_into()
    }

    /// Record the PayPal order id created for a local order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    /// Returns `RepositoryError::Conflict` if the PayPal id is already used.
    pub async fn attach_paypal_order(
        &self,
        id: OrderId,
        paypal_order_id: &str,
    ) -> Result<Order, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "UPDATE orders SET paypal_order_id = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(paypal_order_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "paypal order already linked"))?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        row.map(Order::try_from).transpose()
    }

    /// Get an order by its PayPal order id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_paypal_order_id(
        &self,
        paypal_order_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE paypal_order_id = $1"
        ))
        .bind(paypal_order_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    /// All orders, newest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(
        &self,
        status: Option<OrderStatus>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Order>, RepositoryError> {
        let (limit, offset) = super::page_bounds(page, per_page);
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE $1::order_status IS NULL OR status = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    /// Count orders with an optional status filter.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self, status: Option<OrderStatus>) -> Result<i64, RepositoryError> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE $1::order_status IS NULL OR status = $1",
        )
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        Ok(count)
    }

    /// Order counts by status plus completed revenue.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn stats(&self) -> Result<OrderStats, RepositoryError> {
        let rows: Vec<(OrderStatus, i64, Option<Decimal>)> = sqlx::query_as(
            "SELECT status, COUNT(*), SUM(total_amount) FROM orders GROUP BY status",
        )
        .fetch_all(self.pool)
        .await?;

        let mut stats = OrderStats::default();
        for (status, count, total) in rows {
            match status {
                OrderStatus::Pending => stats.pending = count,
                OrderStatus::Completed => {
                    stats.completed = count;
                    stats.revenue = total.unwrap_or_default();
                }
                OrderStatus::Cancelled => stats.cancelled = count,
                OrderStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }

    /// Mark a PENDING order completed.
    ///
    /// Returns `None` if the order was not PENDING (already captured or closed).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_completed(
        &self,
        id: OrderId,
        capture_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        mark_completed_in(&mut conn, id, capture_id).await
    }

    /// Move a PENDING order to `status`.
    ///
    /// Returns `None` if the order exists but the transition is not allowed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn mark_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let current: Option<OrderStatus> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        let current = current.ok_or(RepositoryError::NotFound)?;
        if !current.can_transition_to(status) {
            return Ok(None);
        }

        // The status guard keeps the transition atomic against concurrent writers
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "UPDATE orders SET status = $2, updated_at = NOW(), \
             completed_at = CASE WHEN $2 = 'COMPLETED'::order_status THEN NOW() ELSE completed_at END \
             WHERE id = $1 AND status = $3 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .bind(current)
        .fetch_optional(self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }
}

/// Mark a PENDING order completed on an open transaction.
pub(crate) async fn mark_completed_in(
    conn: &mut PgConnection,
    id: OrderId,
    capture_id: &str,
) -> Result<Option<Order>, RepositoryError> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "UPDATE orders SET status = 'COMPLETED', paypal_capture_id = $2, \
         completed_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status = 'PENDING' RETURNING {ORDER_COLUMNS}"
    ))
    .bind(id)
    .bind(capture_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Order::try_from).transpose()
}
