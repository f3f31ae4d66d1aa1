//! Admin dashboard API.
//!
//! Every handler takes [`RequireAdmin`]. Product writes invalidate the
//! public catalogue cache.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use pawdia_core::{Credits, OrderId, OrderStatus, ProductId, UserId};

use crate::db::{NewProduct, OrderRepository, OrderStats, ProductRepository, ProductUpdate, UserRepository};
use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{Order, Product, User};
use crate::routes::response::{ApiJson, PageQuery, Pagination, created, message, ok};
use crate::services::credits::CreditService;
use crate::state::AppState;

// =============================================================================
// Request / Response Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub users: i64,
    pub orders: OrderStats,
}

#[derive(Debug, Deserialize)]
pub struct UserSearch {
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub is_admin: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustCreditsRequest {
    pub amount: i32,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdjustCreditsResponse {
    pub credits: Credits,
}

#[derive(Debug, Serialize)]
pub struct ProductsResponse {
    pub products: Vec<Product>,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub product: Product,
}

#[derive(Debug, Deserialize)]
pub struct OrderFilter {
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Serialize)]
pub struct OrdersResponse {
    pub orders: Vec<Order>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order: Order,
}

// =============================================================================
// Dashboard
// =============================================================================

/// GET /api/admin/stats
///
/// # Errors
///
/// Returns 500 on database failure.
pub async fn stats(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Response> {
    let users = UserRepository::new(state.pool()).count(None).await?;
    let orders = OrderRepository::new(state.pool()).stats().await?;

    Ok(ok(StatsResponse { users, orders }).into_response())
}

// =============================================================================
// Users
// =============================================================================

/// GET /api/admin/users
///
/// # Errors
///
/// Returns 500 on database failure.
pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(page): Query<PageQuery>,
    Query(filter): Query<UserSearch>,
) -> Result<Response> {
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let repo = UserRepository::new(state.pool());
    let total = repo.count(search).await?;
    let now = Utc::now();
    let users = repo
        .list(page.page, page.per_page, search)
        .await?
        .into_iter()
        .map(|u| u.as_of(now))
        .collect();

    Ok(ok(UsersResponse {
        users,
        pagination: Pagination::new(page, total),
    })
    .into_response())
}

/// GET /api/admin/users/{id}
///
/// # Errors
///
/// Returns 404 if the user does not exist.
pub async fn get_user(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<i32>,
) -> Result<Response> {
    let user = UserRepository::new(state.pool())
        .get_by_id(UserId::new(id))
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_owned()))?;

    Ok(ok(UserResponse {
        user: user.as_of(Utc::now()),
    })
    .into_response())
}

/// PUT /api/admin/users/{id}
///
/// # Errors
///
/// Returns 400 for an invalid name or when an admin demotes themselves, and
/// 404 if the user does not exist.
pub async fn update_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i32>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<Response> {
    let id = UserId::new(id);
    if id == admin.id && req.is_admin == Some(false) {
        return Err(AppError::BadRequest(
            "You cannot remove your own admin access".to_owned(),
        ));
    }

    let repo = UserRepository::new(state.pool());
    let mut user = repo
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_owned()))?;

    if let Some(name) = req.name.as_deref().map(str::trim) {
        if name.is_empty() || name.chars().count() > 100 {
            return Err(AppError::BadRequest(
                "Name must be between 1 and 100 characters".to_owned(),
            ));
        }
        user = repo.update_profile(id, name).await?;
    }
    if let Some(is_admin) = req.is_admin
        && is_admin != user.is_admin
    {
        user = repo.set_admin(id, is_admin).await?;
        tracing::info!(admin_id = %admin.id, user_id = %id, is_admin, "Admin access changed");
    }

    Ok(ok(UserResponse {
        user: user.as_of(Utc::now()),
    })
    .into_response())
}

/// DELETE /api/admin/users/{id}
///
/// # Errors
///
/// Returns 400 when an admin deletes themselves and 404 if the user does not
/// exist.
pub async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i32>,
) -> Result<Response> {
    let id = UserId::new(id);
    if id == admin.id {
        return Err(AppError::BadRequest(
            "You cannot delete your own account here".to_owned(),
        ));
    }

    UserRepository::new(state.pool()).delete(id).await?;
    tracing::info!(admin_id = %admin.id, user_id = %id, "User deleted");

    Ok(message("User deleted"))
}

/// POST /api/admin/users/{id}/credits
///
/// # Errors
///
/// Returns 400 for a zero or out-of-range amount, 402 if a removal exceeds
/// the balance and 404 if the user does not exist.
pub async fn adjust_credits(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i32>,
    ApiJson(req): ApiJson<AdjustCreditsRequest>,
) -> Result<Response> {
    let id = UserId::new(id);
    let note = req.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());

    let credits = CreditService::new(state.pool())
        .admin_adjust(id, req.amount, note)
        .await?;
    tracing::info!(
        admin_id = %admin.id,
        user_id = %id,
        amount = req.amount,
        balance = %credits,
        "Credits adjusted"
    );

    Ok(ok(AdjustCreditsResponse { credits }).into_response())
}

// =============================================================================
// Products
// =============================================================================

/// GET /api/admin/products
///
/// Includes inactive products.
///
/// # Errors
///
/// Returns 500 on database failure.
pub async fn list_products(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Response> {
    let products = ProductRepository::new(state.pool()).list_all().await?;
    Ok(ok(ProductsResponse { products }).into_response())
}

/// POST /api/admin/products
///
/// # Errors
///
/// Returns 400 for an invalid product or a name that is already taken.
pub async fn create_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiJson(req): ApiJson<NewProduct>,
) -> Result<Response> {
    validate_product_fields(Some(&req.name), Some(req.price))?;

    let product = ProductRepository::new(state.pool()).create(&req).await?;
    state.invalidate_products().await;
    tracing::info!(admin_id = %admin.id, product_id = %product.id, "Product created");

    Ok(created(ProductResponse { product }).into_response())
}

/// PUT /api/admin/products/{id}
///
/// # Errors
///
/// Returns 400 for invalid fields or a name that is already taken, and 404
/// if the product does not exist.
pub async fn update_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i32>,
    ApiJson(req): ApiJson<ProductUpdate>,
) -> Result<Response> {
    validate_product_fields(req.name.as_deref(), req.price)?;

    let product = ProductRepository::new(state.pool())
        .update(ProductId::new(id), &req)
        .await?;
    state.invalidate_products().await;
    tracing::info!(admin_id = %admin.id, product_id = %product.id, "Product updated");

    Ok(ok(ProductResponse { product }).into_response())
}

/// DELETE /api/admin/products/{id}
///
/// # Errors
///
/// Returns 404 if the product does not exist.
pub async fn delete_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i32>,
) -> Result<Response> {
    ProductRepository::new(state.pool())
        .delete(ProductId::new(id))
        .await?;
    state.invalidate_products().await;
    tracing::info!(admin_id = %admin.id, product_id = id, "Product deleted");

    Ok(message("Product deleted"))
}

fn validate_product_fields(
    name: Option<&str>,
    price: Option<rust_decimal::Decimal>,
) -> Result<()> {
    if name.is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("Product name is required".to_owned()));
    }
    if price.is_some_and(|p| p.is_sign_negative()) {
        return Err(AppError::BadRequest("Price cannot be negative".to_owned()));
    }
    Ok(())
}

// =============================================================================
// Orders
// =============================================================================

/// GET /api/admin/orders
///
/// # Errors
///
/// Returns 500 on database failure.
pub async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(page): Query<PageQuery>,
    Query(filter): Query<OrderFilter>,
) -> Result<Response> {
    let repo = OrderRepository::new(state.pool());
    let total = repo.count(filter.status).await?;
    let orders = repo
        .list_all(filter.status, page.page, page.per_page)
        .await?;

    Ok(ok(OrdersResponse {
        orders,
        pagination: Pagination::new(page, total),
    })
    .into_response())
}

/// PUT /api/admin/orders/{id}/status
///
/// Admins may cancel or fail a pending order. Completion only happens through
/// a PayPal capture, which is what grants credits.
///
/// # Errors
///
/// Returns 400 for a disallowed transition and 404 if the order does not
/// exist.
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i32>,
    ApiJson(req): ApiJson<UpdateOrderStatusRequest>,
) -> Result<Response> {
    if req.status == OrderStatus::Completed {
        return Err(AppError::BadRequest(
            "Orders are completed by capturing the payment".to_owned(),
        ));
    }

    let id = OrderId::new(id);
    let order = OrderRepository::new(state.pool())
        .mark_status(id, req.status)
        .await?
        .ok_or_else(|| {
            AppError::BadRequest(format!("Order {id} cannot move to {}", req.status))
        })?;
    tracing::info!(admin_id = %admin.id, order_id = %id, status = %req.status, "Order status changed");

    Ok(ok(OrderResponse { order }).into_response())
}
