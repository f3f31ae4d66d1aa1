//! Public catalogue.

use axum::{
    extract::{Path, State},
    http::{HeaderValue, header::CACHE_CONTROL},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use pawdia_core::ProductId;

use crate::db::ProductRepository;
use crate::error::{AppError, Result};
use crate::middleware::OptionalAuth;
use crate::models::Product;
use crate::routes::response::ok;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProductsResponse<'a> {
    pub products: &'a [Product],
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub product: Product,
}

/// Active products, in display order.
///
/// GET /api/products
///
/// # Errors
///
/// Returns 500 on database failure.
pub async fn index(State(state): State<AppState>) -> Result<Response> {
    let products = state.active_products().await?;
    let mut response = ok(ProductsResponse {
        products: &products,
    })
    .into_response();
    response.headers_mut().insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=300"),
    );
    Ok(response)
}

/// One product. Inactive products are only visible to admins.
///
/// GET /api/products/{id}
///
/// # Errors
///
/// Returns 404 for unknown products and for inactive ones seen by non-admins.
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(caller): OptionalAuth,
    Path(id): Path<i32>,
) -> Result<Response> {
    let is_admin = caller.is_some_and(|c| c.is_admin);
    let product = ProductRepository::new(state.pool())
        .get(ProductId::new(id))
        .await?
        .filter(|p| p.is_active || is_admin)
        .ok_or_else(|| AppError::NotFound("Product not found".to_owned()))?;

    Ok(ok(ProductResponse { product }).into_response())
}
