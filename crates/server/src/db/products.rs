//! Product catalogue repository.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;

use pawdia_core::{CurrencyCode, Price, ProductId};

use super::RepositoryError;
use crate::models::Product;

const PRODUCT_COLUMNS: &str = "id, name, description, price, currency, display_price, image_url, \
     sizes, category, is_active, display_order, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    description: String,
    price: Decimal,
    currency: String,
    display_price: Option<String>,
    image_url: Option<String>,
    sizes: Vec<String>,
    category: String,
    is_active: bool,
    display_order: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(r: ProductRow) -> Result<Self, Self::Error> {
        let currency = CurrencyCode::from_str(&r.currency)
            .map_err(|e| RepositoryError::DataCorruption(format!("product {}: {e}", r.id)))?;
        let price = Price::new(r.price, currency);
        let display_price = r
            .display_price
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| price.display());

        Ok(Self {
            id: r.id,
            name: r.name,
            description: r.description,
            price,
            display_price,
            image_url: r.image_url,
            sizes: r.sizes,
            category: r.category,
            is_active: r.is_active,
            display_order: r.display_order,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Fields for a new product.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub currency: CurrencyCode,
    #[serde(default)]
    pub display_price: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i32,
}

fn default_category() -> String {
    "portrait".to_owned()
}

const fn default_active() -> bool {
    true
}

/// Partial product update. `None` leaves a field unchanged; an empty
/// `displayPrice` or `imageUrl` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub currency: Option<CurrencyCode>,
    pub display_price: Option<String>,
    pub image_url: Option<String>,
    pub sizes: Option<Vec<String>>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
    pub display_order: Option<i32>,
}

/// Repository for catalogue products.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Active products in display order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active \
             ORDER BY display_order, name"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    /// Every product, including inactive ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_all(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY display_order, name"
        ))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;

        row.map(Product::try_from).transpose()
    }

    /// Get several products by ID. Missing IDs are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let raw: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(raw)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    /// Insert a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a product with the same name exists.
    pub async fn create(&self, new: &NewProduct) -> Result<Product, RepositoryError> {
        let row: ProductRow = sqlx::query_as(&format!(
            "INSERT INTO products \
             (name, description, price, currency, display_price, image_url, sizes, \
              category, is_active, display_order) \
             VALUES ($1, $2, $3, $4, NULLIF($5, ''), NULLIF($6, ''), $7, $8, $9, $10) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price)
        .bind(new.currency.code())
        .bind(new.display_price.as_deref())
        .bind(new.image_url.as_deref())
        .bind(&new.sizes)
        .bind(&new.category)
        .bind(new.is_active)
        .bind(new.display_order)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "product name already exists"))?;

        row.try_into()
    }

    /// Insert a product unless one with the same name exists.
    ///
    /// Returns `true` if a row was inserted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create_if_missing(&self, new: &NewProduct) -> Result<bool, RepositoryError> {
        match self.create(new).await {
            Ok(_) => Ok(true),
            Err(RepositoryError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Conflict` if the new name is taken.
    pub async fn update(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "UPDATE products SET \
             name = COALESCE($2, name), \
             description = COALESCE($3, description), \
             price = COALESCE($4, price), \
             currency = COALESCE($5, currency), \
             display_price = CASE WHEN $6::text IS NULL THEN display_price ELSE NULLIF($6, '') END, \
             image_url = CASE WHEN $7::text IS NULL THEN image_url ELSE NULLIF($7, '') END, \
             sizes = COALESCE($8, sizes), \
             category = COALESCE($9, category), \
             is_active = COALESCE($10, is_active), \
             display_order = COALESCE($11, display_order), \
             updated_at = NOW() \
             WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(update.name.as_deref())
        .bind(update.description.as_deref())
        .bind(update.price)
        .bind(update.currency.map(CurrencyCode::code))
        .bind(update.display_price.as_deref())
        .bind(update.image_url.as_deref())
        .bind(update.sizes.as_deref())
        .bind(update.category.as_deref())
        .bind(update.is_active)
        .bind(update.display_order)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "product name already exists"))?;

        row.ok_or(RepositoryError::NotFound)?.try_into()
    }

    /// Delete a product. Past orders keep their item snapshots.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(display_price: Option<&str>, currency: &str) -> ProductRow {
        ProductRow {
            id: ProductId::new(1),
            name: "Royal Portrait".to_owned(),
            description: String::new(),
            price: Decimal::new(2999, 2),
            currency: currency.to_owned(),
            display_price: display_price.map(str::to_owned),
            image_url: None,
            sizes: vec!["8x10".to_owned()],
            category: "portrait".to_owned(),
            is_active: true,
            display_order: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_display_price_defaults_to_formatted_price() {
        let product = Product::try_from(row(None, "USD")).unwrap();
        assert_eq!(product.display_price, "$29.99");

        let product = Product::try_from(row(Some("  "), "USD")).unwrap();
        assert_eq!(product.display_price, "$29.99");

        let product = Product::try_from(row(Some("From $29.99"), "USD")).unwrap();
        assert_eq!(product.display_price, "From $29.99");
    }

    #[test]
    fn test_unknown_currency_is_corruption() {
        assert!(matches!(
            Product::try_from(row(None, "XYZ")),
            Err(RepositoryError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_new_product_defaults() {
        let new: NewProduct =
            serde_json::from_str(r#"{"name":"Watercolor","price":"24.99"}"#).unwrap();
        assert!(new.is_active);
        assert_eq!(new.category, "portrait");
        assert_eq!(new.currency, CurrencyCode::USD);
        assert!(new.sizes.is_empty());
    }
}
