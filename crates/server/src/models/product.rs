//! Catalogue product types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use pawdia_core::{Price, ProductId};

/// A portrait product in the catalogue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Price,
    /// Marketing price label (e.g., "From $19.99"). Falls back to the formatted price.
    pub display_price: String,
    pub image_url: Option<String>,
    /// Available print sizes (e.g., "8x10").
    pub sizes: Vec<String>,
    pub category: String,
    pub is_active: bool,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether `size` can be ordered. Products without sizes accept no size.
    #[must_use]
    pub fn accepts_size(&self, size: Option<&str>) -> bool {
        match size {
            None => self.sizes.is_empty(),
            Some(size) => self.sizes.iter().any(|s| s == size),
        }
    }
}

#[cfg(test)]
mod tests {
    use pawdia_core::CurrencyCode;

    use super::*;

    fn product(sizes: &[&str]) -> Product {
        Product {
            id: ProductId::new(1),
            name: "Royal Portrait".to_owned(),
            description: String::new(),
            price: Price::from_cents(2999, CurrencyCode::USD),
            display_price: "$29.99".to_owned(),
            image_url: None,
            sizes: sizes.iter().map(|s| (*s).to_owned()).collect(),
            category: "portrait".to_owned(),
            is_active: true,
            display_order: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_accepts_size() {
        let sized = product(&["8x10", "12x16"]);
        assert!(sized.accepts_size(Some("8x10")));
        assert!(!sized.accepts_size(Some("24x36")));
        assert!(!sized.accepts_size(None));

        let digital = product(&[]);
        assert!(digital.accepts_size(None));
        assert!(!digital.accepts_size(Some("8x10")));
    }
}
