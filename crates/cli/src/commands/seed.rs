//! Seed the portrait catalogue.
//!
//! Idempotent: products are matched by name and existing rows are left
//! untouched.

use pawdia_core::CurrencyCode;
use pawdia_server::db::{NewProduct, ProductRepository};
use rust_decimal::Decimal;

use super::{CommandError, connect};

/// Summary of a seeding run.
#[derive(Debug, Default)]
pub struct SeedSummary {
    pub inserted: usize,
    pub skipped: usize,
}

fn product(
    name: &str,
    description: &str,
    cents: i64,
    sizes: &[&str],
    category: &str,
    display_order: i32,
) -> NewProduct {
    NewProduct {
        name: name.to_owned(),
        description: description.to_owned(),
        price: Decimal::new(cents, 2),
        currency: CurrencyCode::USD,
        display_price: (!sizes.is_empty()).then(|| format!("From ${}", Decimal::new(cents, 2))),
        image_url: None,
        sizes: sizes.iter().map(|s| (*s).to_owned()).collect(),
        category: category.to_owned(),
        is_active: true,
        display_order,
    }
}

/// The default catalogue.
pub fn default_catalogue() -> Vec<NewProduct> {
    vec![
        product(
            "Digital Portrait",
            "High-resolution digital download of your pet's portrait.",
            1999,
            &[],
            "digital",
            1,
        ),
        product(
            "Fine Art Print",
            "Museum-quality giclee print on archival matte paper.",
            3999,
            &["8x10", "12x16", "18x24"],
            "print",
            2,
        ),
        product(
            "Framed Canvas",
            "Gallery-wrapped canvas in a hand-finished wooden frame.",
            8999,
            &["12x16", "16x20", "24x36"],
            "canvas",
            3,
        ),
        product(
            "Royal Portrait Bundle",
            "Digital portrait plus a framed canvas in the royal style.",
            11_999,
            &["16x20"],
            "bundle",
            4,
        ),
    ]
}

/// Insert the default catalogue.
pub async fn products() -> Result<SeedSummary, CommandError> {
    let pool = connect().await?;
    let repo = ProductRepository::new(&pool);

    let mut summary = SeedSummary::default();
    for new in default_catalogue() {
        if repo.create_if_missing(&new).await? {
            tracing::info!(name = %new.name, "Inserted product");
            summary.inserted += 1;
        } else {
            tracing::info!(name = %new.name, "Product exists, skipping");
            summary.skipped += 1;
        }
    }

    tracing::info!(
        inserted = summary.inserted,
        skipped = summary.skipped,
        "Seeding complete!"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalogue_names_are_unique() {
        let catalogue = default_catalogue();
        let names: HashSet<_> = catalogue.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names.len(), catalogue.len());
    }

    #[test]
    fn test_sized_products_get_from_label() {
        for p in default_catalogue() {
            assert!(p.price > Decimal::ZERO);
            assert_eq!(p.display_price.is_some(), !p.sizes.is_empty());
        }
    }
}
