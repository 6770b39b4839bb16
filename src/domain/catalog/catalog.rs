//! Validated, immutable product lookup table.

use std::collections::HashMap;

use chrono::Duration;
use thiserror::Error;

use crate::domain::providers::ProviderKind;

use super::product::{ActivatorKind, Product, ProductCode, Recurrence};

/// Errors from catalog construction and lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Unknown product code: {0}")]
    UnknownProduct(String),

    #[error("Product {0} is a legacy offer and can no longer be purchased")]
    LegacyProduct(String),

    #[error("Invalid catalog: {0}")]
    Invalid(String),
}

/// Immutable catalog of purchasable offers, keyed by product code and
/// reverse-indexed by provider price id.
///
/// Built once at startup; all lookups are lock-free reads.
#[derive(Debug)]
pub struct Catalog {
    products: HashMap<ProductCode, Product>,
    by_price_id: HashMap<(ProviderKind, &'static str), ProductCode>,
}

impl Catalog {
    /// Builds a catalog from a product list, validating uniqueness of codes
    /// and provider price ids and sanity of amounts and durations.
    pub fn new(products: Vec<Product>) -> Result<Self, CatalogError> {
        let mut by_code = HashMap::new();
        let mut by_price_id = HashMap::new();

        for product in products {
            if product.amount < 0.0 {
                return Err(CatalogError::Invalid(format!(
                    "product {} has a negative amount",
                    product.code
                )));
            }
            if product.duration <= Duration::zero() {
                return Err(CatalogError::Invalid(format!(
                    "product {} has a non-positive duration",
                    product.code
                )));
            }

            for (&provider, &price_id) in &product.price_ids {
                if by_price_id
                    .insert((provider, price_id), product.code.clone())
                    .is_some()
                {
                    return Err(CatalogError::Invalid(format!(
                        "duplicate price id {price_id} for {provider}"
                    )));
                }
            }

            let code = product.code.clone();
            if by_code.insert(code.clone(), product).is_some() {
                return Err(CatalogError::Invalid(format!("duplicate product code {code}")));
            }
        }

        Ok(Self {
            products: by_code,
            by_price_id,
        })
    }

    /// Looks up a product by code, legacy codes included.
    pub fn get(&self, code: &ProductCode) -> Result<&Product, CatalogError> {
        self.products
            .get(code)
            .ok_or_else(|| CatalogError::UnknownProduct(code.to_string()))
    }

    /// Looks up a product for a purchase or activation.
    ///
    /// Legacy codes resolve via [`Catalog::get`] for historical display but
    /// are rejected here.
    pub fn get_purchasable(&self, code: &ProductCode) -> Result<&Product, CatalogError> {
        let product = self.get(code)?;
        if product.code.is_legacy() {
            return Err(CatalogError::LegacyProduct(code.to_string()));
        }
        Ok(product)
    }

    /// Reverse lookup by a provider-specific price identifier.
    pub fn find_by_price_id(&self, provider: ProviderKind, price_id: &str) -> Option<&Product> {
        self.by_price_id
            .get(&(provider, price_id))
            .and_then(|code| self.products.get(code))
    }

    /// The standard club catalog.
    ///
    /// Mirrors the production offers: one/three/fifty year packages with
    /// monthly and yearly recurrent variants, a 31-day card offer, the
    /// invite product, and retired legacy codes kept for payment history.
    pub fn standard() -> Self {
        use ActivatorKind::*;
        use Recurrence::*;

        let year = Duration::days(365);

        let products = vec![
            Product::new("club1", "One year of membership", 15.0, "USD", None, year, Subscription)
                .with_price_id(ProviderKind::Stripe, "price_club1")
                .with_price_id(ProviderKind::Coinbase, "checkout_club1"),
            Product::new(
                "club1_recurrent_yearly",
                "One year of membership, renewed yearly",
                15.0,
                "USD",
                Yearly,
                year,
                Subscription,
            )
            .with_price_id(ProviderKind::Stripe, "price_club1_yearly"),
            Product::new(
                "club1_recurrent_monthly",
                "One year of membership, billed monthly",
                15.0,
                "USD",
                Monthly,
                year,
                Subscription,
            )
            .with_price_id(ProviderKind::Stripe, "price_club1_monthly"),
            Product::new("club3", "Three years of membership", 40.0, "USD", None, year * 3, Subscription)
                .with_price_id(ProviderKind::Stripe, "price_club3"),
            Product::new(
                "club3_recurrent_yearly",
                "Three years of membership, renewed yearly",
                40.0,
                "USD",
                Yearly,
                year * 3,
                Subscription,
            )
            .with_price_id(ProviderKind::Stripe, "price_club3_yearly"),
            Product::new(
                "club3_recurrent_monthly",
                "Three years of membership, billed monthly",
                40.0,
                "USD",
                Monthly,
                year * 3,
                Subscription,
            )
            .with_price_id(ProviderKind::Stripe, "price_club3_monthly"),
            Product::new("club50", "Fifty years of membership", 150.0, "USD", None, year * 50, Subscription)
                .with_price_id(ProviderKind::Stripe, "price_club50"),
            Product::new(
                "club50_recurrent_yearly",
                "Fifty years of membership, renewed yearly",
                150.0,
                "USD",
                Yearly,
                year * 50,
                Subscription,
            )
            .with_price_id(ProviderKind::Stripe, "price_club50_yearly"),
            Product::new(
                "club1_month",
                "One month of membership",
                599.0,
                "RUB",
                None,
                Duration::days(31),
                Subscription,
            ),
            Product::new(
                "club1_month_recurrent",
                "One month of membership, renewed monthly",
                599.0,
                "RUB",
                Monthly,
                Duration::days(31),
                Subscription,
            ),
            Product::new("club1_invite", "Gift a year of membership", 15.0, "USD", None, year, Invite)
                .with_price_id(ProviderKind::Stripe, "price_club1_invite"),
            // Retired offers, resolvable for payment history only.
            Product::new("legacy_club1", "One year of membership (retired)", 10.0, "USD", None, year, Subscription),
        ];

        Self::new(products).expect("standard catalog must be valid")
    }
}
