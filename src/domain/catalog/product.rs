//! Product entity for the static catalog.

use std::collections::HashMap;
use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::providers::ProviderKind;

/// Identifier of a purchasable offer, e.g. `club1` or `club3_recurrent_yearly`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductCode(String);

impl ProductCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Legacy codes resolve for historical payment display but must never
    /// be accepted on a purchase or activation path.
    pub fn is_legacy(&self) -> bool {
        self.0.starts_with("legacy")
    }
}

impl fmt::Display for ProductCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductCode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Recurrence of a product's billing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    None,
    Monthly,
    Yearly,
}

impl Recurrence {
    pub fn is_recurrent(&self) -> bool {
        !matches!(self, Recurrence::None)
    }
}

/// Closed set of activation strategies.
///
/// Every product must explicitly choose one; activation dispatches through a
/// fixed `match`, so a new strategy cannot appear without a code change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivatorKind {
    /// Extends the paying (or invited) user's membership window.
    Subscription,
    /// Funds an invite whose benefit is redirected to a third party.
    Invite,
}

/// A purchasable offer.
///
/// Immutable once the catalog is built. The `price_ids` map carries the
/// provider-specific price identifiers used for reverse lookup when a
/// webhook only references a provider price.
#[derive(Debug, Clone)]
pub struct Product {
    pub code: ProductCode,
    pub description: &'static str,
    pub amount: f64,
    pub currency: &'static str,
    pub recurrence: Recurrence,
    pub duration: Duration,
    pub activator: ActivatorKind,
    pub price_ids: HashMap<ProviderKind, &'static str>,
}

impl Product {
    pub fn new(
        code: &str,
        description: &'static str,
        amount: f64,
        currency: &'static str,
        recurrence: Recurrence,
        duration: Duration,
        activator: ActivatorKind,
    ) -> Self {
        Self {
            code: ProductCode::new(code),
            description,
            amount,
            currency,
            recurrence,
            duration,
            activator,
            price_ids: HashMap::new(),
        }
    }

    /// Attaches a provider-specific price identifier.
    pub fn with_price_id(mut self, provider: ProviderKind, price_id: &'static str) -> Self {
        self.price_ids.insert(provider, price_id);
        self
    }
}
