//! Subscription store port.

use async_trait::async_trait;

use crate::domain::billing::{NewSubscription, Subscription};
use crate::domain::foundation::DomainError;

/// Storage for the local mirror of recurring billing agreements.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Records a new agreement; idempotent on `subscription_id`.
    async fn create(&self, subscription: NewSubscription) -> Result<Subscription, DomainError>;

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Flips the agreement to `stopped`.
    ///
    /// Returns `true` if a row changed; already-stopped and unknown ids
    /// return `false`. Rows are never deleted.
    async fn stop(&self, subscription_id: &str) -> Result<bool, DomainError>;
}
