//! StopSubscriptionHandler - cancels a recurring agreement at the provider
//! and flips the local mirror.
//!
//! Stopping is idempotent end to end: an agreement the provider already
//! reports as cancelled is a success, and the local row flip is a
//! conditional update that tolerates replays and provider-pushed
//! cancellations racing this handler.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::domain::foundation::DomainError;
use crate::domain::providers::ProviderKind;
use crate::ports::{BillingGateway, GatewaySubscriptionStatus, SubscriptionStore};

#[derive(Debug, Clone, Error)]
pub enum StopSubscriptionError {
    #[error("Payments via {0} are not configured")]
    ProviderUnavailable(ProviderKind),

    #[error("The payment provider rejected the cancellation, please try again")]
    Gateway(String),

    #[error("Something went wrong, please try again")]
    Storage(String),
}

impl From<DomainError> for StopSubscriptionError {
    fn from(err: DomainError) -> Self {
        StopSubscriptionError::Storage(err.to_string())
    }
}

pub struct StopSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionStore>,
    gateways: HashMap<ProviderKind, Arc<dyn BillingGateway>>,
}

impl StopSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        gateways: HashMap<ProviderKind, Arc<dyn BillingGateway>>,
    ) -> Self {
        Self {
            subscriptions,
            gateways,
        }
    }

    pub async fn handle(
        &self,
        provider: ProviderKind,
        subscription_id: &str,
    ) -> Result<(), StopSubscriptionError> {
        let gateway = self
            .gateways
            .get(&provider)
            .ok_or(StopSubscriptionError::ProviderUnavailable(provider))?;

        match gateway.get_subscription(subscription_id).await {
            Ok(subscription) => match subscription.status {
                GatewaySubscriptionStatus::Cancelled => {
                    info!(subscription = %subscription_id, "already cancelled at the provider");
                    self.stop_local(subscription_id).await?;
                    return Ok(());
                }
                GatewaySubscriptionStatus::Incomplete => {
                    // An open checkout session would otherwise let the payer
                    // resurrect the agreement after this cancellation.
                    if let Some(session_id) = subscription.checkout_session_id {
                        if let Err(err) = gateway.expire_checkout_session(&session_id).await {
                            warn!(
                                subscription = %subscription_id,
                                session = %session_id,
                                error = %err,
                                "failed to expire open checkout session",
                            );
                        }
                    }
                }
                GatewaySubscriptionStatus::Active | GatewaySubscriptionStatus::Unknown => {}
            },
            // Some providers have no lookup API; proceed straight to the
            // cancellation call, which is idempotent on their side.
            Err(err) => {
                info!(subscription = %subscription_id, error = %err, "subscription lookup unavailable");
            }
        }

        gateway
            .cancel_subscription(subscription_id)
            .await
            .map_err(|err| {
                warn!(subscription = %subscription_id, error = %err, "provider cancellation failed");
                StopSubscriptionError::Gateway(err.message)
            })?;

        self.stop_local(subscription_id).await?;
        info!(subscription = %subscription_id, "subscription stopped");
        Ok(())
    }

    async fn stop_local(&self, subscription_id: &str) -> Result<(), StopSubscriptionError> {
        let stopped = self.subscriptions.stop(subscription_id).await?;
        if !stopped {
            info!(subscription = %subscription_id, "no active local row to stop");
        }
        Ok(())
    }
}
