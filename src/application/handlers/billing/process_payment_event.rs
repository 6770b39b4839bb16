//! ProcessPaymentEventHandler - applies a verified webhook event to the
//! ledger and activation engine.
//!
//! This is the reconciliation core. Providers deliver at least once and in
//! no particular order, so every branch here is written to be safely
//! replayable: duplicate deliveries collapse into [`EventOutcome::Duplicate`]
//! and activation runs at most once per payment, guarded by the ledger's
//! one-winner `finish`.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::domain::billing::{
    Activation, ActivationEngine, ActivationError, EventKind, LedgerError, NewPayment,
    NewSubscription, PaymentEvent, PaymentStatus, TransactionStatus,
};
use crate::domain::catalog::{Catalog, CatalogError, Product};
use crate::domain::foundation::DomainError;
use crate::domain::providers::ProviderKind;
use crate::ports::{Member, MembershipPlatform, PaymentLedger, SubscriptionStore, UserDirectory};

/// What processing an event amounted to.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    /// A payment was finalized and its benefit applied.
    Activated(Activation),
    /// State was written (payment started, subscription stopped) but no
    /// activation was due.
    Recorded,
    /// A replayed or out-of-scope delivery; nothing left to do.
    Duplicate,
    /// The event carries nothing actionable (pending charge, first-invoice
    /// echo). Acked so the provider stops retrying.
    Skipped,
}

/// Errors the HTTP boundary translates into provider failure acks.
#[derive(Debug, Clone, Error)]
pub enum ProcessEventError {
    #[error("No payment found for reference {0}")]
    PaymentNotFound(String),

    #[error("No product found for the event")]
    ProductNotFound,

    #[error("No user resolvable for the event")]
    UserNotFound,

    #[error("No subscription found with id {0}")]
    SubscriptionNotFound(String),

    #[error("Unhandled event type: {0}")]
    UnknownEvent(String),

    #[error("Malformed event payload: {0}")]
    Malformed(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Activation error: {0}")]
    Activation(String),
}

impl From<LedgerError> for ProcessEventError {
    fn from(err: LedgerError) -> Self {
        ProcessEventError::Ledger(err.to_string())
    }
}

impl From<DomainError> for ProcessEventError {
    fn from(err: DomainError) -> Self {
        ProcessEventError::Storage(err.to_string())
    }
}

impl From<ActivationError> for ProcessEventError {
    fn from(err: ActivationError) -> Self {
        ProcessEventError::Activation(err.to_string())
    }
}

impl From<CatalogError> for ProcessEventError {
    fn from(_: CatalogError) -> Self {
        ProcessEventError::ProductNotFound
    }
}

pub struct ProcessPaymentEventHandler {
    catalog: Arc<Catalog>,
    ledger: Arc<dyn PaymentLedger>,
    users: Arc<dyn UserDirectory>,
    subscriptions: Arc<dyn SubscriptionStore>,
    engine: Arc<ActivationEngine>,
}

impl ProcessPaymentEventHandler {
    pub fn new(
        catalog: Arc<Catalog>,
        ledger: Arc<dyn PaymentLedger>,
        users: Arc<dyn UserDirectory>,
        subscriptions: Arc<dyn SubscriptionStore>,
        engine: Arc<ActivationEngine>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            users,
            subscriptions,
            engine,
        }
    }

    pub async fn handle(&self, event: PaymentEvent) -> Result<EventOutcome, ProcessEventError> {
        info!(
            provider = %event.provider,
            kind = ?event.kind,
            reference = %event.reference,
            "processing payment event",
        );

        match &event.kind {
            EventKind::CheckoutCompleted => self.checkout_completed(&event).await,
            EventKind::InvoicePaid => match event.provider {
                ProviderKind::CloudPayments => self.recurring_charge(&event).await,
                _ => self.invoice_paid(&event).await,
            },
            EventKind::ChargeCreated => self.charge_created(&event).await,
            EventKind::ChargeConfirmed => self.charge_confirmed(&event).await,
            EventKind::ChargeFailed => self.charge_failed(&event).await,
            EventKind::ChargePending => Ok(EventOutcome::Skipped),
            EventKind::SubscriptionCancelled => self.subscription_cancelled(&event).await,
            EventKind::CustomerUpdated => self.customer_updated(&event).await,
            EventKind::Other(kind) => Err(ProcessEventError::UnknownEvent(kind.clone())),
        }
    }

    /// A checkout session or payment link completed. Finalize the started
    /// payment and activate; replays collapse into `Duplicate`.
    async fn checkout_completed(
        &self,
        event: &PaymentEvent,
    ) -> Result<EventOutcome, ProcessEventError> {
        // Refunds and intermediate statuses are acked without touching the
        // ledger so the provider stops retrying.
        if event.status != TransactionStatus::Approved {
            info!(reference = %event.reference, status = ?event.status, "non-approved checkout, ignoring");
            return Ok(EventOutcome::Skipped);
        }

        let payment = match self
            .ledger
            .finish(&event.reference, PaymentStatus::Success, event.raw.clone())
            .await
        {
            Ok(payment) => payment,
            Err(LedgerError::AlreadyFinalized(_)) | Err(LedgerError::DuplicateReference(_)) => {
                info!(reference = %event.reference, "replayed checkout completion");
                return Ok(EventOutcome::Duplicate);
            }
            Err(LedgerError::PaymentNotFound(reference)) => {
                return Err(ProcessEventError::PaymentNotFound(reference));
            }
            Err(err) => return Err(err.into()),
        };

        let product = self.catalog.get_purchasable(&payment.product_code)?.clone();
        let activation = self.engine.activate(&product, &payment).await?;

        // A card provider may open a recurring agreement alongside the
        // checkout; mirror it locally so later charges can be attributed.
        if let Some(subscription_id) = event.raw_str("SubscriptionId") {
            let user_id = payment.user_id.ok_or(ProcessEventError::UserNotFound)?;
            self.subscriptions
                .create(NewSubscription {
                    subscription_id: subscription_id.to_string(),
                    user_id,
                    product_code: payment.product_code.clone(),
                    amount: payment.amount,
                    reference: payment.reference.clone(),
                    data: event.raw.clone(),
                })
                .await?;
        }

        Ok(EventOutcome::Activated(activation))
    }

    /// A recurring invoice was paid (card provider A). The first invoice of
    /// a new agreement is an echo of checkout completion and is skipped;
    /// later ones book a fresh settled payment keyed by invoice id.
    async fn invoice_paid(&self, event: &PaymentEvent) -> Result<EventOutcome, ProcessEventError> {
        let billing_reason = event
            .raw
            .pointer("/data/object/billing_reason")
            .and_then(|v| v.as_str());
        if billing_reason == Some("subscription_create") {
            return Ok(EventOutcome::Skipped);
        }

        let customer_id = event
            .raw
            .pointer("/data/object/customer")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProcessEventError::Malformed("invoice has no customer".into()))?;

        let member = self
            .users
            .find_by_customer_id(customer_id)
            .await?
            .ok_or(ProcessEventError::UserNotFound)?;

        let price_id = event
            .raw
            .pointer("/data/object/lines/data/0/plan/id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProcessEventError::Malformed("invoice has no plan".into()))?;

        let product = self
            .catalog
            .find_by_price_id(event.provider, price_id)
            .ok_or(ProcessEventError::ProductNotFound)?
            .clone();

        let payment = match self
            .ledger
            .start(NewPayment::settled(
                event.reference.clone(),
                Some(member.id),
                product.code.clone(),
                product.amount,
                event.raw.clone(),
            ))
            .await
        {
            Ok(payment) => payment,
            Err(LedgerError::DuplicateReference(_)) => {
                info!(reference = %event.reference, "replayed invoice, already booked");
                return Ok(EventOutcome::Duplicate);
            }
            Err(err) => return Err(err.into()),
        };

        let activation = self
            .engine
            .activate_subscription(&product, &payment, member)
            .await?;
        Ok(EventOutcome::Activated(activation))
    }

    /// A recurring charge with no invoice of its own (card provider B).
    /// The event reference is the provider's subscription id; the charge is
    /// booked against the agreement opened at checkout.
    async fn recurring_charge(
        &self,
        event: &PaymentEvent,
    ) -> Result<EventOutcome, ProcessEventError> {
        if event.status != TransactionStatus::Approved {
            return Ok(EventOutcome::Skipped);
        }

        let subscription = self
            .subscriptions
            .find_by_subscription_id(&event.reference)
            .await?
            .ok_or_else(|| ProcessEventError::SubscriptionNotFound(event.reference.clone()))?;

        let product = self.catalog.get_purchasable(&subscription.product_code)?.clone();

        // Each charge gets its own ledger row; the provider's transaction
        // id disambiguates repeat charges against the same agreement.
        let reference = match event.raw_str("TransactionId") {
            Some(transaction_id) => format!("{}-{}", subscription.reference, transaction_id),
            None => subscription.reference.clone(),
        };

        let payment = match self
            .ledger
            .start(NewPayment::settled(
                reference,
                Some(subscription.user_id),
                subscription.product_code.clone(),
                product.amount,
                event.raw.clone(),
            ))
            .await
        {
            Ok(payment) => payment,
            Err(LedgerError::DuplicateReference(_)) => {
                info!(subscription = %event.reference, "replayed recurring charge");
                return Ok(EventOutcome::Duplicate);
            }
            Err(err) => return Err(err.into()),
        };

        let member = self
            .users
            .find_by_id(subscription.user_id)
            .await?
            .ok_or(ProcessEventError::UserNotFound)?;

        let activation = self
            .engine
            .activate_subscription(&product, &payment, member)
            .await?;
        Ok(EventOutcome::Activated(activation))
    }

    /// A crypto charge was opened: record a started payment so the later
    /// confirmation has something to finalize.
    async fn charge_created(
        &self,
        event: &PaymentEvent,
    ) -> Result<EventOutcome, ProcessEventError> {
        let (member, product) = self.resolve_crypto_parties(event).await?;

        match self
            .ledger
            .start(NewPayment::started(
                event.reference.clone(),
                Some(member.id),
                product.code.clone(),
                product.amount,
                event.raw.clone(),
            ))
            .await
        {
            Ok(_) => Ok(EventOutcome::Recorded),
            Err(LedgerError::DuplicateReference(_)) => Ok(EventOutcome::Duplicate),
            Err(err) => Err(err.into()),
        }
    }

    /// A crypto charge confirmed on-chain. Deliveries can outrun each other,
    /// so a confirmation with no started payment books one on the fly.
    async fn charge_confirmed(
        &self,
        event: &PaymentEvent,
    ) -> Result<EventOutcome, ProcessEventError> {
        let (member, product) = self.resolve_crypto_parties(event).await?;

        let payment = match self
            .ledger
            .finish(&event.reference, PaymentStatus::Success, event.raw.clone())
            .await
        {
            Ok(payment) => payment,
            Err(LedgerError::PaymentNotFound(_)) => {
                // charge:created never arrived.
                self.ledger
                    .start(NewPayment::settled(
                        event.reference.clone(),
                        Some(member.id),
                        product.code.clone(),
                        product.amount,
                        event.raw.clone(),
                    ))
                    .await?
            }
            Err(LedgerError::AlreadyFinalized(_)) => {
                info!(reference = %event.reference, "replayed charge confirmation");
                return Ok(EventOutcome::Duplicate);
            }
            Err(err) => return Err(err.into()),
        };

        let activation = self
            .engine
            .activate_subscription(&product, &payment, member)
            .await?;
        Ok(EventOutcome::Activated(activation))
    }

    async fn charge_failed(&self, event: &PaymentEvent) -> Result<EventOutcome, ProcessEventError> {
        match self
            .ledger
            .finish(&event.reference, PaymentStatus::Failed, event.raw.clone())
            .await
        {
            Ok(_) => Ok(EventOutcome::Recorded),
            // A failure after a success must never un-activate; a failure
            // for an unknown charge has nothing to record.
            Err(LedgerError::AlreadyFinalized(_)) | Err(LedgerError::PaymentNotFound(_)) => {
                warn!(reference = %event.reference, "charge failure for a non-started payment");
                Ok(EventOutcome::Duplicate)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn subscription_cancelled(
        &self,
        event: &PaymentEvent,
    ) -> Result<EventOutcome, ProcessEventError> {
        let stopped = self.subscriptions.stop(&event.reference).await?;
        if !stopped {
            info!(subscription = %event.reference, "cancellation for unknown or already stopped agreement");
        }
        Ok(EventOutcome::Recorded)
    }

    /// The card provider created or updated its customer record; remember
    /// the customer id so recurring invoices can be attributed.
    async fn customer_updated(
        &self,
        event: &PaymentEvent,
    ) -> Result<EventOutcome, ProcessEventError> {
        let email = event
            .raw
            .pointer("/data/object/email")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProcessEventError::Malformed("customer has no email".into()))?;
        let customer_id = event
            .raw
            .pointer("/data/object/id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProcessEventError::Malformed("customer has no id".into()))?;

        self.users.link_customer_id(email, customer_id).await?;
        Ok(EventOutcome::Recorded)
    }

    /// Crypto events identify the payer by a metadata email and the product
    /// by the hosted checkout id. Accounts are provisioned on the fly.
    async fn resolve_crypto_parties(
        &self,
        event: &PaymentEvent,
    ) -> Result<(Member, Product), ProcessEventError> {
        let email = event
            .raw_str("event/data/metadata/email")
            .ok_or_else(|| ProcessEventError::Malformed("no email in payload".into()))?;

        let member = self
            .users
            .get_or_create_by_email(email, MembershipPlatform::Crypto)
            .await?;

        let checkout_id = event
            .raw_str("event/data/checkout/id")
            .ok_or(ProcessEventError::ProductNotFound)?;
        let product = self
            .catalog
            .find_by_price_id(ProviderKind::Coinbase, checkout_id)
            .ok_or(ProcessEventError::ProductNotFound)?
            .clone();

        Ok((member, product))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Duration;
    use uuid::Uuid;

    use crate::domain::billing::{Payment, Subscription, SubscriptionStatus};
    use crate::domain::catalog::ProductCode;
    use crate::domain::foundation::Timestamp;
    use crate::ports::{Member, MemberNotifier, MembershipExtension, ModerationStatus};

    // ══════════════════════════════════════════════════════════════
    // In-memory ports
    // ══════════════════════════════════════════════════════════════

    #[derive(Default)]
    struct InMemoryLedger {
        payments: Mutex<HashMap<String, Payment>>,
    }

    impl InMemoryLedger {
        fn payment(&self, reference: &str) -> Option<Payment> {
            self.payments.lock().unwrap().get(reference).cloned()
        }

        fn insert_started(&self, reference: &str, user_id: Uuid, product: &str) {
            self.insert_started_with_data(reference, user_id, product, serde_json::json!({}));
        }

        fn insert_started_with_data(
            &self,
            reference: &str,
            user_id: Uuid,
            product: &str,
            data: serde_json::Value,
        ) {
            let payment = Payment {
                id: Uuid::new_v4(),
                reference: reference.to_string(),
                user_id: Some(user_id),
                product_code: ProductCode::new(product),
                amount: 15.0,
                status: PaymentStatus::Started,
                data,
                created_at: Timestamp::now(),
            };
            self.payments
                .lock()
                .unwrap()
                .insert(reference.to_string(), payment);
        }
    }

    #[async_trait]
    impl PaymentLedger for InMemoryLedger {
        async fn start(&self, payment: NewPayment) -> Result<Payment, LedgerError> {
            let mut payments = self.payments.lock().unwrap();
            if payments.contains_key(&payment.reference) {
                return Err(LedgerError::DuplicateReference(payment.reference));
            }
            let stored = Payment {
                id: Uuid::new_v4(),
                reference: payment.reference.clone(),
                user_id: payment.user_id,
                product_code: payment.product_code,
                amount: payment.amount,
                status: payment.status,
                data: payment.data,
                created_at: Timestamp::now(),
            };
            payments.insert(payment.reference, stored.clone());
            Ok(stored)
        }

        async fn get(&self, reference: &str) -> Result<Option<Payment>, LedgerError> {
            Ok(self.payments.lock().unwrap().get(reference).cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Payment>, LedgerError> {
            Ok(self
                .payments
                .lock()
                .unwrap()
                .values()
                .find(|p| p.id == id)
                .cloned())
        }

        async fn finish(
            &self,
            reference: &str,
            status: PaymentStatus,
            data: serde_json::Value,
        ) -> Result<Payment, LedgerError> {
            let mut payments = self.payments.lock().unwrap();
            let payment = payments
                .get_mut(reference)
                .ok_or_else(|| LedgerError::PaymentNotFound(reference.to_string()))?;
            if payment.status.is_terminal() {
                return Err(LedgerError::AlreadyFinalized(reference.to_string()));
            }
            payment.status = status;
            // Same merge the real adapter does with jsonb `||`.
            payment.data = match (payment.data.take(), data) {
                (serde_json::Value::Object(mut stored), serde_json::Value::Object(update)) => {
                    stored.extend(update);
                    serde_json::Value::Object(stored)
                }
                (_, update) => update,
            };
            Ok(payment.clone())
        }

        async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Payment>, LedgerError> {
            Ok(self
                .payments
                .lock()
                .unwrap()
                .values()
                .filter(|p| p.user_id == Some(user_id))
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct InMemoryDirectory {
        members: Mutex<HashMap<Uuid, Member>>,
        extensions: Mutex<Vec<Uuid>>,
    }

    impl InMemoryDirectory {
        fn insert(&self, member: Member) {
            self.members.lock().unwrap().insert(member.id, member);
        }

        fn extension_count(&self) -> usize {
            self.extensions.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl UserDirectory for InMemoryDirectory {
        async fn get_or_create_by_email(
            &self,
            email: &str,
            platform: MembershipPlatform,
        ) -> Result<Member, DomainError> {
            if let Some(existing) = self.find_by_email(email).await? {
                return Ok(existing);
            }
            let member = Member {
                id: Uuid::new_v4(),
                email: email.to_string(),
                membership_expires_at: Timestamp::now(),
                membership_platform: platform,
                membership_platform_data: serde_json::json!({}),
                moderation_status: ModerationStatus::Intro,
                customer_id: None,
            };
            self.insert(member.clone());
            Ok(member)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Member>, DomainError> {
            Ok(self.members.lock().unwrap().get(&id).cloned())
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<Member>, DomainError> {
            Ok(self
                .members
                .lock()
                .unwrap()
                .values()
                .find(|m| m.email == email)
                .cloned())
        }

        async fn find_by_customer_id(
            &self,
            customer_id: &str,
        ) -> Result<Option<Member>, DomainError> {
            Ok(self
                .members
                .lock()
                .unwrap()
                .values()
                .find(|m| m.customer_id.as_deref() == Some(customer_id))
                .cloned())
        }

        async fn link_customer_id(
            &self,
            email: &str,
            customer_id: &str,
        ) -> Result<(), DomainError> {
            for member in self.members.lock().unwrap().values_mut() {
                if member.email == email {
                    member.customer_id = Some(customer_id.to_string());
                }
            }
            Ok(())
        }

        async fn extend_membership(
            &self,
            user_id: Uuid,
            duration: Duration,
            platform_data: serde_json::Value,
        ) -> Result<MembershipExtension, DomainError> {
            let mut members = self.members.lock().unwrap();
            let member = members
                .get_mut(&user_id)
                .ok_or_else(|| DomainError::database("no such member"))?;
            let previous = member.membership_expires_at;
            member.membership_expires_at = previous.later_of(Timestamp::now()).plus(duration);
            member.membership_platform_data = platform_data;
            self.extensions.lock().unwrap().push(user_id);
            Ok(MembershipExtension {
                member: member.clone(),
                previous_expires_at: previous,
            })
        }
    }

    #[derive(Default)]
    struct InMemorySubscriptions {
        rows: Mutex<HashMap<String, Subscription>>,
    }

    impl InMemorySubscriptions {
        fn insert_active(&self, subscription_id: &str, user_id: Uuid, product: &str, reference: &str) {
            let row = Subscription {
                id: Uuid::new_v4(),
                subscription_id: subscription_id.to_string(),
                user_id,
                product_code: ProductCode::new(product),
                amount: 15.0,
                reference: reference.to_string(),
                status: SubscriptionStatus::Active,
                created_at: Timestamp::now(),
            };
            self.rows
                .lock()
                .unwrap()
                .insert(subscription_id.to_string(), row);
        }

        fn status(&self, subscription_id: &str) -> Option<SubscriptionStatus> {
            self.rows
                .lock()
                .unwrap()
                .get(subscription_id)
                .map(|s| s.status)
        }
    }

    #[async_trait]
    impl SubscriptionStore for InMemorySubscriptions {
        async fn create(
            &self,
            subscription: NewSubscription,
        ) -> Result<Subscription, DomainError> {
            let mut rows = self.rows.lock().unwrap();
            if let Some(existing) = rows.get(&subscription.subscription_id) {
                return Ok(existing.clone());
            }
            let row = Subscription {
                id: Uuid::new_v4(),
                subscription_id: subscription.subscription_id.clone(),
                user_id: subscription.user_id,
                product_code: subscription.product_code,
                amount: subscription.amount,
                reference: subscription.reference,
                status: SubscriptionStatus::Active,
                created_at: Timestamp::now(),
            };
            rows.insert(subscription.subscription_id, row.clone());
            Ok(row)
        }

        async fn find_by_subscription_id(
            &self,
            subscription_id: &str,
        ) -> Result<Option<Subscription>, DomainError> {
            Ok(self.rows.lock().unwrap().get(subscription_id).cloned())
        }

        async fn stop(&self, subscription_id: &str) -> Result<bool, DomainError> {
            let mut rows = self.rows.lock().unwrap();
            match rows.get_mut(subscription_id) {
                Some(row) if row.status == SubscriptionStatus::Active => {
                    row.status = SubscriptionStatus::Stopped;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }

    struct NullNotifier;

    #[async_trait]
    impl MemberNotifier for NullNotifier {
        async fn on_registration(&self, _: &Member) -> Result<(), DomainError> {
            Ok(())
        }
        async fn on_renewal(&self, _: &Member) -> Result<(), DomainError> {
            Ok(())
        }
        async fn on_invite_sent(&self, _: &Member, _: &Member) -> Result<(), DomainError> {
            Ok(())
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Fixture
    // ══════════════════════════════════════════════════════════════

    struct Fixture {
        ledger: Arc<InMemoryLedger>,
        users: Arc<InMemoryDirectory>,
        subscriptions: Arc<InMemorySubscriptions>,
        handler: ProcessPaymentEventHandler,
    }

    fn fixture() -> Fixture {
        let catalog = Arc::new(Catalog::standard());
        let ledger = Arc::new(InMemoryLedger::default());
        let users = Arc::new(InMemoryDirectory::default());
        let subscriptions = Arc::new(InMemorySubscriptions::default());
        let engine = Arc::new(ActivationEngine::new(users.clone(), Arc::new(NullNotifier)));

        let handler = ProcessPaymentEventHandler::new(
            catalog,
            ledger.clone(),
            users.clone(),
            subscriptions.clone(),
            engine,
        );

        Fixture {
            ledger,
            users,
            subscriptions,
            handler,
        }
    }

    fn approved_member(fixture: &Fixture, email: &str) -> Member {
        let member = Member {
            id: Uuid::new_v4(),
            email: email.to_string(),
            membership_expires_at: Timestamp::now(),
            membership_platform: MembershipPlatform::Direct,
            membership_platform_data: serde_json::json!({}),
            moderation_status: ModerationStatus::Approved,
            customer_id: None,
        };
        fixture.users.insert(member.clone());
        member
    }

    fn checkout_event(provider: ProviderKind, reference: &str, raw: serde_json::Value) -> PaymentEvent {
        PaymentEvent {
            provider,
            kind: EventKind::CheckoutCompleted,
            reference: reference.to_string(),
            status: TransactionStatus::Approved,
            raw,
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Checkout completion
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn checkout_completion_finalizes_and_activates() {
        let fx = fixture();
        let member = approved_member(&fx, "payer@example.com");
        fx.ledger.insert_started("cs_1", member.id, "club1");

        let outcome = fx
            .handler
            .handle(checkout_event(ProviderKind::Stripe, "cs_1", serde_json::json!({})))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Activated(_)));
        assert_eq!(fx.ledger.payment("cs_1").unwrap().status, PaymentStatus::Success);
        assert_eq!(fx.users.extension_count(), 1);
    }

    #[tokio::test]
    async fn replayed_checkout_completion_is_a_duplicate() {
        let fx = fixture();
        let member = approved_member(&fx, "payer@example.com");
        fx.ledger.insert_started("cs_1", member.id, "club1");

        let event = checkout_event(ProviderKind::Stripe, "cs_1", serde_json::json!({}));
        fx.handler.handle(event.clone()).await.unwrap();
        let outcome = fx.handler.handle(event).await.unwrap();

        assert!(matches!(outcome, EventOutcome::Duplicate));
        // Exactly one extension despite two deliveries.
        assert_eq!(fx.users.extension_count(), 1);
    }

    #[tokio::test]
    async fn checkout_completion_for_unknown_reference_fails() {
        let fx = fixture();
        let result = fx
            .handler
            .handle(checkout_event(ProviderKind::Stripe, "cs_missing", serde_json::json!({})))
            .await;

        assert!(matches!(result, Err(ProcessEventError::PaymentNotFound(_))));
    }

    #[tokio::test]
    async fn refunded_checkout_is_skipped() {
        let fx = fixture();
        let member = approved_member(&fx, "payer@example.com");
        fx.ledger.insert_started("wfp-1", member.id, "club1");

        let mut event = checkout_event(ProviderKind::WayForPay, "wfp-1", serde_json::json!({}));
        event.status = TransactionStatus::Refunded;

        let outcome = fx.handler.handle(event).await.unwrap();
        assert!(matches!(outcome, EventOutcome::Skipped));
        assert_eq!(fx.ledger.payment("wfp-1").unwrap().status, PaymentStatus::Started);
    }

    #[tokio::test]
    async fn checkout_with_subscription_id_mirrors_the_agreement() {
        let fx = fixture();
        let member = approved_member(&fx, "payer@example.com");
        fx.ledger.insert_started("inv-1", member.id, "club1_month_recurrent");

        let raw = serde_json::json!({ "SubscriptionId": "sc_55", "InvoiceId": "inv-1" });
        fx.handler
            .handle(checkout_event(ProviderKind::CloudPayments, "inv-1", raw))
            .await
            .unwrap();

        assert_eq!(
            fx.subscriptions.status("sc_55"),
            Some(SubscriptionStatus::Active)
        );
    }

    #[tokio::test]
    async fn invite_checkout_credits_the_invited_account() {
        let fx = fixture();
        let payer = approved_member(&fx, "payer@example.com");
        let friend = approved_member(&fx, "friend@example.com");
        fx.ledger.insert_started_with_data(
            "cs_inv",
            payer.id,
            "club1_invite",
            serde_json::json!({ "invite": "friend@example.com" }),
        );

        // The full event envelope, as the webhook path hands it over.
        let raw = serde_json::json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_inv",
                "metadata": { "invite": "friend@example.com" },
            }}
        });
        let outcome = fx
            .handler
            .handle(checkout_event(ProviderKind::Stripe, "cs_inv", raw))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Activated(_)));
        // The friend is extended, not the payer.
        assert_eq!(*fx.users.extensions.lock().unwrap(), vec![friend.id]);
        // The checkout-time invite marker survives finalization.
        assert_eq!(
            fx.ledger.payment("cs_inv").unwrap().invited_email(),
            Some("friend@example.com")
        );
    }

    // ══════════════════════════════════════════════════════════════
    // Recurring invoices and charges
    // ══════════════════════════════════════════════════════════════

    fn invoice_event(reference: &str, customer: &str, plan: &str, billing_reason: &str) -> PaymentEvent {
        PaymentEvent {
            provider: ProviderKind::Stripe,
            kind: EventKind::InvoicePaid,
            reference: reference.to_string(),
            status: TransactionStatus::Approved,
            raw: serde_json::json!({
                "data": { "object": {
                    "id": reference,
                    "customer": customer,
                    "billing_reason": billing_reason,
                    "lines": { "data": [ { "plan": { "id": plan } } ] },
                }}
            }),
        }
    }

    #[tokio::test]
    async fn first_invoice_of_new_agreement_is_skipped() {
        let fx = fixture();
        let outcome = fx
            .handler
            .handle(invoice_event("in_1", "cus_1", "price_club1_yearly", "subscription_create"))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Skipped));
        assert!(fx.ledger.payment("in_1").is_none());
    }

    #[tokio::test]
    async fn renewal_invoice_books_settled_payment_and_activates() {
        let fx = fixture();
        let mut member = approved_member(&fx, "payer@example.com");
        member.customer_id = Some("cus_1".to_string());
        fx.users.insert(member);

        let outcome = fx
            .handler
            .handle(invoice_event("in_2", "cus_1", "price_club1_yearly", "subscription_cycle"))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Activated(_)));
        let payment = fx.ledger.payment("in_2").unwrap();
        assert_eq!(payment.status, PaymentStatus::Success);
        assert_eq!(payment.product_code.as_str(), "club1_recurrent_yearly");
    }

    #[tokio::test]
    async fn renewal_invoice_for_unknown_customer_fails() {
        let fx = fixture();
        let result = fx
            .handler
            .handle(invoice_event("in_3", "cus_unknown", "price_club1_yearly", "subscription_cycle"))
            .await;

        assert!(matches!(result, Err(ProcessEventError::UserNotFound)));
    }

    #[tokio::test]
    async fn recurring_charge_books_against_stored_agreement() {
        let fx = fixture();
        let member = approved_member(&fx, "payer@example.com");
        fx.subscriptions
            .insert_active("sc_55", member.id, "club1_month_recurrent", "inv-1");

        let event = PaymentEvent {
            provider: ProviderKind::CloudPayments,
            kind: EventKind::InvoicePaid,
            reference: "sc_55".to_string(),
            status: TransactionStatus::Approved,
            raw: serde_json::json!({ "SubscriptionId": "sc_55", "TransactionId": "777" }),
        };

        let outcome = fx.handler.handle(event).await.unwrap();
        assert!(matches!(outcome, EventOutcome::Activated(_)));
        assert!(fx.ledger.payment("inv-1-777").is_some());
    }

    #[tokio::test]
    async fn recurring_charge_for_unknown_agreement_fails() {
        let fx = fixture();
        let event = PaymentEvent {
            provider: ProviderKind::CloudPayments,
            kind: EventKind::InvoicePaid,
            reference: "sc_unknown".to_string(),
            status: TransactionStatus::Approved,
            raw: serde_json::json!({}),
        };

        let result = fx.handler.handle(event).await;
        assert!(matches!(result, Err(ProcessEventError::SubscriptionNotFound(_))));
    }

    // ══════════════════════════════════════════════════════════════
    // Crypto charges
    // ══════════════════════════════════════════════════════════════

    fn charge_event(kind: EventKind, code: &str, email: &str) -> PaymentEvent {
        PaymentEvent {
            provider: ProviderKind::Coinbase,
            kind,
            reference: code.to_string(),
            status: TransactionStatus::Pending,
            raw: serde_json::json!({
                "event": { "data": {
                    "code": code,
                    "metadata": { "email": email },
                    "checkout": { "id": "checkout_club1" },
                }}
            }),
        }
    }

    #[tokio::test]
    async fn charge_created_provisions_account_and_starts_payment() {
        let fx = fixture();
        let outcome = fx
            .handler
            .handle(charge_event(EventKind::ChargeCreated, "CH-1", "crypto@example.com"))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Recorded));
        assert_eq!(fx.ledger.payment("CH-1").unwrap().status, PaymentStatus::Started);
        let member = fx.users.find_by_email("crypto@example.com").await.unwrap().unwrap();
        assert_eq!(member.membership_platform, MembershipPlatform::Crypto);
    }

    #[tokio::test]
    async fn charge_confirmed_finalizes_started_payment() {
        let fx = fixture();
        fx.handler
            .handle(charge_event(EventKind::ChargeCreated, "CH-1", "crypto@example.com"))
            .await
            .unwrap();

        let outcome = fx
            .handler
            .handle(charge_event(EventKind::ChargeConfirmed, "CH-1", "crypto@example.com"))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Activated(_)));
        assert_eq!(fx.ledger.payment("CH-1").unwrap().status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn charge_confirmed_without_created_books_on_the_fly() {
        let fx = fixture();
        let outcome = fx
            .handler
            .handle(charge_event(EventKind::ChargeConfirmed, "CH-9", "crypto@example.com"))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Activated(_)));
        assert_eq!(fx.ledger.payment("CH-9").unwrap().status, PaymentStatus::Success);
    }

    #[tokio::test]
    async fn charge_failure_never_overwrites_success() {
        let fx = fixture();
        fx.handler
            .handle(charge_event(EventKind::ChargeConfirmed, "CH-1", "crypto@example.com"))
            .await
            .unwrap();

        let outcome = fx
            .handler
            .handle(charge_event(EventKind::ChargeFailed, "CH-1", "crypto@example.com"))
            .await
            .unwrap();

        assert!(matches!(outcome, EventOutcome::Duplicate));
        assert_eq!(fx.ledger.payment("CH-1").unwrap().status, PaymentStatus::Success);
    }

    // ══════════════════════════════════════════════════════════════
    // Lifecycle events
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn provider_cancellation_stops_local_subscription() {
        let fx = fixture();
        let member = approved_member(&fx, "payer@example.com");
        fx.subscriptions
            .insert_active("sc_55", member.id, "club1_month_recurrent", "inv-1");

        let event = PaymentEvent {
            provider: ProviderKind::CloudPayments,
            kind: EventKind::SubscriptionCancelled,
            reference: "sc_55".to_string(),
            status: TransactionStatus::Unknown,
            raw: serde_json::json!({}),
        };

        fx.handler.handle(event.clone()).await.unwrap();
        assert_eq!(fx.subscriptions.status("sc_55"), Some(SubscriptionStatus::Stopped));

        // Replays are harmless.
        let outcome = fx.handler.handle(event).await.unwrap();
        assert!(matches!(outcome, EventOutcome::Recorded));
    }

    #[tokio::test]
    async fn customer_update_links_customer_id() {
        let fx = fixture();
        approved_member(&fx, "payer@example.com");

        let event = PaymentEvent {
            provider: ProviderKind::Stripe,
            kind: EventKind::CustomerUpdated,
            reference: "cus_1".to_string(),
            status: TransactionStatus::Unknown,
            raw: serde_json::json!({
                "data": { "object": { "id": "cus_1", "email": "payer@example.com" } }
            }),
        };

        fx.handler.handle(event).await.unwrap();
        let member = fx.users.find_by_customer_id("cus_1").await.unwrap();
        assert!(member.is_some());
    }

    #[tokio::test]
    async fn unknown_events_are_rejected() {
        let fx = fixture();
        let event = PaymentEvent {
            provider: ProviderKind::Stripe,
            kind: EventKind::Other("payment_intent.created".to_string()),
            reference: "pi_1".to_string(),
            status: TransactionStatus::Unknown,
            raw: serde_json::json!({}),
        };

        let result = fx.handler.handle(event).await;
        assert!(matches!(result, Err(ProcessEventError::UnknownEvent(_))));
    }
}
