//! CreateCheckoutHandler - opens a provider checkout and books the started
//! ledger payment in one go.
//!
//! Three payer scenarios:
//! - anonymous: an email is supplied and an account is provisioned for it
//! - invite-a-friend: an authenticated payer names someone else's email;
//!   the invite target is recorded in the payment data for the activation
//!   engine to pick up
//! - renewal: an authenticated payer buys for themselves, reusing the
//!   provider customer record when one is already linked

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::domain::billing::{LedgerError, NewPayment, Payment};
use crate::domain::catalog::{Catalog, CatalogError, ProductCode};
use crate::domain::foundation::DomainError;
use crate::domain::providers::ProviderKind;
use crate::ports::{
    BillingGateway, CheckoutRequest, GatewayError, GatewayInvoice, Member, MembershipPlatform,
    PaymentLedger, UserDirectory,
};

#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    pub provider: ProviderKind,
    pub product_code: ProductCode,
    /// Anonymous payer's email; ignored when `payer` is set.
    pub email: Option<String>,
    /// The authenticated account paying, if any.
    pub payer: Option<Member>,
    /// Email of the person an invite product is bought for.
    pub invite_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateCheckoutResult {
    pub payment: Payment,
    pub invoice: GatewayInvoice,
}

#[derive(Debug, Clone, Error)]
pub enum CreateCheckoutError {
    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("Product {0} can no longer be purchased")]
    LegacyProduct(String),

    #[error("Payments via {0} are not configured")]
    ProviderUnavailable(ProviderKind),

    #[error("{0}")]
    Gateway(String),

    #[error("Something went wrong, please try again")]
    Storage(String),
}

impl From<CatalogError> for CreateCheckoutError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::UnknownProduct(code) => CreateCheckoutError::UnknownProduct(code),
            CatalogError::LegacyProduct(code) => CreateCheckoutError::LegacyProduct(code),
            CatalogError::Invalid(message) => CreateCheckoutError::Storage(message),
        }
    }
}

impl From<GatewayError> for CreateCheckoutError {
    fn from(err: GatewayError) -> Self {
        CreateCheckoutError::Gateway(err.message)
    }
}

impl From<DomainError> for CreateCheckoutError {
    fn from(err: DomainError) -> Self {
        CreateCheckoutError::Storage(err.to_string())
    }
}

impl From<LedgerError> for CreateCheckoutError {
    fn from(err: LedgerError) -> Self {
        CreateCheckoutError::Storage(err.to_string())
    }
}

pub struct CreateCheckoutHandler {
    catalog: Arc<Catalog>,
    ledger: Arc<dyn PaymentLedger>,
    users: Arc<dyn UserDirectory>,
    gateways: HashMap<ProviderKind, Arc<dyn BillingGateway>>,
}

impl CreateCheckoutHandler {
    pub fn new(
        catalog: Arc<Catalog>,
        ledger: Arc<dyn PaymentLedger>,
        users: Arc<dyn UserDirectory>,
        gateways: HashMap<ProviderKind, Arc<dyn BillingGateway>>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            users,
            gateways,
        }
    }

    pub async fn handle(
        &self,
        command: CreateCheckoutCommand,
    ) -> Result<CreateCheckoutResult, CreateCheckoutError> {
        let product = self
            .catalog
            .get_purchasable(&command.product_code)?
            .clone();

        let payer = match command.payer {
            Some(member) => member,
            None => {
                let email = normalized_email(command.email.as_deref())?;
                self.users
                    .get_or_create_by_email(&email, MembershipPlatform::Direct)
                    .await?
            }
        };

        let data = match &command.invite_email {
            Some(raw) => {
                let invite_email = normalized_email(Some(raw))?;
                serde_json::json!({ "invite": invite_email })
            }
            None => serde_json::json!({}),
        };

        let gateway = self
            .gateways
            .get(&command.provider)
            .ok_or(CreateCheckoutError::ProviderUnavailable(command.provider))?;

        let invoice = gateway
            .create_checkout(CheckoutRequest {
                product_code: product.code.clone(),
                email: payer.email.clone(),
                customer_id: payer.customer_id.clone(),
                recurrent: product.recurrence.is_recurrent(),
            })
            .await?;

        let payment = self
            .ledger
            .start(NewPayment::started(
                invoice.id.clone(),
                Some(payer.id),
                product.code.clone(),
                product.amount,
                data,
            ))
            .await?;

        info!(
            provider = %command.provider,
            reference = %payment.reference,
            product = %product.code,
            user = %payer.id,
            "checkout created",
        );

        Ok(CreateCheckoutResult { payment, invoice })
    }
}

fn normalized_email(email: Option<&str>) -> Result<String, CreateCheckoutError> {
    let email = email.unwrap_or_default().trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(CreateCheckoutError::InvalidEmail);
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Duration;
    use uuid::Uuid;

    use crate::domain::billing::PaymentStatus;
    use crate::domain::foundation::Timestamp;
    use crate::ports::{
        GatewaySubscription, MembershipExtension, ModerationStatus,
    };

    struct StubGateway {
        requests: Mutex<Vec<CheckoutRequest>>,
    }

    impl StubGateway {
        fn new() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
            }
        }

        fn last_request(&self) -> CheckoutRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl BillingGateway for StubGateway {
        async fn create_checkout(
            &self,
            request: CheckoutRequest,
        ) -> Result<GatewayInvoice, GatewayError> {
            self.requests.lock().unwrap().push(request);
            Ok(GatewayInvoice {
                id: "cs_1".to_string(),
                url: "https://pay.example.com/cs_1".to_string(),
            })
        }

        async fn get_subscription(&self, _: &str) -> Result<GatewaySubscription, GatewayError> {
            Err(GatewayError::new("not implemented"))
        }

        async fn cancel_subscription(&self, _: &str) -> Result<(), GatewayError> {
            Ok(())
        }

        async fn expire_checkout_session(&self, _: &str) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingLedger {
        started: Mutex<Vec<NewPayment>>,
    }

    #[async_trait]
    impl PaymentLedger for RecordingLedger {
        async fn start(&self, payment: NewPayment) -> Result<Payment, LedgerError> {
            self.started.lock().unwrap().push(payment.clone());
            Ok(Payment {
                id: Uuid::new_v4(),
                reference: payment.reference,
                user_id: payment.user_id,
                product_code: payment.product_code,
                amount: payment.amount,
                status: payment.status,
                data: payment.data,
                created_at: Timestamp::now(),
            })
        }

        async fn get(&self, _: &str) -> Result<Option<Payment>, LedgerError> {
            Ok(None)
        }

        async fn find_by_id(&self, _: Uuid) -> Result<Option<Payment>, LedgerError> {
            Ok(None)
        }

        async fn finish(
            &self,
            reference: &str,
            _: PaymentStatus,
            _: serde_json::Value,
        ) -> Result<Payment, LedgerError> {
            Err(LedgerError::PaymentNotFound(reference.to_string()))
        }

        async fn list_for_user(&self, _: Uuid) -> Result<Vec<Payment>, LedgerError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct StubDirectory {
        created: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl UserDirectory for StubDirectory {
        async fn get_or_create_by_email(
            &self,
            email: &str,
            platform: MembershipPlatform,
        ) -> Result<Member, DomainError> {
            self.created.lock().unwrap().push(email.to_string());
            Ok(Member {
                id: Uuid::new_v4(),
                email: email.to_string(),
                membership_expires_at: Timestamp::now(),
                membership_platform: platform,
                membership_platform_data: serde_json::json!({}),
                moderation_status: ModerationStatus::Intro,
                customer_id: None,
            })
        }

        async fn find_by_id(&self, _: Uuid) -> Result<Option<Member>, DomainError> {
            Ok(None)
        }

        async fn find_by_email(&self, _: &str) -> Result<Option<Member>, DomainError> {
            Ok(None)
        }

        async fn find_by_customer_id(&self, _: &str) -> Result<Option<Member>, DomainError> {
            Ok(None)
        }

        async fn link_customer_id(&self, _: &str, _: &str) -> Result<(), DomainError> {
            Ok(())
        }

        async fn extend_membership(
            &self,
            _: Uuid,
            _: Duration,
            _: serde_json::Value,
        ) -> Result<MembershipExtension, DomainError> {
            Err(DomainError::database("not expected in these tests"))
        }
    }

    struct Fixture {
        gateway: Arc<StubGateway>,
        ledger: Arc<RecordingLedger>,
        directory: Arc<StubDirectory>,
        handler: CreateCheckoutHandler,
    }

    fn fixture() -> Fixture {
        let gateway = Arc::new(StubGateway::new());
        let ledger = Arc::new(RecordingLedger::default());
        let directory = Arc::new(StubDirectory::default());

        let mut gateways: HashMap<ProviderKind, Arc<dyn BillingGateway>> = HashMap::new();
        gateways.insert(ProviderKind::Stripe, gateway.clone());

        let handler = CreateCheckoutHandler::new(
            Arc::new(Catalog::standard()),
            ledger.clone(),
            directory.clone(),
            gateways,
        );

        Fixture {
            gateway,
            ledger,
            directory,
            handler,
        }
    }

    fn renewal_member() -> Member {
        Member {
            id: Uuid::new_v4(),
            email: "payer@example.com".to_string(),
            membership_expires_at: Timestamp::now(),
            membership_platform: MembershipPlatform::Direct,
            membership_platform_data: serde_json::json!({}),
            moderation_status: ModerationStatus::Approved,
            customer_id: Some("cus_1".to_string()),
        }
    }

    fn command(product: &str) -> CreateCheckoutCommand {
        CreateCheckoutCommand {
            provider: ProviderKind::Stripe,
            product_code: ProductCode::new(product),
            email: None,
            payer: None,
            invite_email: None,
        }
    }

    #[tokio::test]
    async fn anonymous_checkout_provisions_account_and_starts_payment() {
        let fx = fixture();
        let mut cmd = command("club1");
        cmd.email = Some("  New.Payer@Example.COM ".to_string());

        let result = fx.handler.handle(cmd).await.unwrap();

        assert_eq!(
            fx.directory.created.lock().unwrap().as_slice(),
            ["new.payer@example.com"]
        );
        assert_eq!(result.payment.reference, "cs_1");
        assert_eq!(result.payment.status, PaymentStatus::Started);
        assert_eq!(result.invoice.url, "https://pay.example.com/cs_1");
    }

    #[tokio::test]
    async fn anonymous_checkout_requires_a_plausible_email() {
        let fx = fixture();
        let mut cmd = command("club1");
        cmd.email = Some("not-an-email".to_string());

        let result = fx.handler.handle(cmd).await;
        assert!(matches!(result, Err(CreateCheckoutError::InvalidEmail)));
        assert!(fx.ledger.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn renewal_reuses_the_linked_customer_record() {
        let fx = fixture();
        let mut cmd = command("club1_recurrent_yearly");
        cmd.payer = Some(renewal_member());

        fx.handler.handle(cmd).await.unwrap();

        let request = fx.gateway.last_request();
        assert_eq!(request.customer_id.as_deref(), Some("cus_1"));
        assert!(request.recurrent);
        assert!(fx.directory.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invite_checkout_records_the_target_email() {
        let fx = fixture();
        let mut cmd = command("club1_invite");
        cmd.payer = Some(renewal_member());
        cmd.invite_email = Some("Friend@Example.com".to_string());

        let result = fx.handler.handle(cmd).await.unwrap();

        assert_eq!(
            result.payment.data,
            serde_json::json!({ "invite": "friend@example.com" })
        );
    }

    #[tokio::test]
    async fn legacy_products_are_rejected() {
        let fx = fixture();
        let mut cmd = command("legacy_club1");
        cmd.payer = Some(renewal_member());

        let result = fx.handler.handle(cmd).await;
        assert!(matches!(result, Err(CreateCheckoutError::LegacyProduct(_))));
    }

    #[tokio::test]
    async fn unconfigured_provider_is_an_error() {
        let fx = fixture();
        let mut cmd = command("club1");
        cmd.provider = ProviderKind::Coinbase;
        cmd.payer = Some(renewal_member());

        let result = fx.handler.handle(cmd).await;
        assert!(matches!(
            result,
            Err(CreateCheckoutError::ProviderUnavailable(_))
        ));
    }
}
