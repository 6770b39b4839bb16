//! Clubhouse service entrypoint: configuration, database pool, dependency
//! wiring, and the axum server.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use clubhouse::adapters::gateways::{
    CloudPaymentsClient, CloudPaymentsClientConfig, StripeClient, StripeClientConfig,
    WayForPayClient, WayForPayClientConfig,
};
use clubhouse::adapters::http::{
    billing_routes, invite_routes, webhook_routes, BillingHandlers, InviteHandlers,
    WebhookHandlers,
};
use clubhouse::adapters::notify::LogNotifier;
use clubhouse::adapters::postgres::{
    PostgresInviteRepository, PostgresPaymentLedger, PostgresSubscriptionStore,
    PostgresUserDirectory,
};
use clubhouse::application::handlers::billing::{
    CreateCheckoutHandler, ProcessPaymentEventHandler, StopSubscriptionHandler,
};
use clubhouse::application::handlers::invites::{CreateInviteHandler, RedeemInviteHandler};
use clubhouse::config::AppConfig;
use clubhouse::domain::billing::ActivationEngine;
use clubhouse::domain::catalog::Catalog;
use clubhouse::domain::providers::{
    CloudPaymentsVerifier, CoinbaseVerifier, ProviderKind, StripeVerifier, WayForPaySigner,
    WayForPayVerifier,
};
use clubhouse::ports::{
    BillingGateway, InviteRepository, MemberNotifier, PaymentLedger, SubscriptionStore,
    UserDirectory,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        info!("running database migrations");
        sqlx::migrate!().run(&pool).await?;
    }

    let catalog = Arc::new(Catalog::standard());

    // Storage adapters
    let ledger: Arc<dyn PaymentLedger> = Arc::new(PostgresPaymentLedger::new(pool.clone()));
    let users: Arc<dyn UserDirectory> = Arc::new(PostgresUserDirectory::new(pool.clone()));
    let invites: Arc<dyn InviteRepository> = Arc::new(PostgresInviteRepository::new(pool.clone()));
    let subscriptions: Arc<dyn SubscriptionStore> =
        Arc::new(PostgresSubscriptionStore::new(pool.clone()));

    let notifier: Arc<dyn MemberNotifier> = Arc::new(LogNotifier::default());
    let engine = Arc::new(ActivationEngine::new(users.clone(), notifier));

    // Outbound gateways and inbound verifiers per configured provider
    let mut gateways: HashMap<ProviderKind, Arc<dyn BillingGateway>> = HashMap::new();

    let process_handler = Arc::new(ProcessPaymentEventHandler::new(
        catalog.clone(),
        ledger.clone(),
        users.clone(),
        subscriptions.clone(),
        engine.clone(),
    ));
    let mut webhook_handlers = WebhookHandlers::new(process_handler);

    if let Some(stripe) = &config.providers.stripe {
        let client_config =
            StripeClientConfig::new(&stripe.api_key, &stripe.success_url, &stripe.cancel_url);
        gateways.insert(
            ProviderKind::Stripe,
            Arc::new(StripeClient::new(client_config, catalog.clone())),
        );
        webhook_handlers =
            webhook_handlers.with_stripe(Arc::new(StripeVerifier::new(&stripe.webhook_secret)));
        if let Some(legacy_secret) = &stripe.legacy_webhook_secret {
            webhook_handlers = webhook_handlers
                .with_stripe_legacy(Arc::new(StripeVerifier::legacy(legacy_secret)));
        }
    }

    if let Some(cloudpayments) = &config.providers.cloudpayments {
        let client_config = CloudPaymentsClientConfig::new(
            &cloudpayments.public_id,
            &cloudpayments.api_secret,
            &cloudpayments.success_redirect_url,
        );
        gateways.insert(
            ProviderKind::CloudPayments,
            Arc::new(CloudPaymentsClient::new(client_config, catalog.clone())),
        );
        webhook_handlers = webhook_handlers
            .with_cloudpayments(Arc::new(CloudPaymentsVerifier::new(&cloudpayments.api_secret)));
    }

    if let Some(wayforpay) = &config.providers.wayforpay {
        let client_config = WayForPayClientConfig::new(
            &wayforpay.merchant_account,
            &wayforpay.merchant_domain,
            &wayforpay.service_url,
        );
        let signer = WayForPaySigner::new(&wayforpay.merchant_secret);
        gateways.insert(
            ProviderKind::WayForPay,
            Arc::new(WayForPayClient::new(client_config, signer, catalog.clone())),
        );
        webhook_handlers = webhook_handlers
            .with_wayforpay(Arc::new(WayForPayVerifier::new(&wayforpay.merchant_secret)));
    }

    if let Some(coinbase) = &config.providers.coinbase {
        webhook_handlers = webhook_handlers
            .with_coinbase(Arc::new(CoinbaseVerifier::new(&coinbase.webhook_secret)));
    }

    // Application handlers
    let create_checkout_handler = Arc::new(CreateCheckoutHandler::new(
        catalog.clone(),
        ledger.clone(),
        users.clone(),
        gateways.clone(),
    ));
    let stop_subscription_handler = Arc::new(StopSubscriptionHandler::new(
        subscriptions.clone(),
        gateways.clone(),
    ));
    let create_invite_handler = Arc::new(CreateInviteHandler::new(
        catalog.clone(),
        ledger.clone(),
        invites.clone(),
    ));
    let redeem_invite_handler = Arc::new(RedeemInviteHandler::new(
        catalog.clone(),
        invites.clone(),
        ledger.clone(),
        users.clone(),
        engine.clone(),
    ));

    let billing_handlers = BillingHandlers::new(
        create_checkout_handler,
        stop_subscription_handler,
        ledger.clone(),
        users.clone(),
    );
    let invite_handlers =
        InviteHandlers::new(create_invite_handler, redeem_invite_handler, invites.clone());

    let app = Router::new()
        .nest("/webhooks", webhook_routes(webhook_handlers))
        .nest("/billing", billing_routes(billing_handlers))
        .nest("/invites", invite_routes(invite_handlers))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let addr = config.server.socket_addr()?;
    info!(%addr, "clubhouse listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
