//! Outbound provider REST clients.
//!
//! One [`BillingGateway`](crate::ports::BillingGateway) implementation per
//! processor with an API we call. The crypto provider is push-only and has
//! no client here.

mod cloudpayments_client;
mod stripe_client;
mod wayforpay_client;

pub use cloudpayments_client::{CloudPaymentsClient, CloudPaymentsClientConfig};
pub use stripe_client::{StripeClient, StripeClientConfig};
pub use wayforpay_client::{WayForPayClient, WayForPayClientConfig};
