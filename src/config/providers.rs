//! Payment provider configuration.
//!
//! Every provider section is optional: only the ones present get a
//! gateway and a webhook verifier wired at startup. At least one must be
//! configured for the service to be useful.

use serde::Deserialize;

use super::error::ValidationError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    pub stripe: Option<StripeConfig>,
    pub cloudpayments: Option<CloudPaymentsConfig>,
    pub wayforpay: Option<WayForPayConfig>,
    pub coinbase: Option<CoinbaseConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    /// Stripe API key
    pub api_key: String,

    /// Webhook signing secret for the main endpoint
    pub webhook_secret: String,

    /// Signing secret for the retired legacy endpoint, while it still
    /// receives traffic
    pub legacy_webhook_secret: Option<String>,

    /// Where the payer lands after a successful checkout
    pub success_url: String,

    /// Where the payer lands after abandoning a checkout
    pub cancel_url: String,
}

impl StripeConfig {
    pub fn is_test_mode(&self) -> bool {
        self.api_key.starts_with("sk_test_")
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.api_key.is_empty() {
            return Err(ValidationError::MissingRequired("STRIPE_API_KEY"));
        }
        if !self.api_key.starts_with("sk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !self.webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if let Some(secret) = &self.legacy_webhook_secret {
            if !secret.starts_with("whsec_") {
                return Err(ValidationError::InvalidStripeWebhookSecret);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudPaymentsConfig {
    pub public_id: String,

    /// API password; also the webhook HMAC secret
    pub api_secret: String,

    /// Where the payer lands after a successful order
    pub success_redirect_url: String,
}

impl CloudPaymentsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.public_id.is_empty() {
            return Err(ValidationError::MissingRequired("CLOUDPAYMENTS_PUBLIC_ID"));
        }
        if self.api_secret.is_empty() {
            return Err(ValidationError::MissingRequired("CLOUDPAYMENTS_API_SECRET"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WayForPayConfig {
    pub merchant_account: String,
    pub merchant_domain: String,

    /// Merchant secret; signs outbound requests and webhook acks
    pub merchant_secret: String,

    /// Callback URL the provider delivers webhooks to
    pub service_url: String,
}

impl WayForPayConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.merchant_account.is_empty() {
            return Err(ValidationError::MissingRequired("WAYFORPAY_MERCHANT_ACCOUNT"));
        }
        if self.merchant_secret.is_empty() {
            return Err(ValidationError::MissingRequired("WAYFORPAY_MERCHANT_SECRET"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoinbaseConfig {
    /// Webhook shared secret
    pub webhook_secret: String,
}

impl CoinbaseConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("COINBASE_WEBHOOK_SECRET"));
        }
        Ok(())
    }
}

impl ProvidersConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stripe.is_none()
            && self.cloudpayments.is_none()
            && self.wayforpay.is_none()
            && self.coinbase.is_none()
        {
            return Err(ValidationError::NoProviderConfigured);
        }
        if let Some(stripe) = &self.stripe {
            stripe.validate()?;
        }
        if let Some(cloudpayments) = &self.cloudpayments {
            cloudpayments.validate()?;
        }
        if let Some(wayforpay) = &self.wayforpay {
            wayforpay.validate()?;
        }
        if let Some(coinbase) = &self.coinbase {
            coinbase.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stripe() -> StripeConfig {
        StripeConfig {
            api_key: "sk_test_abcd1234".to_string(),
            webhook_secret: "whsec_xyz789".to_string(),
            legacy_webhook_secret: None,
            success_url: "https://club.example.com/thanks".to_string(),
            cancel_url: "https://club.example.com/pay".to_string(),
        }
    }

    #[test]
    fn no_provider_at_all_is_invalid() {
        assert!(ProvidersConfig::default().validate().is_err());
    }

    #[test]
    fn one_valid_provider_is_enough() {
        let config = ProvidersConfig {
            stripe: Some(stripe()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn wrong_stripe_key_prefix_is_invalid() {
        let mut config = stripe();
        config.api_key = "pk_test_abcd".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_legacy_secret_is_invalid() {
        let mut config = stripe();
        config.legacy_webhook_secret = Some("plain_secret".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mode_detection() {
        assert!(stripe().is_test_mode());
        let mut live = stripe();
        live.api_key = "sk_live_abcd".to_string();
        assert!(!live.is_test_mode());
    }
}
