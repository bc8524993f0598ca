//! Credit packages and Stripe payment intent creation.
//!
//! The server never talks to Stripe beyond creating payment intents;
//! confirmation happens client-side with the returned client secret.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{RequestConfig, StripeConfig};
use crate::error::{BillingError, BillingResult};

/// A purchasable credit bundle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditPackage {
    pub id: &'static str,
    pub name: &'static str,
    pub credits: u32,
    pub price_cents: u32,
}

/// Fixed catalog of credit bundles offered for purchase.
pub const CREDIT_PACKAGES: &[CreditPackage] = &[
    CreditPackage {
        id: "starter",
        name: "Starter Pack",
        credits: 500,
        price_cents: 499,
    },
    CreditPackage {
        id: "standard",
        name: "Standard Pack",
        credits: 1_500,
        price_cents: 999,
    },
    CreditPackage {
        id: "pro",
        name: "Pro Pack",
        credits: 4_000,
        price_cents: 1_999,
    },
    CreditPackage {
        id: "max",
        name: "Max Pack",
        credits: 12_000,
        price_cents: 4_999,
    },
];

/// Look up a credit package by id.
pub fn find_package(package_id: &str) -> Option<&'static CreditPackage> {
    CREDIT_PACKAGES.iter().find(|p| p.id == package_id)
}

/// Payment intent handle returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub amount: u32,
    pub currency: String,
}

#[derive(Debug, Deserialize)]
struct StripeIntentResponse {
    id: String,
    client_secret: String,
    amount: u32,
    currency: String,
}

/// Thin client for the Stripe payment intents API.
pub struct StripeClient {
    client: Client,
    base_url: String,
    secret_key: Option<String>,
}

impl StripeClient {
    pub fn new(config: &StripeConfig, request: &RequestConfig) -> BillingResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request.timeout_ms))
            .build()?;

        if config.secret_key.is_some() {
            info!("Stripe billing enabled");
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }

    /// Create a payment intent for a credit package.
    pub async fn create_payment_intent(&self, package_id: &str) -> BillingResult<PaymentIntent> {
        let package = find_package(package_id).ok_or_else(|| BillingError::UnknownPackage {
            package_id: package_id.to_string(),
        })?;
        let secret = self
            .secret_key
            .as_deref()
            .ok_or(BillingError::NotConfigured)?;

        let params = [
            ("amount", package.price_cents.to_string()),
            ("currency", "usd".to_string()),
            ("metadata[packageId]", package.id.to_string()),
            ("metadata[credits]", package.credits.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(secret)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::Stripe {
                status: status.as_u16(),
                message: stripe_error_message(&body),
            });
        }

        let intent: StripeIntentResponse = response.json().await?;
        info!(package = package.id, intent = %intent.id, "Created payment intent");

        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret,
            amount: intent.amount,
            currency: intent.currency,
        })
    }
}

/// Pull the human-readable message out of a Stripe error body.
fn stripe_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn client_with(secret: Option<&str>) -> StripeClient {
        StripeClient::new(
            &StripeConfig {
                secret_key: secret.map(|s| s.to_string()),
                base_url: "https://api.stripe.com".to_string(),
            },
            &RequestConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_packages_have_unique_ids_and_prices() {
        let ids: HashSet<&str> = CREDIT_PACKAGES.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), CREDIT_PACKAGES.len());
        assert!(CREDIT_PACKAGES.iter().all(|p| p.price_cents > 0));
        assert!(CREDIT_PACKAGES.iter().all(|p| p.credits > 0));
    }

    #[test]
    fn test_find_package() {
        assert_eq!(find_package("starter").map(|p| p.credits), Some(500));
        assert!(find_package("diamond").is_none());
    }

    #[test]
    fn test_package_serializes_camel_case() {
        let value = serde_json::to_value(&CREDIT_PACKAGES[0]).unwrap();
        assert!(value.get("priceCents").is_some());
    }

    #[tokio::test]
    async fn test_unknown_package_rejected_before_any_request() {
        let client = client_with(Some("sk_test_123"));
        let err = client.create_payment_intent("diamond").await.unwrap_err();
        assert!(matches!(err, BillingError::UnknownPackage { .. }));
    }

    #[tokio::test]
    async fn test_unconfigured_client_rejects() {
        let client = client_with(None);
        assert!(!client.is_configured());
        let err = client.create_payment_intent("starter").await.unwrap_err();
        assert!(matches!(err, BillingError::NotConfigured));
    }

    #[test]
    fn test_stripe_error_message_extraction() {
        let body = r#"{"error": {"message": "No such customer", "type": "invalid_request_error"}}"#;
        assert_eq!(stripe_error_message(body), "No such customer");
        assert_eq!(stripe_error_message("plain failure"), "plain failure");
    }
}
