//! Payment Gateway
//!
//! Abstraction over the payment provider, plus the Mercado Pago
//! implementation.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::error::{PaymentError, Result};
use crate::intent::IntentStatus;

/// Request to create a hosted-checkout preference
#[derive(Clone, Debug)]
pub struct PreferenceRequest {
    pub title: String,
    pub description: String,
    /// Price in BRL
    pub amount: Decimal,
    /// Opaque reference echoed back on settlement
    pub external_reference: String,
    /// URL to redirect after successful payment
    pub success_url: String,
    /// URL to redirect if checkout is cancelled
    pub cancel_url: String,
}

/// A created checkout preference
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutPreference {
    /// Provider checkout-session id
    pub preference_id: String,

    /// URL to redirect the buyer to
    pub checkout_url: String,
}

/// Authoritative payment details fetched from the provider
///
/// Webhook notifications are not trusted to carry status or amount; this
/// is what the Reconciler acts on.
#[derive(Clone, Debug)]
pub struct PaymentDetails {
    pub id: String,
    /// Provider-side status string (see [`map_payment_status`])
    pub status: String,
    pub external_reference: Option<String>,
    pub preference_id: Option<String>,
}

/// Payment gateway trait (Strategy pattern)
///
/// Implement this per provider; the rest of the crate only sees the trait.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted-checkout session
    async fn create_preference(&self, request: &PreferenceRequest) -> Result<CheckoutPreference>;

    /// Fetch full payment details by provider payment id
    async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails>;

    /// Gateway name
    fn name(&self) -> &str;
}

/// Map a provider payment status onto the intent state machine
///
/// `Some(Pending)` means the payment is not settled yet (no transition);
/// `None` means the status is unknown and the notification is ignored.
pub fn map_payment_status(provider_status: &str) -> Option<IntentStatus> {
    match provider_status {
        "approved" => Some(IntentStatus::Completed),
        "pending" | "authorized" | "in_process" | "in_mediation" => Some(IntentStatus::Pending),
        "rejected" | "cancelled" => Some(IntentStatus::Failed),
        "refunded" | "charged_back" => Some(IntentStatus::Refunded),
        _ => None,
    }
}

/// Mercado Pago configuration
#[derive(Clone, Debug)]
pub struct MercadoPagoConfig {
    /// API access token
    pub access_token: String,

    /// Webhook signature secret (verification skipped when absent)
    pub webhook_secret: Option<String>,

    /// API base URL
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl MercadoPagoConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            webhook_secret: None,
            base_url: "https://api.mercadopago.com".into(),
            timeout_secs: 10,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let access_token = std::env::var("MP_ACCESS_TOKEN")
            .map_err(|_| PaymentError::Config("MP_ACCESS_TOKEN not set".into()))?;

        let mut config = Self::new(access_token);
        config.webhook_secret = std::env::var("MP_WEBHOOK_SECRET").ok();
        if let Ok(base_url) = std::env::var("MP_BASE_URL") {
            config.base_url = base_url;
        }

        Ok(config)
    }
}

/// Mercado Pago REST client
pub struct MercadoPagoClient {
    http: reqwest::Client,
    config: MercadoPagoConfig,
}

impl MercadoPagoClient {
    pub fn new(config: MercadoPagoConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PaymentError::Config(e.to_string()))?;

        Ok(Self { http, config })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(MercadoPagoConfig::from_env()?)
    }

    /// Get the webhook secret, if configured
    pub fn webhook_secret(&self) -> Option<&str> {
        self.config.webhook_secret.as_deref()
    }
}

#[derive(Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: Option<String>,
    sandbox_init_point: Option<String>,
}

#[derive(Deserialize)]
struct PaymentResponse {
    // The live API returns a numeric id; sandboxes have returned strings
    id: serde_json::Value,
    status: String,
    external_reference: Option<String>,
    preference_id: Option<String>,
}

fn id_to_string(id: &serde_json::Value) -> Option<String> {
    match id {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn create_preference(&self, request: &PreferenceRequest) -> Result<CheckoutPreference> {
        let unit_price = request
            .amount
            .to_f64()
            .ok_or_else(|| PaymentError::Provider("unrepresentable amount".into()))?;

        let body = json!({
            "items": [{
                "title": request.title,
                "description": request.description,
                "quantity": 1,
                "currency_id": "BRL",
                "unit_price": unit_price,
            }],
            "external_reference": request.external_reference,
            "back_urls": {
                "success": request.success_url,
                "failure": request.cancel_url,
                "pending": request.success_url,
            },
            "auto_return": "approved",
        });

        let response = self
            .http
            .post(format!("{}/checkout/preferences", self.config.base_url))
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Provider(format!(
                "preference creation failed: HTTP {}",
                response.status()
            )));
        }

        let preference: PreferenceResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        let checkout_url = preference
            .init_point
            .or(preference.sandbox_init_point)
            .ok_or_else(|| PaymentError::Provider("no checkout URL returned".into()))?;

        Ok(CheckoutPreference {
            preference_id: preference.id,
            checkout_url,
        })
    }

    async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails> {
        let response = self
            .http
            .get(format!("{}/v1/payments/{}", self.config.base_url, payment_id))
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Provider(format!(
                "payment lookup failed: HTTP {}",
                response.status()
            )));
        }

        let payment: PaymentResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Provider(e.to_string()))?;

        Ok(PaymentDetails {
            id: id_to_string(&payment.id).unwrap_or_else(|| payment_id.to_string()),
            status: payment.status,
            external_reference: payment.external_reference,
            preference_id: payment.preference_id,
        })
    }

    fn name(&self) -> &str {
        "mercadopago"
    }
}
