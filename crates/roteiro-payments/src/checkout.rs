//! Checkout
//!
//! Begins a purchase: creates the provider's hosted-checkout preference
//! and records the pending [`PurchaseIntent`] the webhook will later
//! settle against.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use roteiro_entitlements::UserId;

use crate::error::Result;
use crate::gateway::{PaymentGateway, PreferenceRequest};
use crate::intent::{IntentStore, PurchaseIntent};
use crate::plan::PurchasePlan;
use crate::reference::ExternalReference;

/// Request to begin a checkout
#[derive(Clone, Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Buyer
    pub user_id: UserId,

    /// Plan to purchase
    pub plan: PurchasePlan,

    /// URL to redirect after successful payment
    pub success_url: String,

    /// URL to redirect if checkout is cancelled
    pub cancel_url: String,
}

/// Result of beginning a checkout
#[derive(Clone, Debug, Serialize)]
pub struct CheckoutSession {
    /// Local purchase-intent id
    pub intent_id: Uuid,

    /// Provider checkout-session id
    pub preference_id: String,

    /// URL to redirect the buyer to
    pub checkout_url: String,

    /// Plan being purchased
    pub plan: PurchasePlan,

    /// Price at checkout time (BRL)
    pub amount: Decimal,
}

/// Checkout orchestration over a gateway and an intent store
pub struct CheckoutService<I: IntentStore> {
    gateway: Arc<dyn PaymentGateway>,
    intents: Arc<I>,
}

impl<I: IntentStore> CheckoutService<I> {
    pub fn new(gateway: Arc<dyn PaymentGateway>, intents: Arc<I>) -> Self {
        Self { gateway, intents }
    }

    /// Create the provider preference and the pending intent
    pub async fn begin(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let pricing = request.plan.pricing();
        let reference =
            ExternalReference::new(request.user_id.clone(), request.plan).encode()?;

        let preference = self
            .gateway
            .create_preference(&PreferenceRequest {
                title: pricing.title,
                description: pricing.description,
                amount: pricing.amount,
                external_reference: reference,
                success_url: request.success_url,
                cancel_url: request.cancel_url,
            })
            .await?;

        let intent = PurchaseIntent::new(request.user_id, request.plan, &preference.preference_id);
        let session = CheckoutSession {
            intent_id: intent.id,
            preference_id: preference.preference_id.clone(),
            checkout_url: preference.checkout_url,
            plan: request.plan,
            amount: intent.amount,
        };

        self.intents.insert(intent).await?;

        tracing::info!(
            intent_id = %session.intent_id,
            plan = session.plan.as_str(),
            preference_id = %session.preference_id,
            "Created checkout"
        );

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PaymentError;
    use crate::gateway::{CheckoutPreference, PaymentDetails};
    use crate::intent::{IntentStatus, MemoryIntentStore};
    use async_trait::async_trait;

    struct FixedGateway;

    #[async_trait]
    impl PaymentGateway for FixedGateway {
        async fn create_preference(
            &self,
            request: &PreferenceRequest,
        ) -> Result<CheckoutPreference> {
            assert!(!request.external_reference.is_empty());
            Ok(CheckoutPreference {
                preference_id: "pref-1".into(),
                checkout_url: "https://checkout.example/pref-1".into(),
            })
        }

        async fn get_payment(&self, _payment_id: &str) -> Result<PaymentDetails> {
            Err(PaymentError::Provider("not used".into()))
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_begin_records_pending_intent() {
        let intents = Arc::new(MemoryIntentStore::new());
        let service = CheckoutService::new(Arc::new(FixedGateway), intents.clone());

        let session = service
            .begin(CheckoutRequest {
                user_id: UserId::new("user-1"),
                plan: PurchasePlan::CreditPack,
                success_url: "https://roteiro.example/obrigado".into(),
                cancel_url: "https://roteiro.example/planos".into(),
            })
            .await
            .unwrap();

        assert_eq!(session.preference_id, "pref-1");
        assert_eq!(session.amount, PurchasePlan::CreditPack.pricing().amount);

        let intent = intents
            .find_by_preference("pref-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(intent.status, IntentStatus::Pending);
        assert_eq!(intent.plan, PurchasePlan::CreditPack);
        assert!(intent.payment_id.is_none());
    }
}
