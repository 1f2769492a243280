//! Payment Reconciliation
//!
//! Turns an asynchronous, possibly-duplicated, possibly-out-of-order
//! provider notification into a deterministic, exactly-once entitlement
//! grant. The notification body is never trusted: the authoritative
//! status comes from a payment-details fetch, the buyer and plan from the
//! decoded external reference, and the exactly-once guarantee from the
//! intent's atomic status transition.
//!
//! Every path here resolves to a [`ReconcileOutcome`]; the webhook
//! endpoint acknowledges all of them. Returning an error to the provider
//! would only trigger its retry/backoff without any corrective local
//! action, so business failures are logged and swallowed at this
//! boundary.

use std::sync::Arc;

use roteiro_entitlements::{EntitlementLedger, EntitlementStore, UserId};

use crate::gateway::{map_payment_status, PaymentGateway};
use crate::intent::{IntentStatus, IntentStore, Transition};
use crate::notification::PaymentNotification;
use crate::plan::Grant;
use crate::reference::ExternalReference;

/// What a webhook delivery amounted to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// First completion: the grant was applied to the ledger
    Granted { user_id: UserId, grant: Grant },

    /// Redelivery of a payment whose intent is already terminal
    AlreadyProcessed { status: IntentStatus },

    /// Payment rejected or cancelled; no ledger mutation
    RecordedFailure,

    /// Refund or chargeback recorded; granted credits are not clawed back
    RecordedRefund,

    /// Provider has not settled the payment yet
    StillPending,

    /// Not a payment notification, or an unknown provider status
    Ignored,

    /// Payment could not be matched to a purchase; needs manual review
    Unmatched { reason: String },

    /// Transient failure; the provider's redelivery will retry us
    Deferred { reason: String },
}

/// Webhook reconciler
pub struct Reconciler<I: IntentStore, E: EntitlementStore> {
    gateway: Arc<dyn PaymentGateway>,
    intents: Arc<I>,
    ledger: Arc<EntitlementLedger<E>>,
}

impl<I: IntentStore, E: EntitlementStore> Reconciler<I, E> {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        intents: Arc<I>,
        ledger: Arc<EntitlementLedger<E>>,
    ) -> Self {
        Self {
            gateway,
            intents,
            ledger,
        }
    }

    /// Process one notification delivery
    ///
    /// Infallible by design: every failure mode folds into an outcome the
    /// webhook endpoint acknowledges. Safe to run any number of times for
    /// the same payment.
    pub async fn process(&self, notification: PaymentNotification) -> ReconcileOutcome {
        let PaymentNotification::Payment { payment_id } = notification else {
            tracing::debug!("Ignoring non-payment notification");
            return ReconcileOutcome::Ignored;
        };

        tracing::info!(payment_id = %payment_id, "Reconciling payment notification");

        let details = match self.gateway.get_payment(&payment_id).await {
            Ok(details) => details,
            Err(e) => {
                tracing::warn!(payment_id = %payment_id, error = %e, "Payment lookup failed");
                return ReconcileOutcome::Deferred {
                    reason: e.to_string(),
                };
            }
        };

        let Some(raw_reference) = details.external_reference.as_deref() else {
            tracing::warn!(payment_id = %payment_id, "Payment carries no external reference");
            return ReconcileOutcome::Unmatched {
                reason: "missing external reference".into(),
            };
        };

        let reference = match ExternalReference::decode(raw_reference) {
            Ok(reference) => reference,
            Err(e) => {
                tracing::warn!(
                    payment_id = %payment_id,
                    raw = raw_reference,
                    error = %e,
                    "External reference did not decode"
                );
                return ReconcileOutcome::Unmatched {
                    reason: e.to_string(),
                };
            }
        };

        let Some(mapped) = map_payment_status(&details.status) else {
            tracing::debug!(
                payment_id = %payment_id,
                status = %details.status,
                "Unknown provider status"
            );
            return ReconcileOutcome::Ignored;
        };

        if mapped == IntentStatus::Pending {
            tracing::debug!(payment_id = %payment_id, status = %details.status, "Not settled yet");
            return ReconcileOutcome::StillPending;
        }

        let Some(preference_id) = details.preference_id.as_deref() else {
            tracing::warn!(payment_id = %payment_id, "Payment carries no preference id");
            return ReconcileOutcome::Unmatched {
                reason: "missing preference id".into(),
            };
        };

        let intent = match self.intents.find_by_preference(preference_id).await {
            Ok(Some(intent)) => intent,
            Ok(None) => {
                tracing::warn!(
                    payment_id = %payment_id,
                    preference_id,
                    "No purchase intent for preference"
                );
                return ReconcileOutcome::Unmatched {
                    reason: format!("no intent for preference {preference_id}"),
                };
            }
            Err(e) => {
                tracing::error!(payment_id = %payment_id, error = %e, "Intent lookup failed");
                return ReconcileOutcome::Deferred {
                    reason: e.to_string(),
                };
            }
        };

        let transition = match self
            .intents
            .transition(intent.id, mapped, Some(&details.id))
            .await
        {
            Ok(transition) => transition,
            Err(e) => {
                tracing::error!(intent_id = %intent.id, error = %e, "Status transition failed");
                return ReconcileOutcome::Deferred {
                    reason: e.to_string(),
                };
            }
        };

        match transition {
            Transition::Unchanged { current } => {
                tracing::info!(
                    intent_id = %intent.id,
                    status = current.as_str(),
                    "Notification replayed; intent already settled"
                );
                ReconcileOutcome::AlreadyProcessed { status: current }
            }
            Transition::Applied { from } => {
                tracing::info!(
                    intent_id = %intent.id,
                    from = from.as_str(),
                    to = mapped.as_str(),
                    "Intent settled"
                );

                match mapped {
                    IntentStatus::Completed => self.apply_grant(&reference, &payment_id).await,
                    IntentStatus::Refunded => ReconcileOutcome::RecordedRefund,
                    IntentStatus::Failed => ReconcileOutcome::RecordedFailure,
                    IntentStatus::Pending => unreachable!("pending filtered above"),
                }
            }
        }
    }

    /// Apply a first-completion grant to the ledger
    async fn apply_grant(
        &self,
        reference: &ExternalReference,
        payment_id: &str,
    ) -> ReconcileOutcome {
        let grant = reference.plan.grant();

        let applied = match grant {
            Grant::Credits(credits) => self
                .ledger
                .grant_credits(&reference.user_id, credits)
                .await
                .map(|_| ()),
            Grant::Subscription(tier) => self
                .ledger
                .grant_subscription(&reference.user_id, tier)
                .await
                .map(|_| ()),
        };

        match applied {
            Ok(()) => ReconcileOutcome::Granted {
                user_id: reference.user_id.clone(),
                grant,
            },
            Err(e) => {
                // The intent is already Completed, so redelivery will not
                // retry this grant; it needs manual reconciliation.
                tracing::error!(
                    payment_id = %payment_id,
                    user = %reference.user_id,
                    error = %e,
                    "Grant failed after settlement; manual reconciliation required"
                );
                ReconcileOutcome::Deferred {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PaymentError, Result};
    use crate::gateway::{CheckoutPreference, PaymentDetails, PreferenceRequest};
    use crate::intent::{MemoryIntentStore, PurchaseIntent};
    use crate::plan::PurchasePlan;
    use async_trait::async_trait;
    use chrono::{Months, Utc};
    use roteiro_entitlements::{MemoryEntitlementStore, SubscriptionTier};
    use std::collections::HashMap;
    use std::sync::RwLock;

    struct StubGateway {
        payments: RwLock<HashMap<String, PaymentDetails>>,
        unavailable: bool,
    }

    impl StubGateway {
        fn new() -> Self {
            Self {
                payments: RwLock::new(HashMap::new()),
                unavailable: false,
            }
        }

        fn unavailable() -> Self {
            Self {
                payments: RwLock::new(HashMap::new()),
                unavailable: true,
            }
        }

        fn put(&self, details: PaymentDetails) {
            let mut payments = self.payments.write().unwrap();
            payments.insert(details.id.clone(), details);
        }
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_preference(
            &self,
            _request: &PreferenceRequest,
        ) -> Result<CheckoutPreference> {
            Err(PaymentError::Provider("not used".into()))
        }

        async fn get_payment(&self, payment_id: &str) -> Result<PaymentDetails> {
            if self.unavailable {
                return Err(PaymentError::Provider("timeout".into()));
            }
            let payments = self.payments.read().unwrap();
            payments
                .get(payment_id)
                .cloned()
                .ok_or_else(|| PaymentError::Provider("HTTP 404".into()))
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    struct Harness {
        gateway: Arc<StubGateway>,
        intents: Arc<MemoryIntentStore>,
        store: Arc<MemoryEntitlementStore>,
        ledger: Arc<EntitlementLedger<MemoryEntitlementStore>>,
        reconciler: Reconciler<MemoryIntentStore, MemoryEntitlementStore>,
    }

    fn harness(gateway: StubGateway) -> Harness {
        let gateway = Arc::new(gateway);
        let intents = Arc::new(MemoryIntentStore::new());
        let store = Arc::new(MemoryEntitlementStore::new());
        let ledger = Arc::new(EntitlementLedger::new(store.clone()));
        let reconciler = Reconciler::new(gateway.clone(), intents.clone(), ledger.clone());
        Harness {
            gateway,
            intents,
            store,
            ledger,
            reconciler,
        }
    }

    fn user() -> UserId {
        UserId::new("user-1")
    }

    async fn seed_purchase(h: &Harness, plan: PurchasePlan, provider_status: &str) -> PurchaseIntent {
        let intent = PurchaseIntent::new(user(), plan, "pref-1");
        h.intents.insert(intent.clone()).await.unwrap();

        let reference = ExternalReference::new(user(), plan).encode().unwrap();
        h.gateway.put(PaymentDetails {
            id: "pay-1".into(),
            status: provider_status.into(),
            external_reference: Some(reference),
            preference_id: Some("pref-1".into()),
        });

        intent
    }

    fn payment_notification() -> PaymentNotification {
        PaymentNotification::Payment {
            payment_id: "pay-1".into(),
        }
    }

    #[tokio::test]
    async fn test_approved_single_credit_grants_once() {
        let h = harness(StubGateway::new());
        seed_purchase(&h, PurchasePlan::SingleCredit, "approved").await;

        let outcome = h.reconciler.process(payment_notification()).await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Granted {
                user_id: user(),
                grant: Grant::Credits(1)
            }
        );

        let record = h.store.fetch(&user()).await.unwrap().unwrap();
        assert_eq!(record.paid_credits, 1);

        let intent = h.intents.find_by_preference("pref-1").await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Completed);
        assert_eq!(intent.payment_id.as_deref(), Some("pay-1"));
    }

    #[tokio::test]
    async fn test_replay_grants_exactly_once() {
        let h = harness(StubGateway::new());
        seed_purchase(&h, PurchasePlan::CreditPack, "approved").await;

        h.reconciler.process(payment_notification()).await;
        let replay = h.reconciler.process(payment_notification()).await;

        assert_eq!(
            replay,
            ReconcileOutcome::AlreadyProcessed {
                status: IntentStatus::Completed
            }
        );

        // 5-credit pack credited exactly once, not twice
        let record = h.store.fetch(&user()).await.unwrap().unwrap();
        assert_eq!(record.paid_credits, 5);
    }

    #[tokio::test]
    async fn test_rejected_payment_records_failure_without_grant() {
        let h = harness(StubGateway::new());
        seed_purchase(&h, PurchasePlan::SingleCredit, "rejected").await;

        let outcome = h.reconciler.process(payment_notification()).await;
        assert_eq!(outcome, ReconcileOutcome::RecordedFailure);

        let intent = h.intents.find_by_preference("pref-1").await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Failed);
        assert!(h.store.fetch(&user()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_monthly_subscription_activates_chat() {
        let h = harness(StubGateway::new());
        seed_purchase(&h, PurchasePlan::MonthlySubscription, "approved").await;

        // Exhaust the free chat allowance first
        for _ in 0..roteiro_entitlements::policy::FREE_CHAT_LIMIT {
            h.ledger.consume_chat_message(&user()).await.unwrap();
        }
        assert!(!h.ledger.can_send_chat_message(&user()).await.unwrap());

        let outcome = h.reconciler.process(payment_notification()).await;
        assert_eq!(
            outcome,
            ReconcileOutcome::Granted {
                user_id: user(),
                grant: Grant::Subscription(SubscriptionTier::Monthly)
            }
        );

        let record = h.store.fetch(&user()).await.unwrap().unwrap();
        assert_eq!(record.subscription_tier, Some(SubscriptionTier::Monthly));
        let expires = record.subscription_expires_at.unwrap();
        assert!(expires <= Utc::now() + Months::new(1));

        assert!(h.ledger.can_send_chat_message(&user()).await.unwrap());
    }

    #[tokio::test]
    async fn test_pending_status_leaves_intent_open() {
        let h = harness(StubGateway::new());
        seed_purchase(&h, PurchasePlan::SingleCredit, "in_process").await;

        let outcome = h.reconciler.process(payment_notification()).await;
        assert_eq!(outcome, ReconcileOutcome::StillPending);

        let intent = h.intents.find_by_preference("pref-1").await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Pending);

        // Settlement arrives later and still grants
        h.gateway.put(PaymentDetails {
            id: "pay-1".into(),
            status: "approved".into(),
            external_reference: Some(
                ExternalReference::new(user(), PurchasePlan::SingleCredit)
                    .encode()
                    .unwrap(),
            ),
            preference_id: Some("pref-1".into()),
        });
        let settled = h.reconciler.process(payment_notification()).await;
        assert!(matches!(settled, ReconcileOutcome::Granted { .. }));
    }

    #[tokio::test]
    async fn test_chargeback_after_completion_keeps_credits() {
        let h = harness(StubGateway::new());
        seed_purchase(&h, PurchasePlan::SingleCredit, "approved").await;
        h.reconciler.process(payment_notification()).await;

        h.gateway.put(PaymentDetails {
            id: "pay-1".into(),
            status: "charged_back".into(),
            external_reference: Some(
                ExternalReference::new(user(), PurchasePlan::SingleCredit)
                    .encode()
                    .unwrap(),
            ),
            preference_id: Some("pref-1".into()),
        });

        let outcome = h.reconciler.process(payment_notification()).await;
        assert_eq!(outcome, ReconcileOutcome::RecordedRefund);

        let intent = h.intents.find_by_preference("pref-1").await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Refunded);
        let record = h.store.fetch(&user()).await.unwrap().unwrap();
        assert_eq!(record.paid_credits, 1);
    }

    #[tokio::test]
    async fn test_ignore_notification() {
        let h = harness(StubGateway::new());
        let outcome = h.reconciler.process(PaymentNotification::Ignore).await;
        assert_eq!(outcome, ReconcileOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_unknown_provider_status_ignored() {
        let h = harness(StubGateway::new());
        seed_purchase(&h, PurchasePlan::SingleCredit, "some_future_status").await;

        let outcome = h.reconciler.process(payment_notification()).await;
        assert_eq!(outcome, ReconcileOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_missing_reference_is_unmatched() {
        let h = harness(StubGateway::new());
        h.gateway.put(PaymentDetails {
            id: "pay-1".into(),
            status: "approved".into(),
            external_reference: None,
            preference_id: Some("pref-1".into()),
        });

        let outcome = h.reconciler.process(payment_notification()).await;
        assert!(matches!(outcome, ReconcileOutcome::Unmatched { .. }));
    }

    #[tokio::test]
    async fn test_undecodable_reference_is_unmatched() {
        let h = harness(StubGateway::new());
        h.gateway.put(PaymentDetails {
            id: "pay-1".into(),
            status: "approved".into(),
            external_reference: Some("opaque-legacy-token".into()),
            preference_id: Some("pref-1".into()),
        });

        let outcome = h.reconciler.process(payment_notification()).await;
        assert!(matches!(outcome, ReconcileOutcome::Unmatched { .. }));
    }

    #[tokio::test]
    async fn test_unknown_preference_is_unmatched() {
        let h = harness(StubGateway::new());
        h.gateway.put(PaymentDetails {
            id: "pay-1".into(),
            status: "approved".into(),
            external_reference: Some(
                ExternalReference::new(user(), PurchasePlan::SingleCredit)
                    .encode()
                    .unwrap(),
            ),
            preference_id: Some("pref-unknown".into()),
        });

        let outcome = h.reconciler.process(payment_notification()).await;
        assert!(matches!(outcome, ReconcileOutcome::Unmatched { .. }));
    }

    #[tokio::test]
    async fn test_provider_outage_defers_to_redelivery() {
        let h = harness(StubGateway::unavailable());

        let outcome = h.reconciler.process(payment_notification()).await;
        assert!(matches!(outcome, ReconcileOutcome::Deferred { .. }));
    }
}
