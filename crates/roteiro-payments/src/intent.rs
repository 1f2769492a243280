//! Purchase Intents
//!
//! One record per checkout attempt, tracked from creation through terminal
//! settlement. The status transition is the idempotency gate for webhook
//! redelivery: a grant is applied only by the caller that observes
//! [`Transition::Applied`] into `Completed`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use roteiro_entitlements::UserId;

use crate::error::{PaymentError, Result};
use crate::plan::PurchasePlan;

/// Purchase intent lifecycle
///
/// `Pending → {Completed | Failed | Refunded}`, all terminal except that a
/// later chargeback moves `Completed → Refunded`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl IntentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Completed => "completed",
            IntentStatus::Failed => "failed",
            IntentStatus::Refunded => "refunded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, IntentStatus::Pending)
    }
}

/// Result of an attempted status transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The status moved; this caller owns any follow-up effect
    Applied { from: IntentStatus },
    /// The intent was already where the state machine leaves it
    Unchanged { current: IntentStatus },
}

/// A checkout attempt
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PurchaseIntent {
    pub id: Uuid,

    /// Buyer
    pub user_id: UserId,

    /// Plan being purchased
    pub plan: PurchasePlan,

    /// Price at checkout time (BRL)
    pub amount: Decimal,

    /// Provider checkout-session (preference) id, known at creation
    pub preference_id: String,

    /// Provider payment id, backfilled once at settlement
    pub payment_id: Option<String>,

    pub status: IntentStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseIntent {
    pub fn new(user_id: UserId, plan: PurchasePlan, preference_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            plan,
            amount: plan.pricing().amount,
            preference_id: preference_id.into(),
            payment_id: None,
            status: IntentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Purchase intent storage trait
#[async_trait]
pub trait IntentStore: Send + Sync {
    /// Persist a freshly created intent
    async fn insert(&self, intent: PurchaseIntent) -> Result<()>;

    /// Look up an intent by its provider preference id
    async fn find_by_preference(&self, preference_id: &str) -> Result<Option<PurchaseIntent>>;

    /// Atomically move an intent's status (check-and-set)
    ///
    /// Legal moves: `Pending` to any terminal status, and `Completed` to
    /// `Refunded`. Any other request leaves the stored status untouched
    /// and reports [`Transition::Unchanged`]. The provider payment id is
    /// backfilled on first sight either way.
    async fn transition(
        &self,
        id: Uuid,
        to: IntentStatus,
        payment_id: Option<&str>,
    ) -> Result<Transition>;
}

/// In-memory intent store (for development and tests)
pub struct MemoryIntentStore {
    intents: RwLock<HashMap<Uuid, PurchaseIntent>>,
    by_preference: RwLock<HashMap<String, Uuid>>,
}

impl Default for MemoryIntentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIntentStore {
    pub fn new() -> Self {
        Self {
            intents: RwLock::new(HashMap::new()),
            by_preference: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl IntentStore for MemoryIntentStore {
    async fn insert(&self, intent: PurchaseIntent) -> Result<()> {
        let mut intents = self.intents.write().unwrap();
        let mut by_pref = self.by_preference.write().unwrap();

        by_pref.insert(intent.preference_id.clone(), intent.id);
        intents.insert(intent.id, intent);

        Ok(())
    }

    async fn find_by_preference(&self, preference_id: &str) -> Result<Option<PurchaseIntent>> {
        let by_pref = self.by_preference.read().unwrap();
        let intents = self.intents.read().unwrap();

        if let Some(id) = by_pref.get(preference_id) {
            Ok(intents.get(id).cloned())
        } else {
            Ok(None)
        }
    }

    async fn transition(
        &self,
        id: Uuid,
        to: IntentStatus,
        payment_id: Option<&str>,
    ) -> Result<Transition> {
        let mut intents = self.intents.write().unwrap();
        let intent = intents
            .get_mut(&id)
            .ok_or_else(|| PaymentError::IntentNotFound(id.to_string()))?;

        if intent.payment_id.is_none() {
            if let Some(pid) = payment_id {
                intent.payment_id = Some(pid.to_string());
                intent.updated_at = Utc::now();
            }
        }

        let from = intent.status;
        let legal = matches!(
            (from, to),
            (IntentStatus::Pending, _) | (IntentStatus::Completed, IntentStatus::Refunded)
        ) && to.is_terminal()
            && from != to;

        if legal {
            intent.status = to;
            intent.updated_at = Utc::now();
            Ok(Transition::Applied { from })
        } else {
            Ok(Transition::Unchanged { current: from })
        }
    }
}
