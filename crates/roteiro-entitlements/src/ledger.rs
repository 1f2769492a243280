//! Entitlement Ledger
//!
//! The single source of truth for "may this user perform a gated action".
//! Clients may cache the answers for display, but every consume re-checks
//! here; a cached "allowed" flag is never trusted for the action itself.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{EntitlementError, Result};
use crate::policy;
use crate::record::{SubscriptionTier, UserId};
use crate::store::EntitlementStore;

/// Outcome of consuming one itinerary generation
///
/// `Denied` is a normal negative result, not an error: callers show an
/// upsell for it and a retry message for [`EntitlementError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItineraryConsume {
    /// Covered by an active subscription; no counter was touched
    Subscription,
    /// One free-tier unit was consumed
    FreeUnit,
    /// One purchased credit was consumed
    PaidCredit,
    /// No entitlement remained; nothing was mutated
    Denied,
}

impl ItineraryConsume {
    pub fn allowed(&self) -> bool {
        !matches!(self, ItineraryConsume::Denied)
    }
}

/// Outcome of consuming one chat message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatConsume {
    /// Annual tier: unmetered, nothing counted
    Unlimited,
    /// Counted against the user's current window
    Counted,
    /// Quota exhausted; nothing was mutated
    Denied,
}

impl ChatConsume {
    pub fn allowed(&self) -> bool {
        !matches!(self, ChatConsume::Denied)
    }
}

/// Read-only entitlement snapshot for the client
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntitlementStatus {
    pub free_itineraries_remaining: u32,
    pub paid_credits: u32,
    /// Remaining chat messages in the current window; `None` = unlimited
    pub chat_messages_remaining: Option<u32>,
    pub subscription_tier: Option<SubscriptionTier>,
    pub subscription_expires_at: Option<DateTime<Utc>>,
}

/// Entitlement ledger over a storage backend
pub struct EntitlementLedger<S: EntitlementStore> {
    store: Arc<S>,
}

impl<S: EntitlementStore> EntitlementLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// May this user generate an itinerary?
    ///
    /// A user with no record yet is eligible: the free unit is granted
    /// lazily on first consume.
    pub async fn can_generate_itinerary(&self, user: &UserId) -> Result<bool> {
        let Some(record) = self.store.fetch(user).await? else {
            return Ok(true);
        };

        Ok(record.active_subscription().is_some()
            || record.free_itineraries_used < policy::FREE_ITINERARY_LIMIT
            || record.paid_credits > 0)
    }

    /// May this user send a chat message?
    pub async fn can_send_chat_message(&self, user: &UserId) -> Result<bool> {
        let Some(record) = self.store.fetch(user).await? else {
            return Ok(true);
        };

        Ok(record.chat_quota().allows(record.effective_chat_used()))
    }

    /// Consume one itinerary generation
    ///
    /// Priority: active subscription (no mutation), then a free-tier unit,
    /// then a purchased credit. Each fallback is a single conditional
    /// store write, so a lost race reads as `Denied` rather than a
    /// double-spend.
    pub async fn consume_itinerary_credit(&self, user: &UserId) -> Result<ItineraryConsume> {
        if let Some(record) = self.store.fetch(user).await? {
            if record.active_subscription().is_some() {
                return Ok(ItineraryConsume::Subscription);
            }
        }

        if self.store.consume_free_itinerary(user).await? {
            return Ok(ItineraryConsume::FreeUnit);
        }

        if self.store.consume_paid_credit(user).await? {
            return Ok(ItineraryConsume::PaidCredit);
        }

        tracing::debug!(user = %user, "Itinerary consume denied");
        Ok(ItineraryConsume::Denied)
    }

    /// Consume one chat message
    ///
    /// Annual subscribers bypass counting entirely; everyone else gets a
    /// single conditional check-and-increment under their current quota.
    pub async fn consume_chat_message(&self, user: &UserId) -> Result<ChatConsume> {
        if let Some(record) = self.store.fetch(user).await? {
            if record.active_subscription() == Some(SubscriptionTier::Annual) {
                return Ok(ChatConsume::Unlimited);
            }
        }

        if self.store.consume_chat_message(user).await? {
            Ok(ChatConsume::Counted)
        } else {
            tracing::debug!(user = %user, "Chat consume denied");
            Ok(ChatConsume::Denied)
        }
    }

    /// Add purchased credits (Reconciler entry point)
    pub async fn grant_credits(&self, user: &UserId, delta: u32) -> Result<u32> {
        if delta == 0 {
            return Err(EntitlementError::InvalidGrant(
                "credit grant must be positive".into(),
            ));
        }

        let balance = self.store.add_credits(user, delta).await?;

        tracing::info!(
            user = %user,
            credits = delta,
            balance,
            "Granted itinerary credits"
        );

        Ok(balance)
    }

    /// Record a subscription (Reconciler entry point)
    ///
    /// The expiry is always `now + duration`. Renewing early resets the
    /// clock from the payment moment instead of extending the prior
    /// expiry.
    pub async fn grant_subscription(
        &self,
        user: &UserId,
        tier: SubscriptionTier,
    ) -> Result<DateTime<Utc>> {
        let expires_at = Utc::now() + Months::new(tier.duration_months());
        self.store.set_subscription(user, tier, expires_at).await?;

        tracing::info!(
            user = %user,
            tier = tier.as_str(),
            expires_at = %expires_at,
            "Granted subscription"
        );

        Ok(expires_at)
    }

    /// Read-only snapshot of a user's entitlements
    pub async fn status(&self, user: &UserId) -> Result<EntitlementStatus> {
        let Some(record) = self.store.fetch(user).await? else {
            return Ok(EntitlementStatus {
                free_itineraries_remaining: policy::FREE_ITINERARY_LIMIT,
                paid_credits: 0,
                chat_messages_remaining: Some(policy::FREE_CHAT_LIMIT),
                subscription_tier: None,
                subscription_expires_at: None,
            });
        };

        let tier = record.active_subscription();

        Ok(EntitlementStatus {
            free_itineraries_remaining: policy::FREE_ITINERARY_LIMIT
                .saturating_sub(record.free_itineraries_used),
            paid_credits: record.paid_credits,
            chat_messages_remaining: record
                .chat_quota()
                .remaining(record.effective_chat_used()),
            subscription_tier: tier,
            subscription_expires_at: tier.and(record.subscription_expires_at),
        })
    }
}
