//! Entitlement Records
//!
//! Per-user counters and subscription state. Exactly one record exists per
//! user; it is created lazily the first time a gated action is consumed.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::policy::{self, Quota};

/// Owning user identity
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Subscription tiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Monthly,
    Annual,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionTier::Monthly => "monthly",
            SubscriptionTier::Annual => "annual",
        }
    }

    /// Chat quota while this tier is active
    pub fn chat_quota(&self) -> Quota {
        match self {
            SubscriptionTier::Monthly => Quota::Limited(policy::MONTHLY_CHAT_LIMIT),
            SubscriptionTier::Annual => Quota::Unlimited,
        }
    }

    /// Subscription duration in calendar months
    pub fn duration_months(&self) -> u32 {
        match self {
            SubscriptionTier::Monthly => 1,
            SubscriptionTier::Annual => 12,
        }
    }
}

/// One user's entitlement state
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntitlementRecord {
    /// Owning user
    pub user_id: UserId,

    /// Free itinerary generations consumed (monotone, policy-bounded)
    pub free_itineraries_used: u32,

    /// Purchased itinerary credits remaining (never negative)
    pub paid_credits: u32,

    /// Chat messages consumed in the current counting window
    pub chat_messages_used: u32,

    /// Start of the current chat counting window
    pub chat_window_started_at: DateTime<Utc>,

    /// Active subscription tier, if any was ever granted
    pub subscription_tier: Option<SubscriptionTier>,

    /// Subscription expiry; the subscription is active iff `now` is before it
    pub subscription_expires_at: Option<DateTime<Utc>>,
}

impl EntitlementRecord {
    /// Create a fresh record with no usage
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            free_itineraries_used: 0,
            paid_credits: 0,
            chat_messages_used: 0,
            chat_window_started_at: Utc::now(),
            subscription_tier: None,
            subscription_expires_at: None,
        }
    }

    /// The subscription tier currently in force, if unexpired
    pub fn active_subscription(&self) -> Option<SubscriptionTier> {
        let tier = self.subscription_tier?;
        let expires = self.subscription_expires_at?;

        if Utc::now() < expires {
            Some(tier)
        } else {
            None
        }
    }

    /// Chat quota currently applicable to this user
    pub fn chat_quota(&self) -> Quota {
        match self.active_subscription() {
            Some(tier) => tier.chat_quota(),
            None => Quota::Limited(policy::FREE_CHAT_LIMIT),
        }
    }

    /// Roll the chat window forward if a subscriber's month has lapsed
    ///
    /// Free-tier counters never reset; only active subscribers get a fresh
    /// window each month.
    pub fn roll_chat_window_if_due(&mut self) {
        if self.active_subscription().is_none() {
            return;
        }

        let now = Utc::now();
        if now >= self.chat_window_started_at + Months::new(1) {
            self.chat_messages_used = 0;
            self.chat_window_started_at = now;
        }
    }

    /// Chat usage after accounting for a lapsed subscriber window
    pub fn effective_chat_used(&self) -> u32 {
        if self.active_subscription().is_some()
            && Utc::now() >= self.chat_window_started_at + Months::new(1)
        {
            0
        } else {
            self.chat_messages_used
        }
    }
}
