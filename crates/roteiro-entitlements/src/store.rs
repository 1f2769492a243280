//! Entitlement Storage
//!
//! Storage seam for entitlement records. Every consume operation is a
//! single conditional update executed inside the store, never a
//! read-modify-write in ledger code: two concurrent consumes for the same
//! user must not both succeed past the last remaining unit. A backing
//! database implements these with conditional writes (e.g. "decrement
//! where paid_credits > 0"); the in-memory store holds its write lock for
//! the full check-and-mutate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::Result;
use crate::policy::{self, Quota};
use crate::record::{EntitlementRecord, SubscriptionTier, UserId};

/// Entitlement storage trait
///
/// A lookup miss is `Ok(None)`, distinct from `Err(Storage)`: a brand-new
/// user is eligible for the free tier, a failed lookup is not.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Fetch a user's record, if one exists yet
    async fn fetch(&self, user: &UserId) -> Result<Option<EntitlementRecord>>;

    /// Consume one free itinerary unit if any remains (atomic per user)
    ///
    /// Creates the record on first use, then increments
    /// `free_itineraries_used` only while it is under the free limit.
    async fn consume_free_itinerary(&self, user: &UserId) -> Result<bool>;

    /// Consume one paid credit if any remains (atomic per user)
    async fn consume_paid_credit(&self, user: &UserId) -> Result<bool>;

    /// Consume one chat message under the user's current quota (atomic)
    ///
    /// Applies the subscriber monthly-window reset and the quota check in
    /// the same conditional step. Unlimited tiers pass without counting.
    async fn consume_chat_message(&self, user: &UserId) -> Result<bool>;

    /// Add purchased credits; returns the new balance
    async fn add_credits(&self, user: &UserId, delta: u32) -> Result<u32>;

    /// Record a subscription with an absolute expiry
    async fn set_subscription(
        &self,
        user: &UserId,
        tier: SubscriptionTier,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// In-memory entitlement store (for development and tests)
pub struct MemoryEntitlementStore {
    records: RwLock<HashMap<UserId, EntitlementRecord>>,
}

impl Default for MemoryEntitlementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEntitlementStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Seed a record directly (test setup)
    pub fn insert(&self, record: EntitlementRecord) {
        let mut records = self.records.write().unwrap();
        records.insert(record.user_id.clone(), record);
    }
}

#[async_trait]
impl EntitlementStore for MemoryEntitlementStore {
    async fn fetch(&self, user: &UserId) -> Result<Option<EntitlementRecord>> {
        let records = self.records.read().unwrap();
        Ok(records.get(user).cloned())
    }

    async fn consume_free_itinerary(&self, user: &UserId) -> Result<bool> {
        let mut records = self.records.write().unwrap();
        let record = records
            .entry(user.clone())
            .or_insert_with(|| EntitlementRecord::new(user.clone()));

        if record.free_itineraries_used < policy::FREE_ITINERARY_LIMIT {
            record.free_itineraries_used += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn consume_paid_credit(&self, user: &UserId) -> Result<bool> {
        let mut records = self.records.write().unwrap();

        match records.get_mut(user) {
            Some(record) if record.paid_credits > 0 => {
                record.paid_credits -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn consume_chat_message(&self, user: &UserId) -> Result<bool> {
        let mut records = self.records.write().unwrap();
        let record = records
            .entry(user.clone())
            .or_insert_with(|| EntitlementRecord::new(user.clone()));

        record.roll_chat_window_if_due();

        match record.chat_quota() {
            // Unlimited tiers bypass counting entirely
            Quota::Unlimited => Ok(true),
            Quota::Limited(limit) => {
                if record.chat_messages_used < limit {
                    record.chat_messages_used += 1;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn add_credits(&self, user: &UserId, delta: u32) -> Result<u32> {
        let mut records = self.records.write().unwrap();
        let record = records
            .entry(user.clone())
            .or_insert_with(|| EntitlementRecord::new(user.clone()));

        record.paid_credits = record.paid_credits.saturating_add(delta);
        Ok(record.paid_credits)
    }

    async fn set_subscription(
        &self,
        user: &UserId,
        tier: SubscriptionTier,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut records = self.records.write().unwrap();
        let record = records
            .entry(user.clone())
            .or_insert_with(|| EntitlementRecord::new(user.clone()));

        record.subscription_tier = Some(tier);
        record.subscription_expires_at = Some(expires_at);
        Ok(())
    }
}
