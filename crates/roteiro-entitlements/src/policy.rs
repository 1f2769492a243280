//! Entitlement Policy
//!
//! Fixed limits for the free tier and each subscription tier. These are
//! product constants, not runtime configuration.

use serde::{Deserialize, Serialize};

/// Free itinerary generations granted to every user
pub const FREE_ITINERARY_LIMIT: u32 = 1;

/// Chat messages available without a subscription
pub const FREE_CHAT_LIMIT: u32 = 5;

/// Chat messages per monthly window for monthly subscribers
pub const MONTHLY_CHAT_LIMIT: u32 = 50;

/// A usage quota
///
/// "Unlimited" is its own variant rather than a large integer, so that
/// comparisons never inherit overflow or exhaustion semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quota {
    Limited(u32),
    Unlimited,
}

impl Quota {
    /// Whether a user at `used` may perform one more action
    pub fn allows(&self, used: u32) -> bool {
        match self {
            Quota::Limited(limit) => used < *limit,
            Quota::Unlimited => true,
        }
    }

    /// Remaining units at `used`; `None` means unlimited
    pub fn remaining(&self, used: u32) -> Option<u32> {
        match self {
            Quota::Limited(limit) => Some(limit.saturating_sub(used)),
            Quota::Unlimited => None,
        }
    }
}
