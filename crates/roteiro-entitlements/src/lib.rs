//! # roteiro-entitlements
//!
//! Entitlement ledger for the Roteiro travel planner: free-tier counters,
//! purchased itinerary credits, and subscription state, one record per user.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 EntitlementLedger                         │
//! │  ┌──────────────┐   ┌──────────────────────────────────┐ │
//! │  │   Policy     │   │   EntitlementStore (Strategy)    │ │
//! │  │   (fixed)    │───│   conditional per-user updates   │ │
//! │  └──────────────┘   └──────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The ledger answers "may this user generate an itinerary / send a chat
//! message" and applies the effect of doing so. Paid entitlements take
//! precedence over free ones, and subscriptions over standalone credits.
//! Every consume is a single conditional update inside the store, so two
//! concurrent requests for the same user can never double-spend the last
//! free unit or credit.

pub mod error;
pub mod ledger;
pub mod policy;
pub mod record;
pub mod store;

pub use error::{EntitlementError, Result};
pub use ledger::{ChatConsume, EntitlementLedger, EntitlementStatus, ItineraryConsume};
pub use policy::Quota;
pub use record::{EntitlementRecord, SubscriptionTier, UserId};
pub use store::{EntitlementStore, MemoryEntitlementStore};
