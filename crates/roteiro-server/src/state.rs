//! Application State

use std::sync::Arc;

use roteiro_entitlements::{EntitlementLedger, MemoryEntitlementStore};
use roteiro_payments::{CheckoutService, MemoryIntentStore, Reconciler};

/// Payment wiring, present only when credentials are configured
#[derive(Clone)]
pub struct Payments {
    /// Checkout orchestration (intent + provider preference)
    pub checkout: Arc<CheckoutService<MemoryIntentStore>>,

    /// Webhook reconciler
    pub reconciler: Arc<Reconciler<MemoryIntentStore, MemoryEntitlementStore>>,

    /// Webhook signature secret (verification skipped when absent)
    pub webhook_secret: Option<String>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Entitlement ledger - the sole source of truth for gated actions
    pub ledger: Arc<EntitlementLedger<MemoryEntitlementStore>>,

    /// Payments (None if not configured)
    pub payments: Option<Payments>,
}
