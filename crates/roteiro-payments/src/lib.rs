//! # roteiro-payments
//!
//! Checkout and payment reconciliation for the Roteiro travel planner,
//! backed by Mercado Pago's hosted checkout.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌─────────────┐
//! │  Your Site  │────▶│  Mercado Pago    │────▶│  Your Site  │
//! │  (pricing)  │     │  Checkout Pro    │     │  (success)  │
//! └─────────────┘     └────────┬─────────┘     └─────────────┘
//!                              │ webhook (at-least-once,
//!                              │ possibly out of order)
//!                              ▼
//!                       ┌──────────────┐     ┌──────────────────┐
//!                       │  Reconciler  │────▶│ EntitlementLedger│
//!                       └──────────────┘     └──────────────────┘
//! ```
//!
//! A checkout creates a [`PurchaseIntent`] in `pending` and hands the
//! provider an opaque [`ExternalReference`] naming the buyer and plan.
//! Settlement arrives asynchronously on the webhook; the [`Reconciler`]
//! fetches the authoritative payment, decodes the reference, and applies
//! the grant to the ledger exactly once per approved payment, no matter
//! how many times the provider redelivers the notification.

mod checkout;
mod error;
mod gateway;
mod intent;
mod notification;
mod plan;
mod reconcile;
mod reference;

pub use checkout::{CheckoutRequest, CheckoutService, CheckoutSession};
pub use error::{PaymentError, Result};
pub use gateway::{
    map_payment_status, CheckoutPreference, MercadoPagoClient, MercadoPagoConfig,
    PaymentDetails, PaymentGateway, PreferenceRequest,
};
pub use intent::{IntentStatus, IntentStore, MemoryIntentStore, PurchaseIntent, Transition};
pub use notification::{verify_webhook_signature, PaymentNotification};
pub use plan::{Grant, PlanPricing, PurchasePlan};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use reference::ExternalReference;
