//! External Reference Token
//!
//! The opaque payload handed to the payment provider at checkout and
//! echoed back on settlement. It names the buyer and the plan; everything
//! the grant needs is derived from the plan, so the token cannot disagree
//! with the catalogue.

use serde::{Deserialize, Serialize};

use roteiro_entitlements::UserId;

use crate::error::{PaymentError, Result};
use crate::plan::PurchasePlan;

/// Reference round-tripped through the provider's `external_reference`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReference {
    pub user_id: UserId,
    pub plan: PurchasePlan,
}

impl ExternalReference {
    pub fn new(user_id: UserId, plan: PurchasePlan) -> Self {
        Self { user_id, plan }
    }

    /// Encode as the compact JSON string given to the provider
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| PaymentError::ReferenceDecode(e.to_string()))
    }

    /// Decode a reference echoed back by the provider
    ///
    /// Failures mean the payment cannot be matched to a purchase and
    /// needs manual review; they must never crash the webhook handler.
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| PaymentError::ReferenceDecode(e.to_string()))
    }
}
