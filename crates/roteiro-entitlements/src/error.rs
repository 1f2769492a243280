//! Error Types

use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, EntitlementError>;

/// Entitlement-related errors
///
/// A denied action is never an error: denials are normal negative results
/// carried by [`crate::ItineraryConsume`] / [`crate::ChatConsume`], so the
/// caller can tell "show the upsell" apart from "show a retry message".
#[derive(Error, Debug)]
pub enum EntitlementError {
    /// Underlying store read/write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Grant parameters were invalid (e.g. zero-credit grant)
    #[error("Invalid grant: {0}")]
    InvalidGrant(String),
}

impl EntitlementError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, EntitlementError::Storage(_))
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            EntitlementError::Storage(_) => "We couldn't check your plan. Please try again.",
            EntitlementError::InvalidGrant(_) => "An error occurred processing your request.",
        }
    }
}
