//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Mercado Pago API error (timeout, non-2xx, malformed body)
    #[error("Provider error: {0}")]
    Provider(String),

    /// External reference could not be decoded back into user/plan
    #[error("Reference decode error: {0}")]
    ReferenceDecode(String),

    /// Unknown purchase plan code
    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    /// Purchase intent not found
    #[error("Intent not found: {0}")]
    IntentNotFound(String),

    /// Configuration error (missing credentials)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Entitlement grant failed after settlement
    #[error("Grant error: {0}")]
    Grant(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::Provider(_) | PaymentError::Storage(_) | PaymentError::Grant(_)
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Provider(_) => "Payment processing failed. Please try again.",
            PaymentError::UnknownPlan(_) => "That plan is not available.",
            PaymentError::Config(_) => "Payments are not available right now.",
            _ => "An error occurred processing your request.",
        }
    }
}

impl From<roteiro_entitlements::EntitlementError> for PaymentError {
    fn from(err: roteiro_entitlements::EntitlementError) -> Self {
        PaymentError::Grant(err.to_string())
    }
}
