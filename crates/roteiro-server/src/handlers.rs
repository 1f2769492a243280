//! HTTP Handlers

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use roteiro_entitlements::{ChatConsume, EntitlementStatus, ItineraryConsume, UserId};
use roteiro_payments::{
    verify_webhook_signature, CheckoutRequest as PaymentCheckoutRequest, PaymentNotification,
    PurchasePlan,
};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub payments_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ConsumeRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct ItineraryConsumeResponse {
    pub source: ItineraryConsume,
}

#[derive(Debug, Serialize)]
pub struct ChatConsumeResponse {
    pub source: ChatConsume,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: String,
    pub plan: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub intent_id: String,
    pub preference_id: String,
    pub checkout_url: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn denied(message: &str) -> HandlerError {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: message.into(),
            code: "ENTITLEMENT_DENIED".into(),
        }),
    )
}

fn storage_error(err: &roteiro_entitlements::EntitlementError) -> HandlerError {
    tracing::error!("Ledger error: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.user_message().into(),
            code: "STORAGE_ERROR".into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        payments_configured: state.payments.is_some(),
    })
}

/// Read-only entitlement snapshot for the client
pub async fn get_entitlements(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<EntitlementStatus>, HandlerError> {
    let user = UserId::new(user_id);

    state
        .ledger
        .status(&user)
        .await
        .map(Json)
        .map_err(|e| storage_error(&e))
}

/// Consume one itinerary generation
///
/// 403 means "not entitled" (show the upsell); 500 means "could not tell"
/// (show a retry message). The caller must not treat a 500 as permitted.
pub async fn consume_itinerary(
    State(state): State<AppState>,
    Json(payload): Json<ConsumeRequest>,
) -> Result<Json<ItineraryConsumeResponse>, HandlerError> {
    let user = UserId::new(payload.user_id);

    match state.ledger.consume_itinerary_credit(&user).await {
        Ok(outcome) if outcome.allowed() => Ok(Json(ItineraryConsumeResponse { source: outcome })),
        Ok(_) => Err(denied("No itinerary generations remaining")),
        Err(e) => Err(storage_error(&e)),
    }
}

/// Consume one chat message
pub async fn consume_chat(
    State(state): State<AppState>,
    Json(payload): Json<ConsumeRequest>,
) -> Result<Json<ChatConsumeResponse>, HandlerError> {
    let user = UserId::new(payload.user_id);

    match state.ledger.consume_chat_message(&user).await {
        Ok(outcome) if outcome.allowed() => Ok(Json(ChatConsumeResponse { source: outcome })),
        Ok(_) => Err(denied("Chat message limit reached")),
        Err(e) => Err(storage_error(&e)),
    }
}

/// Begin a Mercado Pago checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, HandlerError> {
    let payments = state.payments.as_ref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Payments not configured".into(),
                code: "PAYMENTS_DISABLED".into(),
            }),
        )
    })?;

    let plan = PurchasePlan::parse(&payload.plan).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.user_message().into(),
                code: "UNKNOWN_PLAN".into(),
            }),
        )
    })?;

    let request = PaymentCheckoutRequest {
        user_id: UserId::new(payload.user_id),
        plan,
        success_url: payload.success_url,
        cancel_url: payload.cancel_url,
    };

    let session = payments.checkout.begin(request).await.map_err(|e| {
        tracing::error!("Checkout error: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.user_message().into(),
                code: "CHECKOUT_ERROR".into(),
            }),
        )
    })?;

    Ok(Json(CheckoutResponse {
        intent_id: session.intent_id.to_string(),
        preference_id: session.preference_id,
        checkout_url: session.checkout_url,
    }))
}

/// Mercado Pago webhook endpoint
///
/// Always acknowledges with 200: the provider retries on error responses
/// and disables endpoints that keep failing, and redelivery is the only
/// retry mechanism we rely on. Business failures are logged and swallowed.
pub async fn mercadopago_webhook(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let Some(payments) = state.payments.as_ref() else {
        tracing::warn!("Webhook received but payments are not configured; acknowledging");
        return StatusCode::OK;
    };

    let notification = PaymentNotification::parse(&params, &body);

    if let (Some(secret), Some(payment_id)) =
        (payments.webhook_secret.as_deref(), notification.payment_id())
    {
        let signature = headers.get("x-signature").and_then(|v| v.to_str().ok());
        let request_id = headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        let verified = signature
            .map(|sig| verify_webhook_signature(secret, sig, request_id, payment_id))
            .unwrap_or(false);

        if !verified {
            tracing::warn!(payment_id = %payment_id, "Webhook signature failed; not processing");
            return StatusCode::OK;
        }
    }

    let outcome = payments.reconciler.process(notification).await;
    tracing::info!(outcome = ?outcome, "Webhook processed");

    StatusCode::OK
}
