//! Roteiro HTTP Server
//!
//! Axum-based server exposing the entitlement ledger to the client app
//! and the webhook endpoint to Mercado Pago.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roteiro_entitlements::{EntitlementLedger, MemoryEntitlementStore};
use roteiro_payments::{
    CheckoutService, MemoryIntentStore, MercadoPagoClient, PaymentGateway, Reconciler,
};

use crate::handlers::{
    consume_chat, consume_itinerary, create_checkout, get_entitlements, health_check,
    mercadopago_webhook,
};
use crate::state::{AppState, Payments};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Initialize the ledger
    let entitlements = Arc::new(MemoryEntitlementStore::new());
    let ledger = Arc::new(EntitlementLedger::new(entitlements));

    // Initialize payments
    let intents = Arc::new(MemoryIntentStore::new());
    let payments = match MercadoPagoClient::from_env() {
        Ok(client) => {
            tracing::info!("✓ Mercado Pago configured");
            let webhook_secret = client.webhook_secret().map(str::to_string);
            if webhook_secret.is_none() {
                tracing::warn!("  MP_WEBHOOK_SECRET not set - webhook signatures unchecked");
            }

            let gateway: Arc<dyn PaymentGateway> = Arc::new(client);
            Some(Payments {
                checkout: Arc::new(CheckoutService::new(gateway.clone(), intents.clone())),
                reconciler: Arc::new(Reconciler::new(gateway, intents, ledger.clone())),
                webhook_secret,
            })
        }
        Err(e) => {
            tracing::warn!("⚠ Mercado Pago not configured - payments disabled ({e})");
            tracing::warn!("  Set MP_ACCESS_TOKEN in .env");
            None
        }
    };

    // Build application state
    let state = AppState { ledger, payments };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        // Health & info
        .route("/health", get(health_check))
        // Entitlements API
        .route("/api/entitlements/{user_id}", get(get_entitlements))
        .route("/api/itinerary/consume", post(consume_itinerary))
        .route("/api/chat/consume", post(consume_chat))
        // Payments
        .route("/api/checkout", post(create_checkout))
        .route("/webhook/mercadopago", post(mercadopago_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 roteiro server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                        - Health check");
    tracing::info!("  GET  /api/entitlements/{{user_id}}    - Entitlement snapshot");
    tracing::info!("  POST /api/itinerary/consume         - Consume an itinerary generation");
    tracing::info!("  POST /api/chat/consume              - Consume a chat message");
    tracing::info!("  POST /api/checkout                  - Create Mercado Pago checkout");
    tracing::info!("  POST /webhook/mercadopago           - Payment notifications");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
