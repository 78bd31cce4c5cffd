//! services/advisor/src/bin/advisor.rs

use advisor_lib::{
    adapters::{
        functions::CallableFunctionsAdapter, identity::HubIdentityAdapter,
        store::{JsonFileStore, MemoryStore},
    },
    config::Config,
    error::ApiError,
    panel::{AdvicePanel, SessionManager, SnapshotStore},
    web::{
        advice_document_handler, advice_handler, claim_handler, dismiss_upgrade_handler,
        email_link_complete_handler, email_link_handler, panel_handler,
        provider_sign_in_handler, quote_handler, refresh_usage_handler, reset_handler,
        sign_in_panel_handler, state::AppState, upgrade_handler, ApiDoc,
    },
};
use axum::{
    routing::{get, post},
    Router,
};
use maker_price_core::ports::{
    AdviceService, EntitlementService, IdentityService, KeyValueStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use tower_http::cors::{Any, CorsLayer};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting advisor...");

    // --- 2. Open the Stores ---
    let durable: Arc<dyn KeyValueStore> =
        Arc::new(JsonFileStore::open(config.data_dir.join("store.json")));
    let session_scoped: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

    // --- 3. Initialize Service Adapters ---
    let identity = Arc::new(HubIdentityAdapter::new(
        config.identity_url.clone(),
        config.identity_api_key.clone(),
        durable.clone(),
    ));
    let functions = Arc::new(CallableFunctionsAdapter::new(
        config.functions_url.clone(),
        identity.clone() as Arc<dyn IdentityService>,
    ));

    // --- 4. Assemble the Advice Panel ---
    let sessions = SessionManager::new(
        identity.clone(),
        durable.clone(),
        session_scoped,
        config.app_base_url.clone(),
        Duration::from_millis(config.anon_grace_ms),
    );
    let snapshots = SnapshotStore::new(durable);
    let panel = AdvicePanel::new(
        functions.clone() as Arc<dyn AdviceService>,
        functions as Arc<dyn EntitlementService>,
        sessions,
        snapshots,
        config.app_id.clone(),
        config.upgrade_url.clone(),
    );

    let mut advice_updates = panel.advice_updates();
    let app_state = Arc::new(AppState {
        config: config.clone(),
        panel: Mutex::new(panel),
    });

    // --- 5. Establish the Session in the Background ---
    let init_state = app_state.clone();
    tokio::spawn(async move {
        init_state.panel.lock().await.init().await;
        info!("Session established and usage counters refreshed.");
    });

    // Surface advice changes in the diagnostics log for the print report.
    tokio::spawn(async move {
        while advice_updates.changed().await.is_ok() {
            let length = advice_updates
                .borrow()
                .as_ref()
                .map(|text| text.len())
                .unwrap_or(0);
            debug!("Advice text updated ({} chars)", length);
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // --- 6. Create the Web Router ---
    let api_router = Router::new()
        .route("/pricing/quote", post(quote_handler))
        .route("/panel", get(panel_handler))
        .route("/panel/sign-in", post(sign_in_panel_handler))
        .route("/advice", post(advice_handler))
        .route("/advice/refresh", post(refresh_usage_handler))
        .route("/advice/document", get(advice_document_handler))
        .route("/auth/provider", post(provider_sign_in_handler))
        .route("/auth/email-link", post(email_link_handler))
        .route("/auth/email-link/complete", post(email_link_complete_handler))
        .route("/auth/claim", post(claim_handler))
        .route("/session/reset", post(reset_handler))
        .route("/upgrade", get(upgrade_handler))
        .route("/upgrade/dismiss", post(dismiss_upgrade_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting advisor on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
