//! services/advisor/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification. Every route maps one-to-one
//! onto an advice-panel operation.

use crate::web::protocol::{
    AdviceRunRequest, BreakdownDto, EmailLinkCompleteRequest, EmailLinkRequest,
    FormattedBreakdownDto, PanelViewDto, ProviderSignInRequest, QuoteRequest, QuoteResponse,
    SectionDto, SignInPanelRequest, UpgradeResponse,
};
use crate::web::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use maker_price_core::domain::PricingInput;
use maker_price_core::pricing::{compute_breakdown, wholesale_prefill_url};
use std::sync::Arc;
use tokio::sync::MutexGuard;
use utoipa::OpenApi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        quote_handler,
        panel_handler,
        advice_handler,
        refresh_usage_handler,
        advice_document_handler,
        provider_sign_in_handler,
        email_link_handler,
        email_link_complete_handler,
        claim_handler,
        reset_handler,
        dismiss_upgrade_handler,
        sign_in_panel_handler,
        upgrade_handler,
    ),
    components(
        schemas(
            QuoteRequest,
            QuoteResponse,
            AdviceRunRequest,
            ProviderSignInRequest,
            EmailLinkRequest,
            EmailLinkCompleteRequest,
            SignInPanelRequest,
            UpgradeResponse,
            PanelViewDto,
            SectionDto,
            crate::web::protocol::PricingInputDto,
            crate::web::protocol::BreakdownDto,
            crate::web::protocol::FormattedBreakdownDto,
            crate::web::protocol::UsageDto,
            crate::web::protocol::BlockDto,
        )
    ),
    tags(
        (name = "MakerPrice Advisor API", description = "Pricing quotes and the advice panel lifecycle.")
    )
)]
pub struct ApiDoc;

/// Takes the panel lock without queueing: a second in-flight operation is
/// reported as busy rather than run twice.
fn try_panel(
    state: &AppState,
) -> Result<MutexGuard<'_, crate::panel::AdvicePanel>, (StatusCode, String)> {
    state.panel.try_lock().map_err(|_| {
        (
            StatusCode::CONFLICT,
            "Another panel operation is in progress".to_string(),
        )
    })
}

//=========================================================================================
// Pricing Handlers
//=========================================================================================

/// Compute the suggested price and cost breakdown for the given inputs.
#[utoipa::path(
    post,
    path = "/pricing/quote",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Breakdown computed", body = QuoteResponse)
    )
)]
pub async fn quote_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuoteRequest>,
) -> impl IntoResponse {
    let input: PricingInput = req.input.into();
    let breakdown = compute_breakdown(&input);

    let response = QuoteResponse {
        breakdown: BreakdownDto::from(&breakdown),
        formatted: FormattedBreakdownDto::new(&breakdown, req.currency),
        wholesale_url: wholesale_prefill_url(&state.config.wholesale_url, &input, &breakdown),
    };
    Json(response)
}

//=========================================================================================
// Panel Handlers
//=========================================================================================

/// The current panel view.
#[utoipa::path(
    get,
    path = "/panel",
    responses(
        (status = 200, description = "Current panel state", body = PanelViewDto)
    )
)]
pub async fn panel_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let panel = state.panel.lock().await;
    Json(PanelViewDto::from_panel(&panel))
}

/// Run one advice request for the supplied inputs.
#[utoipa::path(
    post,
    path = "/advice",
    request_body = AdviceRunRequest,
    responses(
        (status = 200, description = "Panel state after the request", body = PanelViewDto),
        (status = 409, description = "Another operation is in progress")
    )
)]
pub async fn advice_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AdviceRunRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut panel = try_panel(&state)?;
    let input: PricingInput = req.input.into();
    let results = compute_breakdown(&input);
    panel.request_advice(&input, &results, req.currency).await;
    Ok(Json(PanelViewDto::from_panel(&panel)))
}

/// Probe the usage counters without consuming quota.
#[utoipa::path(
    post,
    path = "/advice/refresh",
    responses(
        (status = 200, description = "Panel state after the probe", body = PanelViewDto),
        (status = 409, description = "Another operation is in progress")
    )
)]
pub async fn refresh_usage_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut panel = try_panel(&state)?;
    panel.refresh_usage().await;
    Ok(Json(PanelViewDto::from_panel(&panel)))
}

/// The current advice text as renderable sections, for the print report.
#[utoipa::path(
    get,
    path = "/advice/document",
    responses(
        (status = 200, description = "Parsed advice sections", body = [SectionDto])
    )
)]
pub async fn advice_document_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let panel = state.panel.lock().await;
    let sections: Vec<SectionDto> = panel
        .advice_document()
        .iter()
        .map(SectionDto::from)
        .collect();
    Json(sections)
}

//=========================================================================================
// Identity Handlers
//=========================================================================================

/// Provider sign-in with the link-then-credential-fallback flow.
#[utoipa::path(
    post,
    path = "/auth/provider",
    request_body = ProviderSignInRequest,
    responses(
        (status = 200, description = "Panel state after sign-in", body = PanelViewDto),
        (status = 409, description = "Another operation is in progress")
    )
)]
pub async fn provider_sign_in_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderSignInRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut panel = try_panel(&state)?;
    panel.sign_in_with_provider(&req.credential).await;
    Ok(Json(PanelViewDto::from_panel(&panel)))
}

/// Send a passwordless sign-in link.
#[utoipa::path(
    post,
    path = "/auth/email-link",
    request_body = EmailLinkRequest,
    responses(
        (status = 200, description = "Panel state after sending", body = PanelViewDto),
        (status = 409, description = "Another operation is in progress")
    )
)]
pub async fn email_link_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailLinkRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut panel = try_panel(&state)?;
    panel.send_email_link(&req.email).await;
    Ok(Json(PanelViewDto::from_panel(&panel)))
}

/// Complete a sign-in link (idempotent per one-time token).
#[utoipa::path(
    post,
    path = "/auth/email-link/complete",
    request_body = EmailLinkCompleteRequest,
    responses(
        (status = 200, description = "Panel state after completion", body = PanelViewDto),
        (status = 409, description = "Another operation is in progress")
    )
)]
pub async fn email_link_complete_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailLinkCompleteRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut panel = try_panel(&state)?;
    panel
        .complete_email_link(&req.link, req.email.as_deref())
        .await;
    Ok(Json(PanelViewDto::from_panel(&panel)))
}

/// Manually claim a purchased entitlement.
#[utoipa::path(
    post,
    path = "/auth/claim",
    responses(
        (status = 200, description = "Panel state after the claim", body = PanelViewDto),
        (status = 409, description = "Another operation is in progress")
    )
)]
pub async fn claim_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut panel = try_panel(&state)?;
    panel.claim_purchase().await;
    Ok(Json(PanelViewDto::from_panel(&panel)))
}

//=========================================================================================
// Session and Gate Handlers
//=========================================================================================

/// Reset to a fresh anonymous session, clearing counters and the snapshot.
#[utoipa::path(
    post,
    path = "/session/reset",
    responses(
        (status = 200, description = "Panel state after the reset", body = PanelViewDto),
        (status = 409, description = "Another operation is in progress")
    )
)]
pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut panel = try_panel(&state)?;
    panel.reset_session().await;
    Ok(Json(PanelViewDto::from_panel(&panel)))
}

/// Dismiss the upgrade gate.
#[utoipa::path(
    post,
    path = "/upgrade/dismiss",
    responses(
        (status = 200, description = "Panel state after dismissal", body = PanelViewDto)
    )
)]
pub async fn dismiss_upgrade_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut panel = state.panel.lock().await;
    panel.dismiss_upgrade();
    Json(PanelViewDto::from_panel(&panel))
}

/// Show or hide the sign-in options.
#[utoipa::path(
    post,
    path = "/panel/sign-in",
    request_body = SignInPanelRequest,
    responses(
        (status = 200, description = "Panel state after the toggle", body = PanelViewDto)
    )
)]
pub async fn sign_in_panel_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignInPanelRequest>,
) -> impl IntoResponse {
    let mut panel = state.panel.lock().await;
    panel.set_sign_in_panel(req.show);
    Json(PanelViewDto::from_panel(&panel))
}

/// The external checkout URL the UI opens in a new context.
#[utoipa::path(
    get,
    path = "/upgrade",
    responses(
        (status = 200, description = "Upgrade destination", body = UpgradeResponse)
    )
)]
pub async fn upgrade_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(UpgradeResponse {
        url: state.config.upgrade_url.clone(),
    })
}
