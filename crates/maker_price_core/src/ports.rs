//! crates/maker_price_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of specific external implementations like the
//! callable-function backend, the identity provider, or durable storage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{PricingBreakdown, PricingInput, SessionInfo, Snapshot, UsagePatch};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (network,
/// identity provider, storage) while keeping the few distinctions the panel
/// logic genuinely branches on.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// Linking failed because the identity is already bound to another
    /// account. Carries the reusable credential when the provider returned
    /// one, so sign-in can proceed without a second interactive prompt.
    #[error("That identity is already linked to another account")]
    CredentialAlreadyInUse { credential: Option<String> },
    /// The sign-in link is expired, malformed, or already consumed upstream.
    #[error("The sign-in link is invalid or has expired")]
    InvalidActionCode,
    #[error("Unexpected response from {0}")]
    UnexpectedResponse(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Wire Types for the Remote Advice Operation
//=========================================================================================

/// The per-call context sent to the advice generator. Ephemeral; never
/// persisted. The comparison fields are attached only when the orchestrator
/// detected a genuine change since the previous run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub app: String,
    pub state: PricingInput,
    pub results: PricingBreakdown,
    pub currency: String,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Snapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_delta: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_summary: Option<String>,
}

/// The envelope for one call to the remote advice operation. A dry run
/// carries no payload and consumes no quota.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdviceRequest {
    pub app_id: String,
    pub payload: Option<RequestContext>,
    #[serde(skip_serializing_if = "is_false")]
    pub dry_run: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// The advice operation's response, tagged by `status`. Any other shape
/// fails deserialization and surfaces as an unexpected-response error at
/// the adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdviceResponse {
    #[serde(rename_all = "camelCase")]
    Ok {
        #[serde(default)]
        advice_markdown: Option<String>,
        #[serde(flatten)]
        usage: UsagePatch,
    },
    #[serde(rename_all = "camelCase")]
    UpgradeRequired {
        #[serde(default)]
        message: Option<String>,
        #[serde(flatten)]
        usage: UsagePatch,
    },
}

/// The entitlement-claim operation's outcome. Unrecognized tags are kept
/// verbatim so the panel can report them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyClaimed,
    NoPendingClaim,
    Other(String),
}

impl ClaimOutcome {
    /// Maps a response `status` tag onto an outcome.
    pub fn from_status(status: &str) -> Self {
        match status {
            "claimed" => ClaimOutcome::Claimed,
            "already_claimed" => ClaimOutcome::AlreadyClaimed,
            "no_pending_claim" => ClaimOutcome::NoPendingClaim,
            other => ClaimOutcome::Other(other.to_string()),
        }
    }
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait AdviceService: Send + Sync {
    /// Invokes the remote advice generator (or, with `dry_run`, probes the
    /// current usage counters without consuming quota).
    async fn generate_advice(&self, request: &AdviceRequest) -> PortResult<AdviceResponse>;
}

#[async_trait]
pub trait EntitlementService: Send + Sync {
    /// Asks the backend to match a pending purchase to the signed-in email.
    async fn claim_entitlements(&self) -> PortResult<ClaimOutcome>;
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    // --- Session Lifecycle ---
    /// Restores a previously persisted session, if one exists and is valid.
    async fn restore_session(&self) -> PortResult<Option<SessionInfo>>;

    /// The session currently held by the provider, without any network call.
    async fn current_session(&self) -> Option<SessionInfo>;

    async fn sign_in_anonymously(&self) -> PortResult<SessionInfo>;

    async fn sign_out(&self) -> PortResult<()>;

    // --- Provider Sign-In ---
    /// Upgrades the current (anonymous) session by linking a third-party
    /// provider credential to it. Fails with `CredentialAlreadyInUse` when
    /// that identity is already bound to a different account.
    async fn link_with_provider(&self, provider_token: &str) -> PortResult<SessionInfo>;

    /// Signs in directly with a third-party provider credential, replacing
    /// the current session.
    async fn sign_in_with_provider(&self, provider_token: &str) -> PortResult<SessionInfo>;

    /// Signs in with a credential previously extracted from a link failure.
    async fn sign_in_with_credential(&self, credential: &str) -> PortResult<SessionInfo>;

    // --- Passwordless Email Link ---
    async fn send_sign_in_link(&self, email: &str, redirect_url: &str) -> PortResult<()>;

    /// Whether the given location contains a sign-in-link marker.
    fn is_sign_in_link(&self, link: &str) -> bool;

    /// Completes a passwordless sign-in from the link. Fails with
    /// `InvalidActionCode` when the link is expired or malformed.
    async fn sign_in_with_email_link(&self, email: &str, link: &str) -> PortResult<SessionInfo>;

    // --- Tokens ---
    /// A bearer token for the current session, used to authenticate
    /// callable-function requests.
    async fn id_token(&self) -> PortResult<Option<String>>;
}

/// A durable string key-value store. All operations are fail-safe by
/// contract: a failed read is `None` and a failed write is swallowed (and
/// logged) by the implementation, never surfaced to callers.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}
