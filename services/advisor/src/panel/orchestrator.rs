//! services/advisor/src/panel/orchestrator.rs
//!
//! The advice panel orchestrator: the top-level state machine that decides
//! whether an advice request may proceed, builds the comparison-aware
//! request, interprets the tagged response, and drives the UI mode
//! transitions. All collaborators arrive as injected ports so the whole
//! machine runs against fakes in tests.

use crate::panel::session::{LinkCompletion, SessionManager};
use crate::panel::snapshot::SnapshotStore;
use crate::panel::state::{PanelMode, PanelState, FREE_LIMIT};
use chrono::Utc;
use maker_price_core::advice::{parse_advice, Section};
use maker_price_core::domain::{Currency, PricingBreakdown, PricingInput, Snapshot, UsageState};
use maker_price_core::ports::{
    AdviceRequest, AdviceResponse, AdviceService, ClaimOutcome, EntitlementService, PortError,
    RequestContext,
};
use maker_price_core::compare;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// The free-text context label sent with every advice request.
const ADVICE_CONTEXT_LABEL: &str = "MakerPrice AI advice";

/// The advice panel. One instance per running app; the web layer holds it
/// behind a lock and serializes operations through it.
pub struct AdvicePanel {
    advice: Arc<dyn AdviceService>,
    entitlements: Arc<dyn EntitlementService>,
    sessions: SessionManager,
    snapshots: SnapshotStore,
    app_id: String,
    upgrade_url: String,
    state: PanelState,
    advice_tx: watch::Sender<Option<String>>,
}

impl AdvicePanel {
    pub fn new(
        advice: Arc<dyn AdviceService>,
        entitlements: Arc<dyn EntitlementService>,
        sessions: SessionManager,
        snapshots: SnapshotStore,
        app_id: String,
        upgrade_url: String,
    ) -> Self {
        let mut state = PanelState::new();
        // Load the previous snapshot (for comparison) on startup.
        state.prev_snapshot = snapshots.read();
        let (advice_tx, _) = watch::channel(None);

        Self {
            advice,
            entitlements,
            sessions,
            snapshots,
            app_id,
            upgrade_url,
            state,
            advice_tx,
        }
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn upgrade_url(&self) -> &str {
        &self.upgrade_url
    }

    /// The current advice text as renderable sections.
    pub fn advice_document(&self) -> Vec<Section> {
        parse_advice(self.state.advice_markdown.as_deref().unwrap_or(""))
    }

    /// A change-notified view of the advice text, for the print report and
    /// other external consumers.
    pub fn advice_updates(&self) -> watch::Receiver<Option<String>> {
        self.advice_tx.subscribe()
    }

    /// Establishes a session at startup and pulls the usage counters so
    /// the UI never opens on stale zeros.
    pub async fn init(&mut self) {
        match self.sessions.ensure_session().await {
            Ok(_) => self.on_session_changed().await,
            Err(e) => warn!("Failed to establish a session: {}", e),
        }
    }

    /// Marks the panel busy and clears the message slots. Returns `false`
    /// when another operation is already in flight.
    fn begin(&mut self) -> bool {
        if self.state.loading {
            return false;
        }
        self.state.loading = true;
        self.state.clear_messages();
        true
    }

    fn fail(&mut self, message: String) {
        self.state.mode = PanelMode::Error;
        self.state.error_msg = Some(message);
        self.state.loading = false;
    }

    //=====================================================================================
    // Advice Lifecycle
    //=====================================================================================

    /// Runs one advice request for the supplied input and results.
    pub async fn request_advice(
        &mut self,
        input: &PricingInput,
        results: &PricingBreakdown,
        currency: Currency,
    ) {
        if !self.begin() {
            return;
        }
        self.state.advice_markdown = None;

        // No free uses left and not entitled: show the upgrade gate without
        // contacting the service. The server enforces the same limit.
        if !self.state.usage.entitled && self.state.usage.free_used >= FREE_LIMIT {
            self.state.mode = PanelMode::UpgradeRequired;
            self.state.show_upgrade_modal = true;
            self.state.loading = false;
            return;
        }

        if self.state.session.is_none() {
            match self.sessions.ensure_session().await {
                Ok(session) => self.state.session = Some(session),
                Err(e) => {
                    self.fail(e.to_string());
                    return;
                }
            }
        }

        let request = AdviceRequest {
            app_id: self.app_id.clone(),
            payload: Some(self.build_context(input, results, currency)),
            dry_run: false,
        };

        match self.advice.generate_advice(&request).await {
            Ok(AdviceResponse::Ok {
                advice_markdown,
                usage,
            }) => {
                self.state.usage.apply(&usage);

                let text = advice_markdown.unwrap_or_default();
                self.advice_tx.send_replace(Some(text.clone()));
                self.state.advice_markdown = Some(text);
                self.state.mode = PanelMode::Ok;

                // Save this run so the next one can compare against it.
                let snapshot = Snapshot {
                    state: input.clone(),
                    results: results.clone(),
                    saved_at_ms: Utc::now().timestamp_millis(),
                };
                self.snapshots.write(&snapshot);
                self.state.prev_snapshot = Some(snapshot);
            }
            Ok(AdviceResponse::UpgradeRequired { message, usage }) => {
                self.state.usage.apply(&usage);
                debug!("Advice gated by quota: {:?}", message);
                self.state.mode = PanelMode::UpgradeRequired;
                self.state.show_upgrade_modal = true;
            }
            Err(e) => {
                // Counters and snapshot stay untouched on failure.
                self.state.mode = PanelMode::Error;
                self.state.error_msg = Some(e.to_string());
            }
        }
        self.state.loading = false;
    }

    /// Builds the request context, attaching comparison data only when the
    /// previous run differs meaningfully from this one.
    fn build_context(
        &self,
        input: &PricingInput,
        results: &PricingBreakdown,
        currency: Currency,
    ) -> RequestContext {
        let mut context = RequestContext {
            app: self.app_id.clone(),
            state: input.clone(),
            results: results.clone(),
            currency: currency.symbol().to_string(),
            context: ADVICE_CONTEXT_LABEL.to_string(),
            previous: None,
            rate_delta: None,
            change_summary: None,
        };

        if let Some(previous) = &self.state.prev_snapshot {
            let rate_delta = compare::effective_rate_delta(previous, results);
            let summary = compare::change_summary(&compare::diff_inputs(&previous.state, input));
            let rate_changed = matches!(rate_delta, Some(d) if d != 0.0);

            if rate_changed || summary.is_some() {
                context.previous = Some(previous.clone());
                context.rate_delta = rate_delta.filter(|d| *d != 0.0);
                context.change_summary = summary;
            }
        }

        context
    }

    /// Probes the current usage counters without consuming quota or
    /// producing advice. Failures are swallowed (logged only): this is a
    /// best-effort background refresh.
    pub async fn refresh_usage(&mut self) {
        let request = AdviceRequest {
            app_id: self.app_id.clone(),
            payload: None,
            dry_run: true,
        };
        match self.advice.generate_advice(&request).await {
            Ok(AdviceResponse::Ok { usage, .. }) => {
                self.state.usage.apply(&usage);
                self.state.mode = PanelMode::Idle;
            }
            Ok(AdviceResponse::UpgradeRequired { usage, .. }) => {
                self.state.usage.apply(&usage);
                self.state.mode = PanelMode::UpgradeRequired;
            }
            Err(e) => debug!("Usage probe failed, leaving counters as they were: {}", e),
        }
    }

    //=====================================================================================
    // Entitlement Claiming
    //=====================================================================================

    /// The user-initiated "unlock purchase" action.
    pub async fn claim_purchase(&mut self) {
        if !self.begin() {
            return;
        }
        self.claim_inner(false).await;
        self.state.loading = false;
    }

    async fn claim_inner(&mut self, silent: bool) {
        let email_capable = self
            .state
            .session
            .as_ref()
            .map(|s| !s.is_anonymous && s.email.is_some())
            .unwrap_or(false);
        if !email_capable {
            if !silent {
                self.state.mode = PanelMode::Error;
                self.state.error_msg =
                    Some("Sign in first so we can match your purchase email.".to_string());
            }
            return;
        }

        match self.entitlements.claim_entitlements().await {
            Ok(ClaimOutcome::Claimed) | Ok(ClaimOutcome::AlreadyClaimed) => {
                self.state.mode = PanelMode::Claimed;
                self.state.usage.entitled = true;
                self.state.info_msg =
                    Some("Advice Pack unlocked. Click Get advice when you're ready.".to_string());
            }
            Ok(ClaimOutcome::NoPendingClaim) => {
                if silent {
                    self.state.mode = PanelMode::UpgradeRequired;
                } else {
                    self.state.mode = PanelMode::Error;
                    self.state.error_msg = Some(
                        "No purchase was found for this email yet. If you just purchased, \
                         wait a minute and try again."
                            .to_string(),
                    );
                }
            }
            Ok(ClaimOutcome::Other(tag)) => {
                debug!("Unrecognized claim outcome: {:?}", tag);
                if silent {
                    self.state.mode = PanelMode::UpgradeRequired;
                } else {
                    self.state.mode = PanelMode::Error;
                    self.state.error_msg =
                        Some("Unexpected response from claimEntitlements.".to_string());
                }
            }
            Err(e) => {
                if silent {
                    warn!("Silent entitlement claim failed: {}", e);
                } else {
                    self.state.mode = PanelMode::Error;
                    self.state.error_msg = Some(e.to_string());
                }
            }
        }
    }

    //=====================================================================================
    // Identity Transitions
    //=====================================================================================

    /// Reacts to a session change: mirror the session, pull counters, and
    /// run the automatic entitlement claim once per new uid.
    async fn on_session_changed(&mut self) {
        self.state.session = self.sessions.current().await;
        // Pull counters immediately so the UI doesn't show 0 / 3.
        self.refresh_usage().await;
        self.maybe_auto_claim().await;
    }

    /// Auto-claim after an email-capable sign-in; never auto-runs advice.
    async fn maybe_auto_claim(&mut self) {
        let Some(session) = self.state.session.clone() else {
            return;
        };
        if session.is_anonymous || session.email.is_none() {
            return;
        }
        if self.state.auto_claim_attempted_for_uid.as_deref() == Some(session.uid.as_str()) {
            return;
        }
        self.state.auto_claim_attempted_for_uid = Some(session.uid.clone());
        self.state.mode = PanelMode::Claiming;
        self.claim_inner(true).await;
    }

    /// Provider sign-in with the link-then-credential-fallback flow.
    pub async fn sign_in_with_provider(&mut self, provider_token: &str) {
        if !self.begin() {
            return;
        }
        match self.sessions.sign_in_with_provider(provider_token).await {
            Ok(_) => {
                self.state.mode = PanelMode::Claiming;
                self.state.info_msg =
                    Some("Signed in. If you already purchased, unlock below.".to_string());
                self.on_session_changed().await;
            }
            Err(e) => {
                self.state.mode = PanelMode::Error;
                self.state.error_msg = Some(e.to_string());
            }
        }
        self.state.loading = false;
    }

    /// Sends a passwordless sign-in link to the supplied address.
    pub async fn send_email_link(&mut self, email: &str) {
        if !self.begin() {
            return;
        }
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            self.fail("Please enter your email address first.".to_string());
            return;
        }
        match self.sessions.send_email_link(&email).await {
            Ok(()) => {
                self.state.email_link_notice = Some(
                    "Sign-in link sent. Please check your email and open the link to return here."
                        .to_string(),
                );
            }
            Err(e) => {
                self.state.mode = PanelMode::Error;
                self.state.error_msg = Some(e.to_string());
            }
        }
        self.state.loading = false;
    }

    /// Completes an email sign-in link. The automatic (page-load) variant
    /// passes no manual email and stays quiet on replays; the manual
    /// variant reports them.
    pub async fn complete_email_link(&mut self, link: &str, manual_email: Option<&str>) {
        if !self.begin() {
            return;
        }
        let manual = manual_email.is_some();

        match self.sessions.complete_email_link(link, manual_email).await {
            Ok(LinkCompletion::SignedIn(_)) => {
                self.state.mode = PanelMode::Claiming;
                self.state.info_msg =
                    Some("Signed in. If you already purchased, unlock below.".to_string());
                self.on_session_changed().await;
            }
            Ok(LinkCompletion::AlreadyUsed) => {
                if manual {
                    self.state.mode = PanelMode::Error;
                    self.state.error_msg = Some(
                        "This sign-in link has already been used. Please request a new \
                         sign-in link."
                            .to_string(),
                    );
                }
            }
            Ok(LinkCompletion::NeedsEmail) => {
                self.state.mode = PanelMode::EmailLinkNeedsEmail;
            }
            Ok(LinkCompletion::MissingEmail) => {
                self.state.mode = PanelMode::Error;
                self.state.error_msg =
                    Some("Please enter the email address you used.".to_string());
            }
            Ok(LinkCompletion::NotASignInLink) => {
                if manual {
                    self.state.mode = PanelMode::Error;
                    self.state.error_msg =
                        Some("This page does not contain a valid sign-in link.".to_string());
                }
            }
            Err(PortError::InvalidActionCode) => {
                self.state.mode = PanelMode::Error;
                self.state.error_msg = Some(
                    "That sign-in link is no longer valid. Please request a new sign-in \
                     link and try again."
                        .to_string(),
                );
            }
            Err(e) => {
                self.state.mode = PanelMode::Error;
                self.state.error_msg = Some(e.to_string());
            }
        }
        self.state.loading = false;
    }

    //=====================================================================================
    // Reset and Dismissal
    //=====================================================================================

    /// Full reset: clears advice, snapshot, counters, and transient UI
    /// sub-states, then replaces the session with a fresh anonymous one.
    pub async fn reset_session(&mut self) {
        if !self.begin() {
            return;
        }
        self.state.advice_markdown = None;
        self.advice_tx.send_replace(None);
        self.state.mode = PanelMode::Idle;
        // Clear the comparison snapshot for a true reset.
        self.state.prev_snapshot = None;
        self.snapshots.clear();

        match self.sessions.reset().await {
            Ok(session) => {
                self.state.session = Some(session);
                self.state.auto_claim_attempted_for_uid = None;
                self.state.usage = UsageState::default();
                self.state.show_sign_in_panel = false;
                self.state.show_upgrade_modal = false;
                self.refresh_usage().await;
            }
            Err(e) => warn!("Reset session failed: {}", e),
        }
        self.state.loading = false;
    }

    /// Explicit dismissal is the only way out of the upgrade gate short of
    /// a successful request.
    pub fn dismiss_upgrade(&mut self) {
        self.state.mode = PanelMode::Idle;
        self.state.show_upgrade_modal = false;
    }

    pub fn set_sign_in_panel(&mut self, show: bool) {
        self.state.show_sign_in_panel = show;
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut PanelState {
        &mut self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::MemoryStore;
    use crate::panel::session::EMAIL_FOR_SIGN_IN_KEY;
    use async_trait::async_trait;
    use maker_price_core::domain::{SessionInfo, UsagePatch};
    use maker_price_core::ports::{IdentityService, KeyValueStore, PortResult};
    use maker_price_core::pricing::compute_breakdown;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const LINK: &str = "https://makerprice.example.com/?mode=signIn&oobCode=code-1";

    //-------------------------------------------------------------------------------------
    // Fakes
    //-------------------------------------------------------------------------------------

    #[derive(Default)]
    struct FakeAdvice {
        responses: Mutex<VecDeque<PortResult<AdviceResponse>>>,
        calls: Mutex<Vec<AdviceRequest>>,
    }

    impl FakeAdvice {
        fn queue(&self, response: PortResult<AdviceResponse>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn calls(&self) -> Vec<AdviceRequest> {
            self.calls.lock().unwrap().clone()
        }

        fn real_calls(&self) -> Vec<AdviceRequest> {
            self.calls().into_iter().filter(|c| !c.dry_run).collect()
        }
    }

    #[async_trait]
    impl AdviceService for FakeAdvice {
        async fn generate_advice(&self, request: &AdviceRequest) -> PortResult<AdviceResponse> {
            self.calls.lock().unwrap().push(request.clone());
            self.responses.lock().unwrap().pop_front().unwrap_or(Ok(
                AdviceResponse::Ok {
                    advice_markdown: None,
                    usage: UsagePatch::default(),
                },
            ))
        }
    }

    #[derive(Default)]
    struct FakeEntitlements {
        outcomes: Mutex<VecDeque<PortResult<ClaimOutcome>>>,
        calls: AtomicUsize,
    }

    impl FakeEntitlements {
        fn queue(&self, outcome: PortResult<ClaimOutcome>) {
            self.outcomes.lock().unwrap().push_back(outcome);
        }
    }

    #[async_trait]
    impl EntitlementService for FakeEntitlements {
        async fn claim_entitlements(&self) -> PortResult<ClaimOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(ClaimOutcome::NoPendingClaim))
        }
    }

    #[derive(Default)]
    struct FakeIdentity {
        current: Mutex<Option<SessionInfo>>,
        anon_counter: AtomicUsize,
        link_error: Mutex<Option<PortError>>,
        email_link_error: Mutex<Option<PortError>>,
        email_link_calls: AtomicUsize,
        credential_calls: AtomicUsize,
        sent_links: Mutex<Vec<(String, String)>>,
    }

    impl FakeIdentity {
        fn identified(email: &str) -> SessionInfo {
            SessionInfo {
                uid: format!("uid-{}", email),
                email: Some(email.to_string()),
                is_anonymous: false,
            }
        }

        fn set_current(&self, session: SessionInfo) {
            *self.current.lock().unwrap() = Some(session);
        }
    }

    #[async_trait]
    impl IdentityService for FakeIdentity {
        async fn restore_session(&self) -> PortResult<Option<SessionInfo>> {
            Ok(None)
        }

        async fn current_session(&self) -> Option<SessionInfo> {
            self.current.lock().unwrap().clone()
        }

        async fn sign_in_anonymously(&self) -> PortResult<SessionInfo> {
            let n = self.anon_counter.fetch_add(1, Ordering::SeqCst);
            let session = SessionInfo {
                uid: format!("anon-{}", n),
                email: None,
                is_anonymous: true,
            };
            self.set_current(session.clone());
            Ok(session)
        }

        async fn sign_out(&self) -> PortResult<()> {
            *self.current.lock().unwrap() = None;
            Ok(())
        }

        async fn link_with_provider(&self, _provider_token: &str) -> PortResult<SessionInfo> {
            if let Some(e) = self.link_error.lock().unwrap().take() {
                return Err(e);
            }
            let session = Self::identified("maker@example.com");
            self.set_current(session.clone());
            Ok(session)
        }

        async fn sign_in_with_provider(&self, _provider_token: &str) -> PortResult<SessionInfo> {
            let session = Self::identified("maker@example.com");
            self.set_current(session.clone());
            Ok(session)
        }

        async fn sign_in_with_credential(&self, _credential: &str) -> PortResult<SessionInfo> {
            self.credential_calls.fetch_add(1, Ordering::SeqCst);
            let session = Self::identified("maker@example.com");
            self.set_current(session.clone());
            Ok(session)
        }

        async fn send_sign_in_link(&self, email: &str, redirect_url: &str) -> PortResult<()> {
            self.sent_links
                .lock()
                .unwrap()
                .push((email.to_string(), redirect_url.to_string()));
            Ok(())
        }

        fn is_sign_in_link(&self, link: &str) -> bool {
            link.contains("mode=signIn") && link.contains("oobCode=")
        }

        async fn sign_in_with_email_link(
            &self,
            email: &str,
            _link: &str,
        ) -> PortResult<SessionInfo> {
            self.email_link_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = self.email_link_error.lock().unwrap().take() {
                return Err(e);
            }
            let session = Self::identified(email);
            self.set_current(session.clone());
            Ok(session)
        }

        async fn id_token(&self) -> PortResult<Option<String>> {
            Ok(self
                .current
                .lock()
                .unwrap()
                .as_ref()
                .map(|_| "token".to_string()))
        }
    }

    //-------------------------------------------------------------------------------------
    // Test Bed
    //-------------------------------------------------------------------------------------

    struct TestBed {
        advice: Arc<FakeAdvice>,
        entitlements: Arc<FakeEntitlements>,
        identity: Arc<FakeIdentity>,
        durable: Arc<MemoryStore>,
        panel: AdvicePanel,
    }

    fn test_bed() -> TestBed {
        let advice = Arc::new(FakeAdvice::default());
        let entitlements = Arc::new(FakeEntitlements::default());
        let identity = Arc::new(FakeIdentity::default());
        let durable = Arc::new(MemoryStore::new());
        let session_scoped: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());

        let sessions = SessionManager::new(
            identity.clone(),
            durable.clone(),
            session_scoped,
            "https://makerprice.example.com/".to_string(),
            Duration::from_millis(0),
        );
        let snapshots = SnapshotStore::new(durable.clone());
        let panel = AdvicePanel::new(
            advice.clone(),
            entitlements.clone(),
            sessions,
            snapshots,
            "makerprice".to_string(),
            "https://checkout.example.com/".to_string(),
        );

        TestBed {
            advice,
            entitlements,
            identity,
            durable,
            panel,
        }
    }

    fn ok_response(markdown: &str, usage: UsagePatch) -> PortResult<AdviceResponse> {
        Ok(AdviceResponse::Ok {
            advice_markdown: Some(markdown.to_string()),
            usage,
        })
    }

    //-------------------------------------------------------------------------------------
    // Advice Lifecycle
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn quota_gate_blocks_without_contacting_the_service() {
        let mut bed = test_bed();
        bed.panel.state_mut().usage.free_used = FREE_LIMIT;

        let input = PricingInput::default();
        let results = compute_breakdown(&input);
        bed.panel
            .request_advice(&input, &results, Currency::Dollar)
            .await;

        assert!(bed.advice.calls().is_empty());
        assert_eq!(bed.panel.state().mode, PanelMode::UpgradeRequired);
        assert!(bed.panel.state().show_upgrade_modal);
        assert!(!bed.panel.state().loading);
    }

    #[tokio::test]
    async fn entitled_user_passes_the_gate_despite_exhausted_free_uses() {
        let mut bed = test_bed();
        bed.panel.state_mut().usage.free_used = FREE_LIMIT;
        bed.panel.state_mut().usage.entitled = true;
        bed.advice
            .queue(ok_response("## Summary\nGood.", UsagePatch::default()));

        let input = PricingInput::default();
        let results = compute_breakdown(&input);
        bed.panel
            .request_advice(&input, &results, Currency::Dollar)
            .await;

        assert_eq!(bed.advice.real_calls().len(), 1);
        assert_eq!(bed.panel.state().mode, PanelMode::Ok);
    }

    #[tokio::test]
    async fn successful_advice_mirrors_usage_and_saves_a_snapshot() {
        let mut bed = test_bed();
        bed.panel.state_mut().usage.entitled = true;
        bed.advice.queue(ok_response(
            "## Summary\nLooks healthy.",
            UsagePatch {
                free_used: Some(2),
                ..UsagePatch::default()
            },
        ));

        let input = PricingInput::default();
        let results = compute_breakdown(&input);
        bed.panel
            .request_advice(&input, &results, Currency::Pound)
            .await;

        let state = bed.panel.state();
        assert_eq!(state.mode, PanelMode::Ok);
        // entitled was absent from the response, so the prior value holds.
        assert!(state.usage.entitled);
        assert_eq!(state.usage.free_used, 2);
        assert_eq!(
            state.advice_markdown.as_deref(),
            Some("## Summary\nLooks healthy.")
        );

        let saved = SnapshotStore::new(bed.durable.clone()).read().unwrap();
        assert_eq!(saved.state, input);
        assert_eq!(saved.results, results);

        let document = bed.panel.advice_document();
        assert_eq!(document.len(), 1);
        assert_eq!(document[0].title, "Summary");
    }

    #[tokio::test]
    async fn advice_watch_channel_carries_the_new_text() {
        let mut bed = test_bed();
        let updates = bed.panel.advice_updates();
        bed.advice.queue(ok_response("fresh advice", UsagePatch::default()));

        let input = PricingInput::default();
        let results = compute_breakdown(&input);
        bed.panel
            .request_advice(&input, &results, Currency::Dollar)
            .await;

        assert_eq!(updates.borrow().as_deref(), Some("fresh advice"));
    }

    #[tokio::test]
    async fn transport_failure_keeps_usage_and_snapshot_untouched() {
        let mut bed = test_bed();
        bed.panel.state_mut().usage.free_used = 1;
        bed.advice
            .queue(Err(PortError::Unexpected("boom".to_string())));

        let input = PricingInput::default();
        let results = compute_breakdown(&input);
        bed.panel
            .request_advice(&input, &results, Currency::Dollar)
            .await;

        let state = bed.panel.state();
        assert_eq!(state.mode, PanelMode::Error);
        assert!(state.error_msg.as_deref().unwrap().contains("boom"));
        assert_eq!(state.usage.free_used, 1);
        assert!(state.advice_markdown.is_none());
        assert!(SnapshotStore::new(bed.durable.clone()).read().is_none());
    }

    #[tokio::test]
    async fn upgrade_required_response_applies_counters_and_gates() {
        let mut bed = test_bed();
        bed.advice.queue(Ok(AdviceResponse::UpgradeRequired {
            message: Some("out of uses".to_string()),
            usage: UsagePatch {
                free_used: Some(3),
                entitled: Some(false),
                ..UsagePatch::default()
            },
        }));

        let input = PricingInput::default();
        let results = compute_breakdown(&input);
        bed.panel
            .request_advice(&input, &results, Currency::Dollar)
            .await;

        let state = bed.panel.state();
        assert_eq!(state.mode, PanelMode::UpgradeRequired);
        assert!(state.show_upgrade_modal);
        assert_eq!(state.usage.free_used, 3);
    }

    #[tokio::test]
    async fn busy_panel_ignores_a_second_request() {
        let mut bed = test_bed();
        bed.panel.state_mut().loading = true;

        let input = PricingInput::default();
        let results = compute_breakdown(&input);
        bed.panel
            .request_advice(&input, &results, Currency::Dollar)
            .await;

        assert!(bed.advice.calls().is_empty());
        assert!(bed.panel.state().loading);
    }

    //-------------------------------------------------------------------------------------
    // Comparison Payloads
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn comparison_is_suppressed_when_nothing_changed() {
        let mut bed = test_bed();
        let input = PricingInput::default();
        let results = compute_breakdown(&input);
        bed.panel.state_mut().prev_snapshot = Some(Snapshot {
            state: input.clone(),
            results: results.clone(),
            saved_at_ms: 1_700_000_000_000,
        });

        bed.panel
            .request_advice(&input, &results, Currency::Dollar)
            .await;

        let sent = &bed.advice.real_calls()[0];
        let payload = sent.payload.as_ref().unwrap();
        assert!(payload.previous.is_none());
        assert!(payload.rate_delta.is_none());
        assert!(payload.change_summary.is_none());
    }

    #[tokio::test]
    async fn changed_inputs_attach_previous_and_summary() {
        let mut bed = test_bed();
        let previous_input = PricingInput::default();
        let previous_results = compute_breakdown(&previous_input);
        bed.panel.state_mut().prev_snapshot = Some(Snapshot {
            state: previous_input,
            results: previous_results,
            saved_at_ms: 1_700_000_000_000,
        });

        let input = PricingInput {
            hourly_rate: 30.0,
            ..PricingInput::default()
        };
        let results = compute_breakdown(&input);
        bed.panel
            .request_advice(&input, &results, Currency::Dollar)
            .await;

        let sent = &bed.advice.real_calls()[0];
        let payload = sent.payload.as_ref().unwrap();
        assert!(payload.previous.is_some());
        // No effective rates on either side, so no delta travels.
        assert!(payload.rate_delta.is_none());
        assert!(payload
            .change_summary
            .as_deref()
            .unwrap()
            .contains("hourlyRate: 25 → 30"));
    }

    #[tokio::test]
    async fn rate_delta_travels_when_effective_rates_differ() {
        let mut bed = test_bed();
        let input = PricingInput::default();
        let mut previous_results = compute_breakdown(&input);
        previous_results.effective_hourly_rate = Some(20.0);
        bed.panel.state_mut().prev_snapshot = Some(Snapshot {
            state: input.clone(),
            results: previous_results,
            saved_at_ms: 1_700_000_000_000,
        });

        let mut results = compute_breakdown(&input);
        results.effective_hourly_rate = Some(22.5);
        bed.panel
            .request_advice(&input, &results, Currency::Dollar)
            .await;

        let sent = &bed.advice.real_calls()[0];
        let payload = sent.payload.as_ref().unwrap();
        assert_eq!(payload.rate_delta, Some(2.5));
        assert!(payload.previous.is_some());
    }

    //-------------------------------------------------------------------------------------
    // Usage Probe
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn usage_probe_is_a_dry_run_and_swallows_failures() {
        let mut bed = test_bed();
        bed.advice.queue(Ok(AdviceResponse::Ok {
            advice_markdown: None,
            usage: UsagePatch {
                entitled: Some(true),
                free_used: Some(1),
                paid_remaining: Some(90),
            },
        }));
        bed.panel.refresh_usage().await;

        let calls = bed.advice.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].dry_run);
        assert!(calls[0].payload.is_none());
        assert_eq!(bed.panel.state().usage.free_used, 1);
        assert_eq!(bed.panel.state().usage.paid_remaining, 90);

        bed.advice
            .queue(Err(PortError::Unexpected("offline".to_string())));
        bed.panel.refresh_usage().await;
        assert!(bed.panel.state().error_msg.is_none());
        assert_eq!(bed.panel.state().usage.free_used, 1);
    }

    //-------------------------------------------------------------------------------------
    // Identity and Claiming
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn auto_claim_runs_once_per_uid() {
        let mut bed = test_bed();
        bed.identity
            .set_current(FakeIdentity::identified("maker@example.com"));
        bed.entitlements.queue(Ok(ClaimOutcome::Claimed));

        bed.panel.on_session_changed().await;
        assert_eq!(bed.panel.state().mode, PanelMode::Claimed);
        assert!(bed.panel.state().usage.entitled);

        // The same uid never claims twice.
        bed.panel.on_session_changed().await;
        assert_eq!(bed.entitlements.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn anonymous_sessions_never_auto_claim() {
        let mut bed = test_bed();
        bed.panel.init().await;

        assert!(bed.panel.state().session.as_ref().unwrap().is_anonymous);
        assert_eq!(bed.entitlements.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn silent_claim_failure_only_logs() {
        let mut bed = test_bed();
        bed.identity
            .set_current(FakeIdentity::identified("maker@example.com"));
        bed.entitlements
            .queue(Err(PortError::Unexpected("offline".to_string())));

        bed.panel.on_session_changed().await;

        assert!(bed.panel.state().error_msg.is_none());
    }

    #[tokio::test]
    async fn manual_claim_without_email_session_is_a_local_error() {
        let mut bed = test_bed();
        bed.panel.claim_purchase().await;

        assert_eq!(bed.entitlements.calls.load(Ordering::SeqCst), 0);
        assert_eq!(bed.panel.state().mode, PanelMode::Error);
        assert!(bed
            .panel
            .state()
            .error_msg
            .as_deref()
            .unwrap()
            .contains("Sign in first"));
    }

    #[tokio::test]
    async fn link_conflict_falls_back_to_the_extracted_credential() {
        let mut bed = test_bed();
        bed.identity.sign_in_anonymously().await.unwrap();
        bed.panel.state_mut().session = bed.identity.current_session().await;
        *bed.identity.link_error.lock().unwrap() = Some(PortError::CredentialAlreadyInUse {
            credential: Some("recovered-credential".to_string()),
        });

        bed.panel.sign_in_with_provider("provider-token").await;

        assert_eq!(bed.identity.credential_calls.load(Ordering::SeqCst), 1);
        let session = bed.panel.state().session.clone().unwrap();
        assert!(!session.is_anonymous);
        assert_eq!(session.email.as_deref(), Some("maker@example.com"));
    }

    //-------------------------------------------------------------------------------------
    // Email Links
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn email_link_send_requires_an_address() {
        let mut bed = test_bed();
        bed.panel.send_email_link("   ").await;

        assert!(bed.identity.sent_links.lock().unwrap().is_empty());
        assert_eq!(bed.panel.state().mode, PanelMode::Error);
    }

    #[tokio::test]
    async fn email_link_send_remembers_the_normalized_address() {
        let mut bed = test_bed();
        bed.panel.send_email_link("  Maker@Example.COM ").await;

        let sent = bed.identity.sent_links.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "maker@example.com");
        assert_eq!(
            bed.durable.get(EMAIL_FOR_SIGN_IN_KEY).as_deref(),
            Some("maker@example.com")
        );
        assert!(bed.panel.state().email_link_notice.is_some());
    }

    #[tokio::test]
    async fn completing_the_same_link_twice_calls_the_provider_once() {
        let mut bed = test_bed();
        bed.durable.set(EMAIL_FOR_SIGN_IN_KEY, "maker@example.com");

        bed.panel.complete_email_link(LINK, None).await;
        assert_eq!(bed.identity.email_link_calls.load(Ordering::SeqCst), 1);
        assert!(!bed.panel.state().session.as_ref().unwrap().is_anonymous);
        // The remembered email is cleared once consumed.
        assert!(bed.durable.get(EMAIL_FOR_SIGN_IN_KEY).is_none());

        // Replay: no further provider call, quiet in the automatic path.
        bed.durable.set(EMAIL_FOR_SIGN_IN_KEY, "maker@example.com");
        bed.panel.complete_email_link(LINK, None).await;
        assert_eq!(bed.identity.email_link_calls.load(Ordering::SeqCst), 1);
        assert!(bed.panel.state().error_msg.is_none());

        // The manual path reports the replay.
        bed.panel
            .complete_email_link(LINK, Some("maker@example.com"))
            .await;
        assert_eq!(bed.identity.email_link_calls.load(Ordering::SeqCst), 1);
        assert!(bed
            .panel
            .state()
            .error_msg
            .as_deref()
            .unwrap()
            .contains("already been used"));
    }

    #[tokio::test]
    async fn missing_remembered_email_asks_for_manual_entry() {
        let mut bed = test_bed();
        bed.panel.complete_email_link(LINK, None).await;

        assert_eq!(bed.panel.state().mode, PanelMode::EmailLinkNeedsEmail);
        assert_eq!(bed.identity.email_link_calls.load(Ordering::SeqCst), 0);

        // The token was not consumed, so manual completion still works.
        bed.panel
            .complete_email_link(LINK, Some("maker@example.com"))
            .await;
        assert_eq!(bed.identity.email_link_calls.load(Ordering::SeqCst), 1);
        assert!(!bed.panel.state().session.as_ref().unwrap().is_anonymous);
    }

    #[tokio::test]
    async fn invalid_link_clears_the_remembered_email() {
        let mut bed = test_bed();
        bed.durable.set(EMAIL_FOR_SIGN_IN_KEY, "maker@example.com");
        *bed.identity.email_link_error.lock().unwrap() = Some(PortError::InvalidActionCode);

        bed.panel.complete_email_link(LINK, None).await;

        assert_eq!(bed.panel.state().mode, PanelMode::Error);
        assert!(bed
            .panel
            .state()
            .error_msg
            .as_deref()
            .unwrap()
            .contains("no longer valid"));
        assert!(bed.durable.get(EMAIL_FOR_SIGN_IN_KEY).is_none());
    }

    //-------------------------------------------------------------------------------------
    // Reset
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn reset_clears_everything_and_mints_a_fresh_anonymous_session() {
        let mut bed = test_bed();
        bed.identity
            .set_current(FakeIdentity::identified("maker@example.com"));
        bed.entitlements.queue(Ok(ClaimOutcome::Claimed));
        bed.panel.on_session_changed().await;

        bed.advice.queue(ok_response("advice", UsagePatch::default()));
        let input = PricingInput::default();
        let results = compute_breakdown(&input);
        bed.panel
            .request_advice(&input, &results, Currency::Dollar)
            .await;
        assert!(bed.panel.state().advice_markdown.is_some());

        bed.panel.reset_session().await;

        let state = bed.panel.state();
        assert_eq!(state.mode, PanelMode::Idle);
        assert!(state.advice_markdown.is_none());
        assert!(state.prev_snapshot.is_none());
        assert!(!state.usage.entitled);
        assert_eq!(state.usage.free_used, 0);
        assert!(state.auto_claim_attempted_for_uid.is_none());
        assert!(state.session.as_ref().unwrap().is_anonymous);
        assert!(SnapshotStore::new(bed.durable.clone()).read().is_none());
    }

    #[tokio::test]
    async fn dismissing_the_upgrade_gate_returns_to_idle() {
        let mut bed = test_bed();
        bed.panel.state_mut().mode = PanelMode::UpgradeRequired;
        bed.panel.state_mut().show_upgrade_modal = true;

        bed.panel.dismiss_upgrade();

        assert_eq!(bed.panel.state().mode, PanelMode::Idle);
        assert!(!bed.panel.state().show_upgrade_modal);
    }
}
