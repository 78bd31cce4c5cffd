//! services/advisor/src/panel/state.rs
//!
//! Defines the advice panel's UI mode and mutable state.

use maker_price_core::domain::{SessionInfo, Snapshot, UsageState};
use serde::Serialize;

/// Free advice uses granted before the upgrade gate engages. The server
/// enforces the same limit independently; this local gate only saves a
/// round trip.
pub const FREE_LIMIT: u32 = 3;

/// The panel's current UI mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PanelMode {
    Idle,
    Ok,
    UpgradeRequired,
    Claiming,
    Claimed,
    EmailLinkNeedsEmail,
    Error,
}

/// Everything the panel mutates while driving the advice lifecycle.
#[derive(Debug, Clone)]
pub struct PanelState {
    pub mode: PanelMode,
    pub loading: bool,
    pub error_msg: Option<String>,
    pub info_msg: Option<String>,
    /// Notice shown under the "email me a sign-in link" action.
    pub email_link_notice: Option<String>,
    pub advice_markdown: Option<String>,
    pub usage: UsageState,
    pub prev_snapshot: Option<Snapshot>,
    pub session: Option<SessionInfo>,
    /// Guard so the automatic entitlement claim runs once per uid.
    pub auto_claim_attempted_for_uid: Option<String>,
    pub show_sign_in_panel: bool,
    pub show_upgrade_modal: bool,
}

impl PanelState {
    pub fn new() -> Self {
        Self {
            mode: PanelMode::Idle,
            loading: false,
            error_msg: None,
            info_msg: None,
            email_link_notice: None,
            advice_markdown: None,
            usage: UsageState::default(),
            prev_snapshot: None,
            session: None,
            auto_claim_attempted_for_uid: None,
            show_sign_in_panel: false,
            show_upgrade_modal: false,
        }
    }

    /// Errors are cleared at the start of every new attempt; each concern
    /// has exactly one message slot.
    pub fn clear_messages(&mut self) {
        self.error_msg = None;
        self.info_msg = None;
        self.email_link_notice = None;
    }

    /// The one-line identity summary shown above the panel.
    pub fn auth_line(&self) -> String {
        match &self.session {
            None => "Not signed in".to_string(),
            Some(session) if session.is_anonymous => "Free mode (anonymous)".to_string(),
            Some(session) => format!(
                "Signed in • {}",
                session.email.as_deref().unwrap_or("email unavailable")
            ),
        }
    }

    /// The free-use counter line. Hidden once entitled; the unlock message
    /// is enough on its own.
    pub fn entitlement_line(&self) -> Option<String> {
        if self.usage.entitled {
            return None;
        }
        Some(format!(
            "Free uses in this tool: {} / {}",
            self.usage.free_used, FREE_LIMIT
        ))
    }
}

impl Default for PanelState {
    fn default() -> Self {
        Self::new()
    }
}
