//! services/advisor/src/panel/session.rs
//!
//! The identity session manager: anonymous-to-identified upgrades,
//! passwordless email links with a one-time-use token guard, and session
//! reset. Each external trigger maps to one transition function here so
//! the orchestrator never talks to the identity provider directly.

use maker_price_core::domain::SessionInfo;
use maker_price_core::ports::{IdentityService, KeyValueStore, PortError, PortResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Durable key remembering the email a sign-in link was sent to, so the
/// link can be completed without re-entry.
pub const EMAIL_FOR_SIGN_IN_KEY: &str = "ixia_emailForSignIn";

/// Session-scoped key prefix marking consumed sign-in-link tokens.
pub const OOB_USED_KEY_PREFIX: &str = "ixia_emailOob_used_";

/// The outcome of an email-link completion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCompletion {
    SignedIn(SessionInfo),
    /// The link's one-time token was already consumed in this session.
    AlreadyUsed,
    /// No remembered email; the caller must collect one and retry.
    NeedsEmail,
    /// A manual completion arrived with an empty email.
    MissingEmail,
    NotASignInLink,
}

/// Coordinates the identity provider, the remembered-email entry, and the
/// one-time link-token markers.
pub struct SessionManager {
    identity: Arc<dyn IdentityService>,
    durable: Arc<dyn KeyValueStore>,
    session_scoped: Arc<dyn KeyValueStore>,
    app_base_url: String,
    anon_grace: Duration,
}

impl SessionManager {
    pub fn new(
        identity: Arc<dyn IdentityService>,
        durable: Arc<dyn KeyValueStore>,
        session_scoped: Arc<dyn KeyValueStore>,
        app_base_url: String,
        anon_grace: Duration,
    ) -> Self {
        Self {
            identity,
            durable,
            session_scoped,
            app_base_url,
            anon_grace,
        }
    }

    pub async fn current(&self) -> Option<SessionInfo> {
        self.identity.current_session().await
    }

    /// Returns the current session, restoring a persisted one when
    /// possible, and otherwise creating a fresh anonymous session after
    /// the grace delay (so a slow restore is not overridden).
    pub async fn ensure_session(&self) -> PortResult<SessionInfo> {
        if let Some(session) = self.identity.current_session().await {
            return Ok(session);
        }
        match self.identity.restore_session().await {
            Ok(Some(session)) => return Ok(session),
            Ok(None) => {}
            Err(e) => debug!("Session restore failed: {}", e),
        }

        tokio::time::sleep(self.anon_grace).await;
        if let Some(session) = self.identity.current_session().await {
            return Ok(session);
        }
        self.identity.sign_in_anonymously().await
    }

    /// Provider sign-in. An anonymous session is upgraded by linking; when
    /// the identity is already bound to another account, the credential
    /// from the failure signs in directly without a second prompt.
    pub async fn sign_in_with_provider(&self, provider_token: &str) -> PortResult<SessionInfo> {
        let anonymous = self
            .identity
            .current_session()
            .await
            .map(|s| s.is_anonymous)
            .unwrap_or(false);

        if !anonymous {
            return self.identity.sign_in_with_provider(provider_token).await;
        }

        match self.identity.link_with_provider(provider_token).await {
            Ok(session) => Ok(session),
            Err(PortError::CredentialAlreadyInUse { credential }) => match credential {
                Some(credential) => self.identity.sign_in_with_credential(&credential).await,
                // Fallback only if we truly have no credential (rare).
                None => self.identity.sign_in_with_provider(provider_token).await,
            },
            Err(e) => Err(e),
        }
    }

    /// Sends a passwordless sign-in link and remembers the email so the
    /// link can be completed without re-entry.
    pub async fn send_email_link(&self, email: &str) -> PortResult<()> {
        self.identity
            .send_sign_in_link(email, &self.app_base_url)
            .await?;
        self.durable.set(EMAIL_FOR_SIGN_IN_KEY, email);
        Ok(())
    }

    /// Completes a sign-in link, idempotently per one-time token.
    ///
    /// `NeedsEmail` and `MissingEmail` do not consume the token, so a
    /// follow-up manual completion can still succeed. A transport failure
    /// releases the token again; an invalid link keeps it consumed and
    /// clears the remembered email, forcing a fresh link.
    pub async fn complete_email_link(
        &self,
        link: &str,
        manual_email: Option<&str>,
    ) -> PortResult<LinkCompletion> {
        if !self.identity.is_sign_in_link(link) {
            return Ok(LinkCompletion::NotASignInLink);
        }

        let email = match manual_email {
            Some(entered) => {
                let entered = entered.trim().to_lowercase();
                if entered.is_empty() {
                    return Ok(LinkCompletion::MissingEmail);
                }
                entered
            }
            None => match self.durable.get(EMAIL_FOR_SIGN_IN_KEY) {
                Some(saved) => saved,
                None => return Ok(LinkCompletion::NeedsEmail),
            },
        };

        let marker = oob_code_from_link(link)
            .map(|code| format!("{}{}", OOB_USED_KEY_PREFIX, code));
        if let Some(marker) = &marker {
            if self.session_scoped.get(marker).is_some() {
                return Ok(LinkCompletion::AlreadyUsed);
            }
            self.session_scoped.set(marker, "1");
        }

        match self.identity.sign_in_with_email_link(&email, link).await {
            Ok(session) => {
                self.durable.remove(EMAIL_FOR_SIGN_IN_KEY);
                Ok(LinkCompletion::SignedIn(session))
            }
            Err(PortError::InvalidActionCode) => {
                self.durable.remove(EMAIL_FOR_SIGN_IN_KEY);
                Err(PortError::InvalidActionCode)
            }
            Err(e) => {
                if let Some(marker) = &marker {
                    self.session_scoped.remove(marker);
                }
                Err(e)
            }
        }
    }

    /// Signs out and replaces the session with a fresh anonymous one.
    pub async fn reset(&self) -> PortResult<SessionInfo> {
        if self.identity.current_session().await.is_some() {
            self.identity.sign_out().await?;
        }
        self.identity.sign_in_anonymously().await
    }
}

/// Extracts the link's opaque one-time code.
fn oob_code_from_link(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "oobCode")
        .map(|(_, value)| value.into_owned())
}
