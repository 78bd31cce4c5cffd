//! services/advisor/src/adapters/identity.rs
//!
//! This module contains the adapter for the hub's identity provider. It
//! implements the `IdentityService` port from the `core` crate against the
//! provider's accounts REST API, and persists the current session through
//! the durable key-value store so it survives restarts.

use async_trait::async_trait;
use maker_price_core::domain::SessionInfo;
use maker_price_core::ports::{IdentityService, KeyValueStore, PortError, PortResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, RwLock};
use tracing::debug;
use url::Url;

/// Durable key under which the current session is persisted.
const AUTH_SESSION_KEY: &str = "ixia_hub_auth_session_v1";

/// The query parameter marking a passwordless sign-in link.
const OOB_CODE_PARAM: &str = "oobCode";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// The current authenticated session, including the tokens the provider
/// issued for it. Only `info` ever leaves this module.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuthState {
    info: SessionInfo,
    id_token: String,
    refresh_token: Option<String>,
}

/// An identity adapter backed by the hub's accounts REST API.
pub struct HubIdentityAdapter {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    store: Arc<dyn KeyValueStore>,
    state: RwLock<Option<AuthState>>,
}

impl HubIdentityAdapter {
    /// Creates a new `HubIdentityAdapter`.
    pub fn new(base_url: String, api_key: String, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            api_key,
            store,
            state: RwLock::new(None),
        }
    }

    fn endpoint(&self, operation: &str) -> String {
        format!("{}/accounts:{}?key={}", self.base_url, operation, self.api_key)
    }

    /// Makes one accounts call, mapping provider error codes onto the
    /// distinctions the panel logic branches on.
    async fn call(&self, operation: &str, body: Value) -> PortResult<Value> {
        let response = self
            .http
            .post(self.endpoint(operation))
            .json(&body)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if response.status().is_success() {
            return response
                .json()
                .await
                .map_err(|_| PortError::UnexpectedResponse("identity provider".to_string()));
        }

        let status = response.status();
        let error_body: Value = response.json().await.unwrap_or_default();
        let code = error_body["error"]["message"].as_str().unwrap_or("");
        Err(map_provider_error(code, status))
    }

    /// Parses an accounts response into a session and makes it current.
    fn install_session(
        &self,
        response: &Value,
        is_anonymous: bool,
        email_hint: Option<&str>,
    ) -> PortResult<SessionInfo> {
        let uid = response["localId"]
            .as_str()
            .ok_or_else(|| PortError::UnexpectedResponse("identity provider".to_string()))?;
        let id_token = response["idToken"]
            .as_str()
            .ok_or_else(|| PortError::UnexpectedResponse("identity provider".to_string()))?;
        let email = response["email"]
            .as_str()
            .or(email_hint)
            .map(|e| e.to_string());

        let auth = AuthState {
            info: SessionInfo {
                uid: uid.to_string(),
                email,
                is_anonymous,
            },
            id_token: id_token.to_string(),
            refresh_token: response["refreshToken"].as_str().map(|t| t.to_string()),
        };

        if let Ok(raw) = serde_json::to_string(&auth) {
            self.store.set(AUTH_SESSION_KEY, &raw);
        }
        let info = auth.info.clone();
        if let Ok(mut state) = self.state.write() {
            *state = Some(auth);
        }
        Ok(info)
    }

    fn current_id_token(&self) -> Option<String> {
        self.state
            .read()
            .ok()?
            .as_ref()
            .map(|auth| auth.id_token.clone())
    }
}

fn map_provider_error(code: &str, status: reqwest::StatusCode) -> PortError {
    match code {
        "INVALID_OOB_CODE" | "EXPIRED_OOB_CODE" | "INVALID_EMAIL" => PortError::InvalidActionCode,
        "FEDERATED_USER_ID_ALREADY_LINKED" | "EMAIL_EXISTS" => {
            PortError::CredentialAlreadyInUse { credential: None }
        }
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" | "USER_DISABLED" => {
            PortError::Unauthorized
        }
        "" => PortError::Unexpected(format!("identity provider returned {}", status)),
        other => PortError::Unexpected(other.to_string()),
    }
}

fn oob_code_from_link(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == OOB_CODE_PARAM)
        .map(|(_, value)| value.into_owned())
}

//=========================================================================================
// `IdentityService` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityService for HubIdentityAdapter {
    async fn restore_session(&self) -> PortResult<Option<SessionInfo>> {
        let Some(raw) = self.store.get(AUTH_SESSION_KEY) else {
            return Ok(None);
        };
        let auth: AuthState = match serde_json::from_str(&raw) {
            Ok(auth) => auth,
            Err(e) => {
                debug!("Ignoring unreadable persisted session: {}", e);
                self.store.remove(AUTH_SESSION_KEY);
                return Ok(None);
            }
        };

        // Validate the persisted token before trusting it.
        match self
            .call("lookup", json!({ "idToken": auth.id_token }))
            .await
        {
            Ok(_) => {
                let info = auth.info.clone();
                if let Ok(mut state) = self.state.write() {
                    *state = Some(auth);
                }
                Ok(Some(info))
            }
            Err(e) => {
                debug!("Persisted session no longer valid: {}", e);
                self.store.remove(AUTH_SESSION_KEY);
                Ok(None)
            }
        }
    }

    async fn current_session(&self) -> Option<SessionInfo> {
        self.state
            .read()
            .ok()?
            .as_ref()
            .map(|auth| auth.info.clone())
    }

    async fn sign_in_anonymously(&self) -> PortResult<SessionInfo> {
        let response = self.call("signUp", json!({ "returnSecureToken": true })).await?;
        self.install_session(&response, true, None)
    }

    async fn sign_out(&self) -> PortResult<()> {
        if let Ok(mut state) = self.state.write() {
            *state = None;
        }
        self.store.remove(AUTH_SESSION_KEY);
        Ok(())
    }

    async fn link_with_provider(&self, provider_token: &str) -> PortResult<SessionInfo> {
        let Some(id_token) = self.current_id_token() else {
            return Err(PortError::Unauthorized);
        };
        let body = json!({
            "idToken": id_token,
            "postBody": format!("id_token={}&providerId=google.com", provider_token),
            "requestUri": "http://localhost",
            "returnSecureToken": true,
            "returnIdpCredential": true,
        });
        match self.call("signInWithIdp", body).await {
            Ok(response) => self.install_session(&response, false, None),
            // The provider identity is already bound elsewhere; hand the
            // caller back a credential it can sign in with directly.
            Err(PortError::CredentialAlreadyInUse { .. }) => {
                Err(PortError::CredentialAlreadyInUse {
                    credential: Some(provider_token.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_in_with_provider(&self, provider_token: &str) -> PortResult<SessionInfo> {
        let body = json!({
            "postBody": format!("id_token={}&providerId=google.com", provider_token),
            "requestUri": "http://localhost",
            "returnSecureToken": true,
            "returnIdpCredential": true,
        });
        let response = self.call("signInWithIdp", body).await?;
        self.install_session(&response, false, None)
    }

    async fn sign_in_with_credential(&self, credential: &str) -> PortResult<SessionInfo> {
        self.sign_in_with_provider(credential).await
    }

    async fn send_sign_in_link(&self, email: &str, redirect_url: &str) -> PortResult<()> {
        self.call(
            "sendOobCode",
            json!({
                "requestType": "EMAIL_SIGNIN",
                "email": email,
                "continueUrl": redirect_url,
            }),
        )
        .await?;
        Ok(())
    }

    fn is_sign_in_link(&self, link: &str) -> bool {
        let Ok(url) = Url::parse(link) else {
            return false;
        };
        let mut has_code = false;
        let mut is_sign_in_mode = false;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                OOB_CODE_PARAM => has_code = !value.is_empty(),
                "mode" => is_sign_in_mode = value == "signIn",
                _ => {}
            }
        }
        has_code && is_sign_in_mode
    }

    async fn sign_in_with_email_link(&self, email: &str, link: &str) -> PortResult<SessionInfo> {
        let Some(oob_code) = oob_code_from_link(link) else {
            return Err(PortError::InvalidActionCode);
        };
        let response = self
            .call(
                "signInWithEmailLink",
                json!({ "email": email, "oobCode": oob_code }),
            )
            .await?;
        self.install_session(&response, false, Some(email))
    }

    async fn id_token(&self) -> PortResult<Option<String>> {
        Ok(self.current_id_token())
    }
}
