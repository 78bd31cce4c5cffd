//! services/advisor/src/adapters/functions.rs
//!
//! This module contains the adapter for the hub's callable functions. It
//! implements the `AdviceService` and `EntitlementService` ports by POSTing
//! the callable envelope (`{"data": ...}` in, `{"result": ...}` out) with
//! the current session's bearer token attached.

use async_trait::async_trait;
use maker_price_core::ports::{
    AdviceRequest, AdviceResponse, AdviceService, ClaimOutcome, EntitlementService,
    IdentityService, PortError, PortResult,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that invokes the hub's callable functions over HTTPS.
pub struct CallableFunctionsAdapter {
    http: reqwest::Client,
    base_url: String,
    identity: Arc<dyn IdentityService>,
}

impl CallableFunctionsAdapter {
    /// Creates a new `CallableFunctionsAdapter`.
    pub fn new(base_url: String, identity: Arc<dyn IdentityService>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            identity,
        }
    }

    /// Invokes one callable function and unwraps its result envelope.
    async fn call(&self, name: &str, data: Value) -> PortResult<Value> {
        let mut request = self
            .http
            .post(format!("{}/{}", self.base_url, name))
            .json(&json!({ "data": data }));

        if let Some(token) = self.identity.id_token().await? {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!("Callable {} failed: {} - {}", name, status, body);
            return Err(PortError::Unexpected(format!(
                "{} returned {}",
                name, status
            )));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|_| PortError::UnexpectedResponse(name.to_string()))?;

        match envelope.get("result") {
            Some(result) => Ok(result.clone()),
            None => {
                let message = envelope["error"]["message"]
                    .as_str()
                    .unwrap_or("missing result")
                    .to_string();
                Err(PortError::Unexpected(format!("{}: {}", name, message)))
            }
        }
    }
}

//=========================================================================================
// `AdviceService` and `EntitlementService` Trait Implementations
//=========================================================================================

#[async_trait]
impl AdviceService for CallableFunctionsAdapter {
    async fn generate_advice(&self, request: &AdviceRequest) -> PortResult<AdviceResponse> {
        let data = serde_json::to_value(request)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let result = self.call("generateAdvice", data).await?;
        serde_json::from_value(result)
            .map_err(|_| PortError::UnexpectedResponse("generateAdvice".to_string()))
    }
}

#[async_trait]
impl EntitlementService for CallableFunctionsAdapter {
    async fn claim_entitlements(&self) -> PortResult<ClaimOutcome> {
        let result = self.call("claimEntitlements", json!({})).await?;
        let status = result["status"].as_str().unwrap_or("");
        Ok(ClaimOutcome::from_status(status))
    }
}
