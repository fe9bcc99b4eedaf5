//! Setup-time trigger: seeds the table once on the first `Create` event and
//! reports every outcome to the orchestrator's callback URL.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::invoke::{InvokeError, SeedInvoker};
use crate::lifecycle::{RequestType, SetupLifecycle, Step};

pub const SEEDED_REASON: &str = "Data seeded successfully";
pub const NO_ACTION_REASON: &str = "No action needed";

/// Custom-resource event delivered by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisioningEvent {
    pub request_type: RequestType,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_properties: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Success,
    Failed,
}

/// Body PUT to the callback URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisioningResponse {
    pub status: Status,
    pub reason: String,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    pub data: Value,
}

impl ProvisioningResponse {
    fn new(event: &ProvisioningEvent, status: Status, data: Value) -> Self {
        let reason = data["message"]
            .as_str()
            .or_else(|| data["error"].as_str())
            .unwrap_or_default()
            .to_string();
        let physical_resource_id = event
            .physical_resource_id
            .clone()
            .unwrap_or_else(|| format!("seed-data-{}", Utc::now().timestamp_millis()));
        Self {
            status,
            reason,
            physical_resource_id,
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            data,
        }
    }
}

#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Failed to encode callback body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Error sending response: {0}")]
    Callback(#[from] reqwest::Error),
}

pub struct ProvisioningTrigger {
    invoker: Arc<dyn SeedInvoker>,
    lifecycle: SetupLifecycle,
    client: reqwest::Client,
    seed_timeout: Duration,
}

impl ProvisioningTrigger {
    pub fn new(
        invoker: Arc<dyn SeedInvoker>,
        lifecycle: SetupLifecycle,
        client: reqwest::Client,
        seed_timeout: Duration,
    ) -> Self {
        Self {
            invoker,
            lifecycle,
            client,
            seed_timeout,
        }
    }

    /// Runs the event to completion and reports it. The returned error is
    /// only for a callback that could not be delivered; seed failures are
    /// reported to the callback as `FAILED`.
    pub async fn handle(&self, event: &ProvisioningEvent) -> Result<ProvisioningResponse, TriggerError> {
        info!(
            request_type = ?event.request_type,
            request_id = %event.request_id,
            logical_resource_id = %event.logical_resource_id,
            "Custom resource event"
        );
        let (status, data) = self.run(event.request_type).await;
        let response = ProvisioningResponse::new(event, status, data);
        self.send_response(&event.response_url, &response).await?;
        Ok(response)
    }

    async fn run(&self, request: RequestType) -> (Status, Value) {
        let step = match self.lifecycle.begin(request) {
            Ok(step) => step,
            Err(e) => {
                error!(error = %e, "Setup state unavailable");
                return (Status::Failed, json!({ "error": format!("Setup state unavailable: {e}") }));
            }
        };
        if step == Step::Skip {
            return (Status::Success, json!({ "message": NO_ACTION_REASON }));
        }

        let outcome = match tokio::time::timeout(self.seed_timeout, self.invoker.invoke()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(InvokeError::TimedOut(self.seed_timeout)),
        };
        if let Err(e) = self.lifecycle.finish(outcome.is_ok()) {
            warn!(error = %e, "Failed to record setup state");
        }

        match outcome {
            Ok(report) => {
                info!(count = report.count, version = %report.version, "Seed function result");
                (
                    Status::Success,
                    json!({
                        "message": SEEDED_REASON,
                        "count": report.count,
                        "version": report.version,
                        "fingerprint": report.fingerprint,
                    }),
                )
            }
            Err(e) => {
                error!(error = %e, "Error invoking seed function");
                (Status::Failed, json!({ "error": e.to_string() }))
            }
        }
    }

    async fn send_response(&self, url: &str, response: &ProvisioningResponse) -> Result<(), TriggerError> {
        let body = serde_json::to_string(response)?;
        // Presigned callback URLs are signed without a content type.
        let reply = self
            .client
            .put(url)
            .header(CONTENT_TYPE, "")
            .body(body)
            .send()
            .await?;
        info!(status = %reply.status(), "Response status");
        reply.error_for_status()?;
        Ok(())
    }
}
