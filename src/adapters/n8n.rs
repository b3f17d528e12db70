//! n8n webhook client for workflow-automation notifications.
//!
//! Endpoint: POST {base_url}/webhook/{workflow}
//! Auth: Bearer token

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{NotifyOutcome, WorkflowNotifier};

/// Default request timeout for webhook calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// n8n webhook notifier
pub struct N8nNotifier {
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl N8nNotifier {
    /// Create a new notifier. Without an API key every call is skipped and
    /// reported as not configured.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout: DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn webhook_url(&self, workflow: &str) -> String {
        format!("{}/webhook/{}", self.base_url, workflow)
    }
}

#[async_trait]
impl WorkflowNotifier for N8nNotifier {
    fn name(&self) -> &str {
        "n8n"
    }

    async fn notify(&self, workflow: &str, payload: Value) -> NotifyOutcome {
        let Some(ref api_key) = self.api_key else {
            debug!(workflow, "n8n API key not configured, skipping workflow");
            return NotifyOutcome::failed("n8n not configured");
        };

        let response = self
            .client
            .post(self.webhook_url(workflow))
            .header("Authorization", format!("Bearer {}", api_key))
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                debug!(workflow, %status, "n8n workflow triggered");
                NotifyOutcome::ok(if body.is_empty() {
                    status.to_string()
                } else {
                    body
                })
            }
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                warn!(workflow, %status, "n8n rejected workflow trigger");
                NotifyOutcome::failed(format!("n8n error ({}): {}", status, text))
            }
            Err(e) if e.is_timeout() => {
                warn!(workflow, timeout_ms = self.timeout.as_millis() as u64, "n8n call timed out");
                NotifyOutcome::failed(format!("n8n timed out after {:?}", self.timeout))
            }
            Err(e) => {
                warn!(workflow, error = %e, "Failed to reach n8n");
                NotifyOutcome::failed(format!("Failed to trigger n8n: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_webhook_url_trims_trailing_slash() {
        let notifier = N8nNotifier::new("http://n8n.local:5678/", None);
        assert_eq!(
            notifier.webhook_url("episode-created"),
            "http://n8n.local:5678/webhook/episode-created"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_notifier_reports_failure() {
        let notifier = N8nNotifier::new("http://localhost:5678", None);
        assert!(!notifier.is_configured());

        let outcome = notifier.notify("episode-created", json!({})).await;
        assert!(!outcome.success);
        assert_eq!(outcome.detail, "n8n not configured");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_does_not_error() {
        // port 9 (discard) is closed on test machines
        let notifier = N8nNotifier::new("http://127.0.0.1:9", Some("key".to_string()))
            .with_timeout(Duration::from_millis(500));

        let outcome = notifier.notify("trigger-giorgio", json!({"agent": "giorgio"})).await;
        assert!(!outcome.success);
    }
}
