//! Purge batcher: bounded-size, concurrent CDN invalidation calls.
//!
//! Partitions a URL set into batches of at most `max_urls_per_batch`, issues
//! one purge API call per batch with unbounded fan-out, and on any setup
//! failure re-enqueues the entire original set as a new task. Purging is
//! idempotent, so full replay is always safe.

use std::sync::Arc;

use crate::config::{CredentialProvider, Credentials, SweepConfig};
use crate::error::{Result, SweepError};
use crate::fanout::{fanout, FanoutRequest};
use crate::http::HttpClient;
use crate::journal::EventLog;
use crate::queue::{DispatchTask, TaskQueue};
use crate::urls::UrlSet;

/// Executes `Purge` tasks pulled from the task queue.
pub struct PurgeBatcher<H, Q>
where
    H: HttpClient,
    Q: TaskQueue,
{
    http: H,
    queue: Arc<Q>,
    credentials: Arc<dyn CredentialProvider>,
    config: Arc<SweepConfig>,
    journal: Arc<dyn EventLog>,
}

impl<H, Q> PurgeBatcher<H, Q>
where
    H: HttpClient + 'static,
    Q: TaskQueue,
{
    pub fn new(
        http: H,
        queue: Arc<Q>,
        credentials: Arc<dyn CredentialProvider>,
        config: Arc<SweepConfig>,
        journal: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            http,
            queue,
            credentials,
            config,
            journal,
        }
    }

    /// Process one `Purge` task.
    ///
    /// Per-batch HTTP failures are logged and swallowed; only a failure
    /// before dispatch (missing credentials, unreachable queue state) causes
    /// the whole original URL set to be re-enqueued as a fresh task.
    #[tracing::instrument(skip(self, urls), fields(urls = urls.len()))]
    pub async fn purge(&self, urls: &UrlSet) {
        if urls.is_empty() {
            return;
        }

        match self.dispatch_batches(urls).await {
            Ok(()) => {
                self.journal
                    .record("sent all purge batches for the current task");
            }
            Err(error) => {
                tracing::warn!(error = %error, kind = error.kind(), "Purge setup failed, re-enqueueing task");
                self.journal
                    .record(&format!("purge failed ({error}), task re-enqueued"));
                // Re-enqueue the original, unbatched set: replaying already
                // purged URLs is harmless, losing URLs is not.
                if let Err(enqueue_error) = self
                    .queue
                    .enqueue(DispatchTask::purge(urls.clone()))
                    .await
                {
                    tracing::error!(error = %enqueue_error, "Failed to re-enqueue purge task");
                }
            }
        }
    }

    async fn dispatch_batches(&self, urls: &UrlSet) -> Result<()> {
        let credentials = self.fetch_credentials().await?;
        let endpoint = self.config.purge_endpoint(&credentials.zone_id);

        let mut requests = Vec::new();
        for batch in urls.chunks(self.config.max_urls_per_batch) {
            let body = serde_json::to_string(&serde_json::json!({ "files": batch }))?;
            requests.push(self.authed_post(&endpoint, body, &credentials));
            self.journal
                .record(&format!("sending purge batch: {}", batch.join(", ")));
        }

        tracing::debug!(batches = requests.len(), "Dispatching purge batches");

        // Batches are already bounded in size and count; fan out unbounded.
        let results = fanout(&self.http, requests, None).await;
        for (index, result) in results.iter().enumerate() {
            if result.is_success() {
                tracing::debug!(batch = index, "Purge batch accepted");
            } else if let Some(status) = result.status {
                tracing::warn!(batch = index, status, "Purge batch rejected by CDN");
                self.journal
                    .record(&format!("purge batch {index} rejected with status {status}"));
            } else {
                let error = result.error.as_deref().unwrap_or("unknown error");
                tracing::warn!(batch = index, error, "Purge batch transport failure");
                self.journal
                    .record(&format!("purge batch {index} failed: {error}"));
            }
        }

        Ok(())
    }

    /// Clear the entire zone synchronously.
    ///
    /// Unlike batch purging this surfaces failure to the caller: it backs an
    /// operator-facing action that reports success or an error message.
    pub async fn purge_everything(&self) -> Result<()> {
        let credentials = self.fetch_credentials().await?;
        let endpoint = self.config.purge_endpoint(&credentials.zone_id);

        let body = serde_json::to_string(&serde_json::json!({ "purge_everything": true }))?;
        let request = FanoutRequest::post(&endpoint, body, self.config.purge_everything_timeout)
            .header("X-Auth-Email", &credentials.email)
            .header("X-Auth-Key", &credentials.api_key)
            .header("Content-Type", "application/json");

        let response = self.http.execute(&request).await?;
        if envelope_success(&response.body) {
            self.journal.record("cleared entire CDN zone");
            Ok(())
        } else {
            let message = envelope_errors(&response.body).join("; ");
            let message = if message.is_empty() {
                "unknown error".to_string()
            } else {
                message
            };
            self.journal
                .record(&format!("whole-zone clear failed: {message}"));
            Err(SweepError::RemoteApi {
                status: response.status,
                message,
            })
        }
    }

    /// Check the credentials against the zone verification endpoint.
    ///
    /// Recognizes the two common failure modes (bad zone id, bad key/email)
    /// and returns them as readable messages; anything else passes through
    /// the CDN's own message.
    pub async fn verify_credentials(&self) -> Result<()> {
        let credentials = self.fetch_credentials().await?;
        let endpoint = self.config.zone_endpoint(&credentials.zone_id);

        let request = FanoutRequest::get(&endpoint, self.config.purge_timeout)
            .header("X-Auth-Email", &credentials.email)
            .header("X-Auth-Key", &credentials.api_key)
            .header("Content-Type", "application/json");

        let response = self.http.execute(&request).await?;
        if envelope_success(&response.body) {
            return Ok(());
        }

        let errors = envelope_errors(&response.body);
        let message = if errors.is_empty() {
            "unknown error".to_string()
        } else {
            errors
                .iter()
                .map(|m| translate_api_error(m))
                .collect::<Vec<_>>()
                .join("; ")
        };
        Err(SweepError::RemoteApi {
            status: response.status,
            message,
        })
    }

    async fn fetch_credentials(&self) -> Result<Credentials> {
        let credentials = self.credentials.credentials().await?;
        if !credentials.is_complete() {
            return Err(SweepError::MissingCredentials);
        }
        Ok(credentials)
    }

    fn authed_post(&self, endpoint: &str, body: String, credentials: &Credentials) -> FanoutRequest {
        FanoutRequest::post(endpoint, body, self.config.purge_timeout)
            .header("X-Auth-Email", &credentials.email)
            .header("X-Auth-Key", &credentials.api_key)
            .header("Content-Type", "application/json")
    }
}

/// True when the response body carries `"success": true`.
fn envelope_success(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("success").and_then(|s| s.as_bool()))
        .unwrap_or(false)
}

/// Error messages from the response envelope's `errors` array.
fn envelope_errors(body: &str) -> Vec<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("errors").and_then(|e| e.as_array()).map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                    .map(str::to_string)
                    .collect()
            })
        })
        .unwrap_or_default()
}

/// Map the two recognized CDN error messages to actionable text.
fn translate_api_error(message: &str) -> String {
    if message.contains("Could not route to") {
        "zone id is not valid, check the configured zone id".to_string()
    } else if message.contains("Unknown X-Auth-Key or X-Auth-Email") {
        "API key or account email is not valid, check the configured credentials".to_string()
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_success_requires_true() {
        assert!(envelope_success(r#"{"success":true}"#));
        assert!(!envelope_success(r#"{"success":false}"#));
        assert!(!envelope_success(r#"{}"#));
        assert!(!envelope_success("not json"));
    }

    #[test]
    fn envelope_errors_extracts_messages() {
        let body = r#"{"success":false,"errors":[{"code":7003,"message":"Could not route to /zones/x"},{"message":"second"}]}"#;
        assert_eq!(
            envelope_errors(body),
            vec!["Could not route to /zones/x".to_string(), "second".to_string()]
        );
        assert!(envelope_errors("{}").is_empty());
    }

    #[test]
    fn recognized_errors_are_translated() {
        assert!(translate_api_error("Could not route to /zones/abc").contains("zone id"));
        assert!(
            translate_api_error("Unknown X-Auth-Key or X-Auth-Email").contains("API key")
        );
        assert_eq!(translate_api_error("some other problem"), "some other problem");
    }
}
