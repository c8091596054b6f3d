//! Concurrent HTTP fan-out engine.
//!
//! Shared primitive of the purge batcher and the preload throttler: given N
//! requests and a concurrency bound, run them in parallel, collect one
//! outcome per request, and return only once every request has finished.
//! There is no partial-result early return, no per-request retry, and no
//! cancellation; timeouts exist only at the individual-request level.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::http::{HttpClient, HttpResponse};

/// A single request to be issued by the fan-out engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutRequest {
    /// HTTP method, e.g. "GET", "POST", "HEAD".
    pub method: String,
    /// Absolute target URL.
    pub url: String,
    /// Headers as (name, value) pairs.
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl FanoutRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }

    pub fn head(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: "HEAD".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: Some(body.into()),
            timeout,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Outcome of one fanned-out request.
///
/// Exactly one of `status`/`error` is populated, except that a transport
/// error leaves `status` empty while an HTTP-level response always records
/// the status even when it is a failure code.
#[derive(Debug, Clone)]
pub struct FanoutResult {
    /// URL the request targeted.
    pub url: String,
    /// HTTP status code, when a response arrived.
    pub status: Option<u16>,
    /// Transport or task failure, when no response arrived.
    pub error: Option<String>,
}

impl FanoutResult {
    fn from_outcome(url: String, outcome: crate::error::Result<HttpResponse>) -> Self {
        match outcome {
            Ok(response) => Self {
                url,
                status: Some(response.status),
                error: None,
            },
            Err(error) => Self {
                url,
                status: None,
                error: Some(error.to_string()),
            },
        }
    }

    /// True when a response arrived with status in [200, 300).
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(s) if (200..300).contains(&s))
    }
}

/// Execute all `requests` concurrently, at most `concurrency` in flight at a
/// time (`None` = no bound), and block until every one has completed.
///
/// Returns exactly one result per request, in request order; completion order
/// is unconstrained. Individual failures are captured in the corresponding
/// [`FanoutResult`], never propagated, so sibling requests always run to
/// completion. All spawned tasks are joined before returning, which releases
/// every connection on every exit path.
pub async fn fanout<H>(
    client: &H,
    requests: Vec<FanoutRequest>,
    concurrency: Option<usize>,
) -> Vec<FanoutResult>
where
    H: HttpClient + 'static,
{
    let total = requests.len();
    if total == 0 {
        return Vec::new();
    }

    let semaphore = concurrency.map(|limit| Arc::new(Semaphore::new(limit.max(1))));

    let mut handles = Vec::with_capacity(total);
    for request in requests {
        let client = client.clone();
        let semaphore = semaphore.clone();
        let url = request.url.clone();
        let handle = tokio::spawn(async move {
            // The semaphore is never closed, so acquire only fails if the
            // runtime is tearing down; run unthrottled in that case.
            let _permit = match semaphore {
                Some(s) => s.acquire_owned().await.ok(),
                None => None,
            };
            let outcome = client.execute(&request).await;
            FanoutResult::from_outcome(request.url, outcome)
        });
        handles.push((url, handle));
    }

    let mut results = Vec::with_capacity(total);
    for (url, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(join_error) => {
                tracing::error!(url = %url, error = %join_error, "Fan-out task panicked");
                results.push(FanoutResult {
                    url,
                    status: None,
                    error: Some(format!("request task failed: {join_error}")),
                });
            }
        }
    }

    results
}
