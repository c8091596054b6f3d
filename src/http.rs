//! HTTP client abstraction for purge and preload calls.
//!
//! The `HttpClient` trait abstracts request execution so the batcher and
//! throttler can be driven against a mock in tests without real network I/O.

use async_trait::async_trait;

use crate::error::Result;
use crate::fanout::FanoutRequest;

/// Response from an HTTP request. Bodies are buffered; purge responses are
/// tiny JSON envelopes and preload bodies are discarded after the status is
/// inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as a string
    pub body: String,
}

impl HttpResponse {
    /// Status in [200, 300).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for executing HTTP requests.
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// Execute a single request to completion.
    ///
    /// # Errors
    /// Returns an error on network failure, timeout, or an unbuildable
    /// request. A response with a non-success status is still `Ok`; status
    /// policy belongs to the caller.
    async fn execute(&self, request: &FanoutRequest) -> Result<HttpResponse>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    verify_tls: bool,
}

impl ReqwestHttpClient {
    /// Create a client that validates TLS certificates.
    pub fn new() -> Result<Self> {
        Self::with_tls_verification(true)
    }

    /// Create the client for a configuration, honoring its `verify_tls`
    /// flag.
    pub fn from_config(config: &crate::config::SweepConfig) -> Result<Self> {
        Self::with_tls_verification(config.verify_tls)
    }

    /// Create a client with TLS certificate validation explicitly on or off.
    ///
    /// Turning validation off is only intended for preload traffic against a
    /// same-origin server with an internal certificate.
    pub fn with_tls_verification(verify_tls: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(crate::error::SweepError::Transport)?;
        Ok(Self { client, verify_tls })
    }

    /// Whether this client validates TLS certificates.
    pub fn verifies_tls(&self) -> bool {
        self.verify_tls
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn execute(&self, request: &FanoutRequest) -> Result<HttpResponse> {
        let method: reqwest::Method = request.method.parse().map_err(|e| {
            tracing::error!(method = %request.method, error = %e, "Invalid HTTP method");
            anyhow::anyhow!("invalid HTTP method '{}': {}", request.method, e)
        })?;

        let mut req = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            req = req.header(name, value);
        }

        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        let response = req.send().await.map_err(|e| {
            tracing::debug!(url = %request.url, error = %e, "HTTP request failed");
            e
        })?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::trace!(url = %request.url, status, response_len = body.len(), "HTTP request completed");

        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Mock HTTP client for testing.
///
/// Allows configuring predetermined responses for specific requests without
/// making actual HTTP calls. Responses are keyed as `"METHOD url"` and
/// returned in FIFO order when several are registered for the same key.
#[derive(Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<MockResponse>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
}

/// A mock response that can optionally wait for a trigger before completing.
enum MockResponse {
    Immediate(Result<HttpResponse>),
    Triggered {
        response: Result<HttpResponse>,
        trigger: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
    },
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl MockCall {
    /// Header value by case-insensitive name, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(method: &str, url: &str) -> String {
        format!("{} {}", method, url)
    }

    /// Add a predetermined response for a method and URL.
    pub fn add_response(&self, method: &str, url: &str, response: Result<HttpResponse>) {
        self.responses
            .lock()
            .entry(Self::key(method, url))
            .or_default()
            .push(MockResponse::Immediate(response));
    }

    /// Shorthand for a plain-status response.
    pub fn add_status(&self, method: &str, url: &str, status: u16) {
        self.add_response(
            method,
            url,
            Ok(HttpResponse {
                status,
                body: String::new(),
            }),
        );
    }

    /// Add a response that waits for a manual trigger before completing.
    ///
    /// Returns a sender; sending `()` (or dropping it) releases the request.
    /// Useful for asserting how many requests are in flight at once.
    pub fn add_response_with_trigger(
        &self,
        method: &str,
        url: &str,
        response: Result<HttpResponse>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.responses
            .lock()
            .entry(Self::key(method, url))
            .or_default()
            .push(MockResponse::Triggered {
                response,
                trigger: Arc::new(Mutex::new(Some(rx))),
            });
        tx
    }

    /// All calls made to this mock client, in invocation order.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Calls filtered to a method, preserving order.
    pub fn calls_for_method(&self, method: &str) -> Vec<MockCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Number of requests currently executing. Peaks at the fan-out's
    /// concurrency degree.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: &FanoutRequest) -> Result<HttpResponse> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.clone();
        let _guard = InFlightGuard { in_flight };

        self.calls.lock().push(MockCall {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        });

        let mock_response = {
            let mut responses = self.responses.lock();
            responses
                .get_mut(&Self::key(&request.method, &request.url))
                .and_then(|queue| {
                    if queue.is_empty() {
                        None
                    } else {
                        Some(queue.remove(0))
                    }
                })
        };

        match mock_response {
            Some(MockResponse::Immediate(response)) => response,
            Some(MockResponse::Triggered { response, trigger }) => {
                let rx = trigger.lock().take();
                if let Some(rx) = rx {
                    // Proceed whether the trigger fires or is dropped.
                    let _ = rx.await;
                }
                response
            }
            None => Err(crate::error::SweepError::Other(anyhow::anyhow!(
                "no mock response configured for {} {}",
                request.method,
                request.url
            ))),
        }
    }
}

/// Guard that decrements the in-flight counter when dropped, even if the
/// task is cancelled or panics.
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
