//! Error types for the purge/preload dispatcher.

use thiserror::Error;

/// Result type alias using the edgesweep error type.
pub type Result<T> = std::result::Result<T, SweepError>;

/// Main error type for the dispatcher.
#[derive(Error, Debug)]
pub enum SweepError {
    /// CDN credentials are missing or incomplete. Every CDN call requires the
    /// account email, API key, and zone id to be non-empty.
    #[error("CDN credentials are missing or incomplete")]
    MissingCredentials,

    /// Network, TLS, or timeout failure on an individual HTTP call.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The CDN or origin responded, but with a non-success status or body.
    #[error("remote API error (status {status}): {message}")]
    RemoteApi { status: u16, message: String },

    /// A sitemap document could not be parsed or contained no URLs.
    #[error("sitemap error: {0}")]
    SitemapParse(String),

    /// The task queue rejected an enqueue.
    #[error("task queue unavailable: {0}")]
    QueueClosed(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SweepError {
    /// Short classification used in journal lines and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SweepError::MissingCredentials => "config",
            SweepError::Transport(_) => "transport",
            SweepError::RemoteApi { .. } => "remote_api",
            SweepError::SitemapParse(_) => "sitemap",
            SweepError::QueueClosed(_) => "queue",
            SweepError::Serialization(_) => "serialization",
            SweepError::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_api_error_includes_status_and_message() {
        let err = SweepError::RemoteApi {
            status: 403,
            message: "Unknown X-Auth-Key or X-Auth-Email".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("403"));
        assert!(text.contains("Unknown X-Auth-Key"));
        assert_eq!(err.kind(), "remote_api");
    }

    #[test]
    fn missing_credentials_is_config_kind() {
        assert_eq!(SweepError::MissingCredentials.kind(), "config");
    }
}
