use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request for prefix {prefix} timed out after {timeout:?}")]
    Timeout { prefix: String, timeout: Duration },

    #[error("rate limited by remote service for prefix {prefix}")]
    Throttled { prefix: String },

    #[error("HTTP {status} for prefix {prefix}")]
    HttpStatus { prefix: String, status: u16 },

    #[error("HTTP request failed for prefix {prefix}: {source}")]
    HttpRequest {
        prefix: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("lookup failed after {retries} retries for prefix {prefix}")]
    MaxRetriesExceeded { prefix: String, retries: u32 },
}

impl Error {
    /// Whether the pacer should back off and retry this attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Throttled { .. })
    }
}
