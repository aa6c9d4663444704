use thiserror::Error;

/// Error taxonomy for backend calls.
///
/// `Network` covers transport failures (connectivity, timeout) and is the
/// only retryable kind; everything else reflects an answer the backend
/// actually gave. No retries happen inside the client itself.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("backend returned HTTP {status}")]
    Http { status: u16 },

    #[error("not found")]
    NotFound,

    #[error("not authenticated")]
    Unauthenticated,

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// True for transport-level failures that a caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}
