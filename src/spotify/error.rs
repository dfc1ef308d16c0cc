use thiserror::Error;

/// Failure of the underlying HTTP exchange (connect, timeout, body read).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("transient network failure after {attempts} attempts: {message}")]
    TransientNetwork { attempts: u32, message: String },

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("malformed page from {url}: {reason}")]
    PartialPage { url: String, reason: String },

    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ExtractError {
    /// Authentication failures abort the whole invocation, not just one resource.
    pub fn is_fatal_for_invocation(&self) -> bool {
        matches!(self, ExtractError::Authentication(_))
    }
}
