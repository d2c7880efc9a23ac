//! Error types for CouchDB client operations.
//!
//! CouchDB reports failures in two places: the HTTP status line and a JSON
//! body of the form `{"error": "...", "reason": "..."}`. [`CouchError`] folds
//! both into one taxonomy so callers can match on what went wrong instead of
//! inspecting raw responses.
//!
//! # Examples
//!
//! ```
//! use couchdb_http::CouchError;
//!
//! let err = CouchError::NotFound("missing".to_string());
//! assert!(err.is_api_error());
//! assert!(!err.is_retryable());
//! ```

use crate::client::is_retryable_status;
use thiserror::Error;

/// Result type for CouchDB operations.
pub type Result<T> = std::result::Result<T, CouchError>;

/// Errors raised while talking to a CouchDB server.
#[derive(Error, Debug)]
pub enum CouchError {
    /// Document update conflict, or the resource already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database, document, view or attachment does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The server rejected the request as malformed.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Any other error status returned by the server.
    #[error("CouchDB error (status {status}): {body}")]
    Generic {
        /// HTTP status code
        status: u16,
        /// Response body as returned by the server
        body: serde_json::Value,
    },

    /// Cookie session login was refused.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// The server answered with something this client cannot interpret.
    #[error("Unexpected response: {0}")]
    Unexpected(String),

    /// The caller passed an argument that cannot be turned into a request.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// URL could not be parsed or joined.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Failed to encode or decode JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for CouchError {
    fn from(err: reqwest::Error) -> Self {
        CouchError::Http(err.to_string())
    }
}

impl CouchError {
    /// Whether a retry of the same request may succeed.
    ///
    /// Transport failures and transient statuses (408, 429, 503, ...) qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            CouchError::Http(_) => true,
            CouchError::Generic { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// Whether the error came from a CouchDB answer rather than the client.
    pub fn is_api_error(&self) -> bool {
        matches!(
            self,
            CouchError::Conflict(_)
                | CouchError::NotFound(_)
                | CouchError::BadRequest(_)
                | CouchError::Generic { .. }
                | CouchError::AuthenticationFailed
        )
    }

    /// Whether this is a [`CouchError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, CouchError::NotFound(_))
    }

    /// Whether this is a [`CouchError::Conflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, CouchError::Conflict(_))
    }
}
