//! Error classification for query dispatch.
//!
//! Every way a query can fail collapses into [`QueryError`]. Its `Display` text
//! is what the reader sees in the conversation, and [`QueryError::is_retryable`]
//! decides whether the dispatcher tries again.

use serde::Deserialize;

use crate::state::QueryResponse;

pub const GENERIC_BAD_REQUEST: &str = "Invalid query format";
pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred. Please try again.";
pub const CANCELLED_MESSAGE: &str = "Request cancelled";

/// Failures of a single dispatch, after classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Server error: The server encountered an error. Please try again.")]
    ServerError,
    #[error("Timeout: The server is taking too long to respond. Please try again.")]
    Timeout,
    #[error("Connection failed: Unable to connect to the chatbot server. Please check your internet connection.")]
    ConnectionFailed,
    #[error("Parse error: Received malformed response from server. Please try again.")]
    ParseError,
    #[error("HTTP {0}: Request failed")]
    HttpError(u16),
    #[error("{0}")]
    Unexpected(String),
}

impl QueryError {
    pub fn unexpected() -> Self {
        QueryError::Unexpected(UNEXPECTED_MESSAGE.to_string())
    }

    /// Transient failures are worth one more attempt; a malformed query or
    /// reply will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            QueryError::Timeout
            | QueryError::ServerError
            | QueryError::ConnectionFailed
            | QueryError::HttpError(_) => true,
            QueryError::BadRequest(_) | QueryError::ParseError | QueryError::Unexpected(_) => false,
        }
    }

    /// Short stable name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::BadRequest(_) => "bad_request",
            QueryError::ServerError => "server_error",
            QueryError::Timeout => "timeout",
            QueryError::ConnectionFailed => "connection_failed",
            QueryError::ParseError => "parse_error",
            QueryError::HttpError(_) => "http_error",
            QueryError::Unexpected(_) => "unexpected",
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

/// Classify a non-success status. 400 bodies may explain what was wrong.
pub fn classify_status(status: u16, body: &str) -> QueryError {
    match status {
        400 => {
            let detail = serde_json::from_str::<ErrorBody>(body)
                .ok()
                .and_then(|b| b.detail)
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| GENERIC_BAD_REQUEST.to_string());
            QueryError::BadRequest(detail)
        }
        500 => QueryError::ServerError,
        other => QueryError::HttpError(other),
    }
}

/// Turn a raw `/query` reply into a response or a classified failure.
pub fn decode_reply(status: u16, body: &str) -> Result<QueryResponse, QueryError> {
    if !(200..300).contains(&status) {
        return Err(classify_status(status, body));
    }
    serde_json::from_str(body).map_err(|e| {
        tracing::debug!(error = %e, "reply body is not a valid query response");
        QueryError::ParseError
    })
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            QueryError::Timeout
        } else if err.is_connect() || err.is_request() || err.is_body() {
            QueryError::ConnectionFailed
        } else if err.is_decode() {
            QueryError::ParseError
        } else if let Some(status) = err.status() {
            classify_status(status.as_u16(), "")
        } else {
            QueryError::Unexpected(err.to_string())
        }
    }
}
