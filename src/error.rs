use axum::response::IntoResponse;
use serde_json::json;

/// Errors raised while relaying a chat request to the upstream service.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream error: {status}")]
    Upstream { status: u16, body: String },
    #[error("Transport error: {0}")]
    Transport(String),
}

impl RelayError {
    /// HTTP status the relay answers with for this error.
    ///
    /// Upstream failures map to `502 Bad Gateway`; everything else is a
    /// generic `500`.
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        match self {
            RelayError::Upstream { .. } => http::StatusCode::BAD_GATEWAY,
            RelayError::InvalidRequest(_) | RelayError::Transport(_) => {
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// JSON payload sent to the client.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        match self {
            RelayError::Upstream { body, .. } => json!({
                "error": self.to_string(),
                "details": body,
            }),
            _ => json!({ "error": self.to_string() }),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), axum::Json(self.payload())).into_response()
    }
}

/// Errors surfaced by a chat session or the document client.
///
/// Only the upstream-unavailable family (`UpstreamStatus`, `MissingBody`,
/// `Transport`) ends an in-flight send. Undecodable frames never show up
/// here; the decoder absorbs them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("HTTP error! status: {status}")]
    UpstreamStatus { status: u16 },
    #[error("No response body")]
    MissingBody,
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("{0}")]
    Validation(String),
}

impl ChatError {
    /// Whether this error means the backend could not deliver an answer.
    #[must_use]
    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(
            self,
            ChatError::UpstreamStatus { .. } | ChatError::MissingBody | ChatError::Transport(_)
        )
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Transport(err.to_string())
    }
}
