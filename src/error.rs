//! Error types for talking to the agent service.

use thiserror::Error;

/// How a single HTTP exchange with the agent service failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("could not reach agent service: {0}")]
    Connect(String),

    #[error("agent service timed out")]
    Timeout,

    #[error("agent service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unreadable response: {0}")]
    Decode(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let body = if body.trim().is_empty() {
            "no details".to_string()
        } else {
            body.trim().to_string()
        };
        Self::Status { status, body }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// Errors surfaced by the agent client, scoped to the call that failed.
///
/// `Clone` so results can travel inside [`crate::event::AppEvent`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Session creation failed; no session exists. Retry the upload.
    #[error("upload failed: {0}")]
    Upload(TransportError),

    /// An instruction was not applied; the session and its files are intact.
    #[error("instruction failed: {0}")]
    Chat(TransportError),

    #[error("download failed: {0}")]
    Download(TransportError),

    #[error("session cleanup failed: {0}")]
    Delete(TransportError),
}

#[cfg(test)]
mod tests {
    use super::{ApiError, TransportError};

    #[test]
    fn status_error_trims_body_and_fills_empty_details() {
        assert_eq!(
            TransportError::status(500, "  boom \n"),
            TransportError::Status {
                status: 500,
                body: "boom".to_string()
            }
        );
        assert_eq!(
            TransportError::status(404, "   ").to_string(),
            "agent service returned 404: no details"
        );
    }

    #[test]
    fn api_error_message_names_the_failed_operation() {
        let error = ApiError::Chat(TransportError::Timeout);
        assert_eq!(error.to_string(), "instruction failed: agent service timed out");
        assert_eq!(
            ApiError::Upload(TransportError::status(413, "too large")).to_string(),
            "upload failed: agent service returned 413: too large"
        );
    }
}
