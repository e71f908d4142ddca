//! Error taxonomy for upstream OKX calls.
//!
//! Retry classification lives here so the queue never has to guess whether a
//! failure carries an HTTP status.

use thiserror::Error;

/// Failure of a single upstream call, or of the queue delivering its outcome.
#[derive(Debug, Error)]
pub enum OkxError {
    /// Upstream answered with a non-2xx status
    #[error("OKX API Error: {status} {reason}")]
    HttpStatus { status: u16, reason: String },

    /// DNS, connect, reset or body read failure
    #[error("Failed to reach OKX API: {0}")]
    Network(#[source] reqwest::Error),

    /// 2xx response whose body was not the expected JSON
    #[error("Malformed OKX response: {0}")]
    Parse(String),

    /// Outgoing request body could not be encoded
    #[error("Failed to serialize request body: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The queue released the caller without an outcome (task panicked or
    /// the runtime shut down while it was waiting)
    #[error("Request queue dropped the task before it completed")]
    QueueDropped,
}

impl OkxError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            OkxError::HttpStatus { status, .. } => Some(*status),
            OkxError::Network(_)
            | OkxError::Parse(_)
            | OkxError::Serialization(_)
            | OkxError::QueueDropped => None,
        }
    }

    /// Rate limiting (429) and server errors (>= 500) are transient; every
    /// other failure is terminal on first sight.
    pub fn is_retryable(&self) -> bool {
        matches!(self.status(), Some(status) if status == 429 || status >= 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(status: u16) -> OkxError {
        OkxError::HttpStatus { status, reason: String::new() }
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(status_error(429).is_retryable());
        assert!(status_error(500).is_retryable());
        assert!(status_error(503).is_retryable());
        assert!(status_error(599).is_retryable());
    }

    #[test]
    fn test_terminal_statuses() {
        for status in [400, 401, 403, 404, 418, 499] {
            assert!(!status_error(status).is_retryable(), "{status} must not retry");
        }
    }

    #[test]
    fn test_statusless_errors_are_terminal() {
        assert!(!OkxError::Parse("eof".into()).is_retryable());
        assert!(!OkxError::QueueDropped.is_retryable());
        assert_eq!(OkxError::QueueDropped.status(), None);
    }

    #[test]
    fn test_message_embeds_status_and_reason() {
        let err = OkxError::HttpStatus { status: 429, reason: "Too Many Requests".into() };
        assert_eq!(err.to_string(), "OKX API Error: 429 Too Many Requests");
    }
}
