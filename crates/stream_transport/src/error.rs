use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(String),

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("stream read failed: {0}")]
    Read(String),

    #[error("stream was aborted")]
    Aborted,
}

impl TransportError {
    /// Returns true for user-initiated aborts, which are not surfaced as errors.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

pub fn status_message(status: StatusCode, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string();
    }

    let parsed = serde_json::from_str::<serde_json::Value>(trimmed).ok();
    let message = parsed.as_ref().and_then(|value| {
        value
            .get("error")
            .and_then(|error| error.get("message").or(Some(error)))
            .and_then(|message| message.as_str())
            .or_else(|| value.get("message").and_then(|message| message.as_str()))
    });

    match message {
        Some(message) if !message.trim().is_empty() => message.trim().to_string(),
        _ => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::{status_message, TransportError};

    #[test]
    fn status_message_prefers_structured_error_message() {
        let body = r#"{"error":{"message":"quota exceeded"}}"#;
        assert_eq!(status_message(StatusCode::TOO_MANY_REQUESTS, body), "quota exceeded");
    }

    #[test]
    fn status_message_accepts_plain_error_string() {
        let body = r#"{"error":"bad input"}"#;
        assert_eq!(status_message(StatusCode::BAD_REQUEST, body), "bad input");
    }

    #[test]
    fn status_message_falls_back_to_reason_or_body() {
        assert_eq!(
            status_message(StatusCode::BAD_GATEWAY, "  "),
            "Bad Gateway"
        );
        assert_eq!(status_message(StatusCode::BAD_GATEWAY, "upstream down"), "upstream down");
    }

    #[test]
    fn only_aborts_report_is_abort() {
        assert!(TransportError::Aborted.is_abort());
        assert!(!TransportError::Read("reset".to_string()).is_abort());
    }
}
