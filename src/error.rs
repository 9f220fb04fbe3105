use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ConnectionState;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorType {
    InvalidRequestError,
    RateLimitError,
    AuthenticationError,
    ServerError,
    #[serde(other)]
    Unknown,
}

/// Payload of an inbound `error` frame.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServerError {
    #[serde(rename = "type")]
    pub error_type: ApiErrorType,
    pub code: Option<String>,
    pub message: String,
    pub param: Option<String>,
    pub event_id: Option<String>,
}

impl ServerError {
    /// True for backend errors that indicate an audio command was sent in
    /// an invalid state, e.g. appended before the session was ready.
    #[must_use]
    pub fn is_audio_protocol_violation(&self) -> bool {
        self.error_type == ApiErrorType::InvalidRequestError
            && self.message.contains("input_audio_buffer")
    }
}

/// How a connection failure classifies for retry purposes.
///
/// The transport surfaces this structurally (from WebSocket close codes)
/// so retry decisions do not depend on parsing human-readable text; the
/// message is kept for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// The backend ran out of capacity (close codes 1006, 1011, 1013).
    ResourceExhausted,
    /// The backend is restarting (close code 1012).
    ServiceRestart,
    /// The peer closed the connection normally (close code 1000).
    ClosedNormally,
    /// The WebSocket handshake never completed.
    Handshake,
    Other,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("connection error: {message}")]
    Connection {
        kind: ConnectionErrorKind,
        message: String,
    },

    #[error("connection failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("not connected (state: {state:?})")]
    NotConnected { state: ConnectionState },

    #[error("Voice Live API error: {0:?}")]
    Api(ServerError),

    #[error("audio capture error: {0}")]
    AudioCapture(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to parse or serialize JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("the connection was closed unexpectedly")]
    ConnectionClosed,
}

impl Error {
    /// Whether this failure indicates backend resource exhaustion, the
    /// only class of connection failure worth retrying.
    ///
    /// Structured classification from the transport wins; for handshake
    /// failures, where only the backend's text is available, the message
    /// is scanned for the known exhaustion phrases.
    #[must_use]
    pub fn is_resource_exhausted(&self) -> bool {
        match self {
            Self::Connection { kind, message } => match kind {
                ConnectionErrorKind::ResourceExhausted => true,
                ConnectionErrorKind::Handshake | ConnectionErrorKind::Other => {
                    message_indicates_exhaustion(message)
                }
                ConnectionErrorKind::ServiceRestart | ConnectionErrorKind::ClosedNormally => false,
            },
            Self::WebSocket(err) => message_indicates_exhaustion(&err.to_string()),
            _ => false,
        }
    }
}

fn message_indicates_exhaustion(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["insufficient", "overloaded", "connection failed"]
        .iter()
        .any(|needle| message.contains(needle))
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_kind_beats_message_text() {
        let err = Error::Connection {
            kind: ConnectionErrorKind::ResourceExhausted,
            message: "Server error".to_string(),
        };
        assert!(err.is_resource_exhausted());

        let err = Error::Connection {
            kind: ConnectionErrorKind::ClosedNormally,
            message: "overloaded".to_string(),
        };
        assert!(!err.is_resource_exhausted());
    }

    #[test]
    fn handshake_errors_classify_by_message() {
        for message in ["Insufficient capacity", "backend OVERLOADED", "connection failed"] {
            let err = Error::Connection {
                kind: ConnectionErrorKind::Handshake,
                message: message.to_string(),
            };
            assert!(err.is_resource_exhausted(), "{message}");
        }

        let err = Error::Connection {
            kind: ConnectionErrorKind::Handshake,
            message: "invalid api key".to_string(),
        };
        assert!(!err.is_resource_exhausted());
    }

    #[test]
    fn audio_protocol_violation_requires_both_markers() {
        let violation = ServerError {
            error_type: ApiErrorType::InvalidRequestError,
            code: None,
            message: "Error committing input_audio_buffer: buffer too small".to_string(),
            param: None,
            event_id: None,
        };
        assert!(violation.is_audio_protocol_violation());

        let wrong_type = ServerError {
            error_type: ApiErrorType::ServerError,
            ..violation.clone()
        };
        assert!(!wrong_type.is_audio_protocol_violation());

        let wrong_message = ServerError {
            message: "rate limit reached".to_string(),
            ..violation
        };
        assert!(!wrong_message.is_audio_protocol_violation());
    }
}
