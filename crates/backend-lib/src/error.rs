// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Reasons an inbound frame cannot be acted on.
///
/// These never close the socket; they are reported back as `error` frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed JSON: {0}")]
    InvalidJson(String),

    #[error("Message is missing a string `type` field")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid `{kind}` message: {reason}")]
    InvalidMessage { kind: String, reason: String },

    #[error("Invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("A room session is already active on this connection")]
    SessionActive,

    #[error("Message does not match the active room session")]
    SessionMismatch,

    #[error("Join code is unknown or has expired")]
    UnknownJoinCode,
}

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Failed to generate unique join code after {attempts} attempts")]
    CodeGenerationFailed { attempts: u32 },

    #[error("Room store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Room store call timed out after {0} ms")]
    StoreTimeout(u64),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Protocol(_) => StatusCode::BAD_REQUEST,
            AppError::StoreUnavailable(_) | AppError::StoreTimeout(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            },
            AppError::CodeGenerationFailed { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Protocol(ProtocolError::InvalidJson(_)) => "PROTO_001",
            AppError::Protocol(ProtocolError::MissingType) => "PROTO_002",
            AppError::Protocol(ProtocolError::UnknownType(_)) => "PROTO_003",
            AppError::Protocol(ProtocolError::InvalidMessage { .. }) => "PROTO_004",
            AppError::Protocol(ProtocolError::InvalidField { .. }) => "PROTO_005",
            AppError::Protocol(ProtocolError::SessionActive) => "PROTO_006",
            AppError::Protocol(ProtocolError::SessionMismatch) => "PROTO_007",
            AppError::Protocol(ProtocolError::UnknownJoinCode) => "ROOM_001",
            AppError::CodeGenerationFailed { .. } => "CODE_001",
            AppError::StoreUnavailable(_) => "STORE_001",
            AppError::StoreTimeout(_) => "STORE_002",
            AppError::TransportClosed => "WS_001",
            AppError::Config(_) => "CFG_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::Protocol(e) => e.to_string(),
            AppError::CodeGenerationFailed { .. } => {
                "Failed to generate unique join code".to_string()
            },
            AppError::StoreUnavailable(_) | AppError::StoreTimeout(_) => {
                "Room store unavailable, please try again later".to_string()
            },
            AppError::TransportClosed => "Connection closed".to_string(),
            AppError::Config(_) => "An internal server error occurred".to_string(),
        }
    }

    /// Whether the connection can keep serving after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AppError::TransportClosed)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for AppError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        AppError::TransportClosed
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

#[cfg(feature = "redis-store")]
impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        AppError::StoreUnavailable(err.to_string())
    }
}
