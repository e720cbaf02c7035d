use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Notification error: {0}")]
    NotificationError(#[from] NotificationError),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] WebSocketError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

// Implement conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

// Add conversion from std::io::Error
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

// Implement actix_web::ResponseError for AppError
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = self.to_string();
        let response = json!({
            "error": {
                "status": status.as_u16(),
                "message": message
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotificationError(e) => match e {
                NotificationError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                NotificationError::ClosedConnection => StatusCode::GONE,
                NotificationError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
                NotificationError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum NotificationError {
    /// Registration or write attempted on a transport whose write queue is
    /// already closed.
    #[error("Connection already closed")]
    ClosedConnection,

    /// The serialized envelope exceeds the configured payload limit. Raised
    /// before any socket write is attempted.
    #[error("Payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Error, Debug)]
pub enum WebSocketError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Message sending failed: {0}")]
    SendError(String),

    #[error("Invalid message format: {0}")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_conversion() {
        // Test IO error conversion
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::InternalError(_)));

        // Test config error conversion
        let config_err = config::ConfigError::NotFound(String::from("key not found"));
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));

        // Test notification error conversion
        let notif_err = NotificationError::ClosedConnection;
        let app_err: AppError = notif_err.into();
        assert!(matches!(app_err, AppError::NotificationError(_)));
    }

    #[test]
    fn test_error_status_codes() {
        let err = AppError::NotificationError(NotificationError::PayloadTooLarge {
            size: 2048,
            limit: 1024,
        });
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let err = AppError::NotificationError(NotificationError::ClosedConnection);
        assert_eq!(err.status_code(), StatusCode::GONE);

        let err = AppError::NotificationError(NotificationError::ShuttingDown);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err = AppError::ValidationError("invalid input".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_display() {
        let err = AppError::ValidationError("test error".to_string());
        assert_eq!(err.to_string(), "Validation error: test error");

        let err = AppError::NotificationError(NotificationError::PayloadTooLarge {
            size: 200,
            limit: 100,
        });
        assert_eq!(
            err.to_string(),
            "Notification error: Payload of 200 bytes exceeds limit of 100 bytes"
        );

        let err = AppError::NotificationError(NotificationError::ClosedConnection);
        assert_eq!(err.to_string(), "Notification error: Connection already closed");

        let err = WebSocketError::InvalidFormat("bad json".to_string());
        assert_eq!(err.to_string(), "Invalid message format: bad json");
    }
}
