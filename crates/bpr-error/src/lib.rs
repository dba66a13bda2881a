use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

#[cfg(feature = "axum")]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};

/// Unified error type for the report service
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BprError {
    // === business errors ===
    #[error("resource not found: {resource}")]
    NotFound { resource: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("validation failed: {message}")]
    Validation { message: String },

    // === technical errors ===
    #[error("extraction failed for {source_name}")]
    Extraction { source_name: String, message: String },

    #[error("LLM service error ({provider})")]
    LlmService {
        provider: String,
        message: String,
        #[serde(skip)]
        retry_after: Option<std::time::Duration>,
    },

    #[error("export failed during {stage}")]
    Export { stage: String, message: String },

    #[error("network error: {operation}")]
    Network { operation: String, message: String },

    #[error("timeout: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    // === system errors ===
    #[error("internal error: {message}")]
    Internal {
        message: String,
        details: Option<String>,
    },

    #[error("configuration error: {key} - {reason}")]
    Configuration { key: String, reason: String },

    #[error("serialization error: {format}")]
    Serialization { format: String, message: String },

    #[error("concurrency error: {operation}")]
    Concurrency { operation: String, message: String },
}

/// Error severity level
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Low,      // expected business errors
    Medium,   // technical errors that degrade a single action
    High,     // errors that break a core operation
    Critical, // system-level errors
}

impl BprError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            BprError::NotFound { .. }
            | BprError::InvalidRequest { .. }
            | BprError::Validation { .. } => ErrorSeverity::Low,
            BprError::Extraction { .. }
            | BprError::LlmService { .. }
            | BprError::Export { .. }
            | BprError::Network { .. }
            | BprError::Timeout { .. } => ErrorSeverity::Medium,
            BprError::Serialization { .. } | BprError::Concurrency { .. } => ErrorSeverity::High,
            BprError::Internal { .. } | BprError::Configuration { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn to_http_status(&self) -> u16 {
        match self {
            BprError::NotFound { .. } => 404,
            BprError::InvalidRequest { .. } => 400,
            BprError::Validation { .. } => 400,
            BprError::Timeout { .. } => 408,
            BprError::LlmService { .. } | BprError::Network { .. } => 502,
            _ => 500,
        }
    }

    /// User-facing message. Validation errors surface their exact warning
    /// text; everything else gets a generic phrasing.
    pub fn user_message(&self) -> String {
        match self {
            BprError::Validation { message } => message.clone(),
            BprError::NotFound { resource } => format!("{} does not exist", resource),
            BprError::InvalidRequest { .. } => "request parameters are invalid".to_string(),
            BprError::Extraction { source_name, .. } => {
                format!("could not read the contents of {}", source_name)
            }
            BprError::LlmService { message, .. } => {
                format!("LLM streaming failed: {}", message)
            }
            BprError::Export { .. } => "report export failed".to_string(),
            BprError::Network { .. } | BprError::Timeout { .. } => {
                "the backend could not be reached".to_string()
            }
            _ => "internal error".to_string(),
        }
    }

    /// Log at a level matching the error's severity.
    pub fn log(&self, component: &str) {
        match self.severity() {
            ErrorSeverity::Low | ErrorSeverity::Medium => {
                warn!(component, error = %self, "operation degraded");
            }
            ErrorSeverity::High | ErrorSeverity::Critical => {
                error!(component, error = %self, severity = ?self.severity(), "operation failed");
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, BprError>;

// === conversions ===

impl From<serde_json::Error> for BprError {
    fn from(err: serde_json::Error) -> Self {
        BprError::Serialization {
            format: "json".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for BprError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BprError::Timeout {
                operation: "http_request".to_string(),
                timeout_ms: 30000,
            }
        } else if err.is_connect() {
            BprError::Network {
                operation: "connect".to_string(),
                message: err.to_string(),
            }
        } else {
            BprError::Network {
                operation: "http_request".to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl From<std::io::Error> for BprError {
    fn from(err: std::io::Error) -> Self {
        BprError::Internal {
            message: "io error".to_string(),
            details: Some(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for BprError {
    fn from(err: tokio::task::JoinError) -> Self {
        BprError::Concurrency {
            operation: "task_join".to_string(),
            message: err.to_string(),
        }
    }
}

// Axum integration
#[cfg(feature = "axum")]
impl IntoResponse for BprError {
    fn into_response(self) -> axum::response::Response {
        let status_code = StatusCode::from_u16(self.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = serde_json::json!({
            "error": self.to_string(),
            "message": self.user_message()
        });

        (status_code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_keeps_exact_warning_text() {
        let err = BprError::Validation {
            message: "Please upload at least one file.".to_string(),
        };
        assert_eq!(err.user_message(), "Please upload at least one file.");
        assert_eq!(err.to_http_status(), 400);
    }

    #[test]
    fn json_errors_map_to_serialization() {
        let err: BprError = serde_json::from_str::<serde_json::Value>("not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, BprError::Serialization { .. }));
        assert_eq!(err.to_http_status(), 500);
    }
}
