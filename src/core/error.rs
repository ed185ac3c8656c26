//! Typed error handling for the GraphQL execution layer
//!
//! The layer distinguishes two failure families:
//!
//! - [`RequestError`]: the transport request could not be turned into a
//!   GraphQL request (bad JSON, unsupported content type, ...). These are
//!   client errors and propagate out of the parser as `Err`.
//! - [`ExecutionError`]: something went wrong at or after the executor
//!   boundary. These never propagate out of the request handler; they are
//!   converted into an error-carrying `GraphQLResponse` instead, so they are
//!   not part of [`ServerError`].
//!
//! [`ConfigError`] covers loading the server configuration.
//!
//! # Example
//!
//! ```rust,ignore
//! match server.execute(&request).await {
//!     Ok(Some(response)) => Json(response).into_response(),
//!     Ok(None) => StatusCode::BAD_REQUEST.into_response(),
//!     Err(ServerError::Request(RequestError::InvalidJson { parameter, .. })) => {
//!         eprintln!("bad `{}` parameter", parameter);
//!         StatusCode::BAD_REQUEST.into_response()
//!     }
//!     Err(e) => e.into_response(),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// The main error type for the GraphQL execution layer
#[derive(Debug)]
pub enum ServerError {
    /// The transport request could not be parsed
    Request(RequestError),

    /// Configuration errors
    Config(ConfigError),

    /// Internal errors (should not happen in normal operation)
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Request(e) => write!(f, "{}", e),
            ServerError::Config(e) => write!(f, "{}", e),
            ServerError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Request(e) => Some(e),
            ServerError::Config(e) => Some(e),
            ServerError::Internal(_) => None,
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServerError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Request(e) => e.status_code(),
            ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            ServerError::Request(e) => e.error_code(),
            ServerError::Config(_) => "CONFIG_ERROR",
            ServerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ServerError::Request(RequestError::InvalidJson { parameter, .. }) => {
                Some(serde_json::json!({ "parameter": parameter }))
            }
            ServerError::Request(RequestError::UnsupportedContentType { content_type }) => {
                Some(serde_json::json!({ "content_type": content_type }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Request Errors
// =============================================================================

/// Errors raised while decoding a transport request into a GraphQL request
#[derive(Debug)]
pub enum RequestError {
    /// A JSON-encoded query-string parameter (`variables`, `extensions`) is malformed
    InvalidJson { parameter: String, message: String },

    /// The request body could not be read or decoded
    InvalidBody { message: String },

    /// POST with a content type that is neither JSON nor GraphQL
    UnsupportedContentType { content_type: String },

    /// A batch was submitted while batching is disabled
    BatchingDisabled,
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::InvalidJson { parameter, message } => {
                write!(f, "Invalid JSON in '{}' parameter: {}", parameter, message)
            }
            RequestError::InvalidBody { message } => {
                write!(f, "Invalid request body: {}", message)
            }
            RequestError::UnsupportedContentType { content_type } => {
                write!(
                    f,
                    "Content-Type is not specified or not supported: '{}'",
                    content_type
                )
            }
            RequestError::BatchingDisabled => {
                write!(f, "Batched GraphQL requests are disabled")
            }
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RequestError::InvalidJson { .. } => StatusCode::BAD_REQUEST,
            RequestError::InvalidBody { .. } => StatusCode::BAD_REQUEST,
            RequestError::UnsupportedContentType { .. } => StatusCode::BAD_REQUEST,
            RequestError::BatchingDisabled => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            RequestError::InvalidJson { .. } => "INVALID_JSON",
            RequestError::InvalidBody { .. } => "INVALID_BODY",
            RequestError::UnsupportedContentType { .. } => "UNSUPPORTED_CONTENT_TYPE",
            RequestError::BatchingDisabled => "BATCHING_DISABLED",
        }
    }
}

impl From<RequestError> for ServerError {
    fn from(err: RequestError) -> Self {
        ServerError::Request(err)
    }
}

// =============================================================================
// Execution Errors
// =============================================================================

/// Failures at or after the executor boundary
///
/// These are never returned to callers of the request handler. They carry a
/// classification that ends up in the `extensions` of the synthesized
/// GraphQL error entry.
#[derive(Debug)]
pub enum ExecutionError {
    /// The executor returned an error for the operation
    Aborted { message: String },

    /// The executor panicked while running the operation
    Panicked { message: String },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::Aborted { message } => write!(f, "{}", message),
            ExecutionError::Panicked { message } => {
                write!(f, "Operation execution panicked: {}", message)
            }
        }
    }
}

impl std::error::Error for ExecutionError {}

impl ExecutionError {
    /// Classification reported to GraphQL clients
    pub fn classification(&self) -> &'static str {
        match self {
            ExecutionError::Aborted { .. } => "ExecutionAborted",
            ExecutionError::Panicked { .. } => "InternalError",
        }
    }

    /// Build from an executor error, keeping the full context chain
    pub fn aborted(err: &anyhow::Error) -> Self {
        ExecutionError::Aborted {
            message: format!("{:#}", err),
        }
    }

    /// Build from a caught panic payload
    pub fn panicked(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        ExecutionError::Panicked { message }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to parse configuration
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// Invalid value in configuration
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// IO error while reading configuration
    IoError { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ParseError { file, message } => {
                if let Some(file) = file {
                    write!(f, "Failed to parse config file '{}': {}", file, message)
                } else {
                    write!(f, "Failed to parse config: {}", message)
                }
            }
            ConfigError::InvalidValue {
                field,
                value,
                message,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, message
                )
            }
            ConfigError::IoError { message } => {
                write!(f, "IO error: {}", message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        ServerError::Config(err)
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ServerError>() {
            Ok(server_err) => server_err,
            Err(err) => ServerError::Internal(err.to_string()),
        }
    }
}

/// A specialized Result type for the execution layer
pub type ServerResult<T> = Result<T, ServerError>;
