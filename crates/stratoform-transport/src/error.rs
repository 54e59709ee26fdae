//! Transport error types

use thiserror::Error;

/// Errors surfaced by the HTTP pipeline.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("{method} {url} returned HTTP {status}: {message}")]
    Status {
        status: u16,
        method: String,
        url: String,
        code: Option<String>,
        message: String,
        body: String,
    },

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<TransportError>,
    },

    #[error("too many redirects starting at {0}")]
    TooManyRedirects(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl TransportError {
    /// Short, stable identifier reported alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::Tls(_) => "config-invalid",
            TransportError::Network { .. } | TransportError::Exhausted { .. } => {
                "transport-retryable"
            }
            TransportError::Status { status: 404, .. } => "not-found",
            TransportError::Status { .. }
            | TransportError::InvalidRequest(_)
            | TransportError::TooManyRedirects(_) => "transport-fatal",
            TransportError::Cancelled => "cancelled",
        }
    }

    /// HTTP status of the final response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::Status { status: 404, .. })
    }

    /// Server-supplied error code such as `Ecs.0114`, when the body had one.
    pub fn service_code(&self) -> Option<&str> {
        match self {
            TransportError::Status { code, .. } => code.as_deref(),
            TransportError::Exhausted { last, .. } => last.service_code(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
