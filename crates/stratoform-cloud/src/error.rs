//! Cloud error types

use std::time::Duration;
use stratoform_config::ConfigError;
use stratoform_transport::TransportError;
use thiserror::Error;

/// Errors raised while talking to the cloud.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error(transparent)]
    Transport(TransportError),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("timeout while waiting for {what} after {timeout:?} (last state: {last_state})")]
    WaitTimeout {
        what: String,
        timeout: Duration,
        last_state: String,
    },

    #[error("unexpected state '{state}', wanted target '{}'", expected.join(", "))]
    UnexpectedState { state: String, expected: Vec<String> },

    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("no {service} endpoint for region '{region}' ({availability})")]
    EndpointNotFound {
        service: String,
        region: String,
        availability: String,
    },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<TransportError> for CloudError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Cancelled => CloudError::Cancelled,
            TransportError::Status {
                status: 404,
                message,
                url,
                ..
            } => CloudError::NotFound(format!("{url}: {message}")),
            other => CloudError::Transport(other),
        }
    }
}

impl CloudError {
    /// Short, stable identifier reported alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            CloudError::Config(e) => e.code(),
            CloudError::AuthFailed(_) => "auth-failed",
            CloudError::Transport(e) => e.code(),
            CloudError::NotFound(_) => "not-found",
            CloudError::WaitTimeout { .. } => "wait-timeout",
            CloudError::UnexpectedState { .. } => "unexpected-state",
            CloudError::JobFailed { .. } | CloudError::InvalidResponse(_) => "transport-fatal",
            CloudError::EndpointNotFound { .. } => "config-invalid",
            CloudError::Cancelled => "cancelled",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CloudError::Transport(e) => e.status(),
            CloudError::NotFound(_) => Some(404),
            _ => None,
        }
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        CloudError::InvalidResponse(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> TransportError {
        TransportError::Status {
            status,
            method: "GET".to_string(),
            url: "https://evs.example.com/v2/p/volumes/v".to_string(),
            code: None,
            message: "gone".to_string(),
            body: String::new(),
        }
    }

    #[test]
    fn test_404_becomes_not_found() {
        let err = CloudError::from(status(404));
        assert!(err.is_not_found());
        assert_eq!(err.code(), "not-found");
    }

    #[test]
    fn test_other_status_is_fatal() {
        let err = CloudError::from(status(409));
        assert_eq!(err.code(), "transport-fatal");
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn test_cancel_maps_through() {
        let err = CloudError::from(TransportError::Cancelled);
        assert_eq!(err.code(), "cancelled");
    }
}
