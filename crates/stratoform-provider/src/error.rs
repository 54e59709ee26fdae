//! Provider error types

use stratoform_cloud::CloudError;
use stratoform_config::ConfigError;
use thiserror::Error;

/// Errors returned by resource callbacks and provider dispatch.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("invalid resource configuration: {0}")]
    Invalid(String),

    #[error("unknown {kind} type '{name}'")]
    UnknownType { kind: &'static str, name: String },

    #[error("provider is not configured; Configure must run first")]
    NotConfigured,
}

impl ProviderError {
    pub fn code(&self) -> &'static str {
        match self {
            ProviderError::Config(e) => e.code(),
            ProviderError::Cloud(e) => e.code(),
            ProviderError::Invalid(_) | ProviderError::UnknownType { .. } => "resource-invalid",
            ProviderError::NotConfigured => "config-invalid",
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        ProviderError::Invalid(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::Cloud(e) if e.is_not_found())
    }
}

impl From<stratoform_transport::TransportError> for ProviderError {
    fn from(error: stratoform_transport::TransportError) -> Self {
        ProviderError::Cloud(error.into())
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
