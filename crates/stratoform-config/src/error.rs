//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while assembling the provider configuration.
///
/// All of these surface before any network activity.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(
        "no usable credentials: set `token`, both `access_key` and `secret_key`, \
         or `password` together with `user_name` or `user_id`"
    )]
    NoCredentials,

    #[error("cloud catalogue {} is unreadable: {reason}", path.display())]
    CatalogueUnreadable { path: PathBuf, reason: String },

    #[error("no cloud catalogue found (searched: {searched})")]
    CatalogueNotFound { searched: String },

    #[error("cloud '{0}' is not defined in the cloud catalogue")]
    CloudEntryMissing(String),
}

impl ConfigError {
    /// Short, stable identifier reported alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "config-invalid",
            ConfigError::NoCredentials => "no-credentials",
            ConfigError::CatalogueUnreadable { .. } | ConfigError::CatalogueNotFound { .. } => {
                "cloud-catalogue-unreadable"
            }
            ConfigError::CloudEntryMissing(_) => "cloud-entry-missing",
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
