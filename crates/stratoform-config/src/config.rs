//! Validated provider configuration
//!
//! [`Config::load`] merges the three configuration sources in priority order:
//!
//! 1. options supplied by the host engine
//! 2. environment variables (see [`crate::env`])
//! 3. the named entry of the cloud catalogue, when `cloud` is set
//!
//! Each later source only fills fields the earlier ones left empty. The
//! resulting record is validated once and then shared read-only.

use crate::catalogue::Catalogue;
use crate::error::{ConfigError, Result};
use crate::options::{ProviderOptions, mask};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Which endpoint variant of a service to call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointType {
    #[default]
    Public,
    Internal,
    Admin,
}

impl EndpointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointType::Public => "public",
            EndpointType::Internal => "internal",
            EndpointType::Admin => "admin",
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "public" | "publicURL" => Ok(EndpointType::Public),
            "internal" | "internalURL" => Ok(EndpointType::Internal),
            "admin" | "adminURL" => Ok(EndpointType::Admin),
            other => Err(ConfigError::invalid(format!(
                "endpoint_type must be one of public, internal, admin; got {other:?}"
            ))),
        }
    }
}

/// Credential mode selected for this configuration, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Token,
    AkSk,
    Password,
}

/// The canonical provider settings.
#[derive(Clone, Default, PartialEq, Serialize)]
pub struct Config {
    pub access_key: String,
    pub secret_key: String,
    pub security_token: String,
    pub ca_cert_path: String,
    pub client_cert_path: String,
    pub client_key_path: String,
    pub cloud: String,
    pub domain_id: String,
    pub domain_name: String,
    pub endpoint_type: EndpointType,
    pub identity_endpoint: String,
    pub insecure: bool,
    pub password: String,
    pub region: String,
    pub use_legacy_swift_auth: bool,
    pub tenant_id: String,
    pub tenant_name: String,
    pub token: String,
    pub username: String,
    pub user_id: String,
    pub agency_name: String,
    pub agency_domain_name: String,
    pub delegated_project: String,
    pub max_retries: u32,
    pub host_version: String,
}

impl Config {
    /// Resolves options, environment and catalogue into a validated record.
    pub fn load(options: &ProviderOptions) -> Result<Self> {
        let mut merged = options.clone();
        merged.fill_from_env()?;

        if let Some(cloud) = merged.cloud.clone() {
            let entry = Catalogue::load_cloud(&cloud)?;
            merged.fill_from_catalogue(&entry);
        }

        let config = Self::from_options(merged)?;
        config.validate()?;
        debug!(
            identity_endpoint = %config.identity_endpoint,
            region = %config.region,
            mode = ?config.auth_mode(),
            "Configuration resolved"
        );
        Ok(config)
    }

    /// Converts merged options into a record without validating credentials.
    pub fn from_options(options: ProviderOptions) -> Result<Self> {
        let max_retries = match options.max_retries {
            None => 0,
            Some(n) if n < 0 => {
                return Err(ConfigError::invalid(format!(
                    "max_retries must be non-negative, got {n}"
                )));
            }
            Some(n) => u32::try_from(n)
                .map_err(|_| ConfigError::invalid(format!("max_retries {n} is too large")))?,
        };
        let endpoint_type = options
            .endpoint_type
            .as_deref()
            .unwrap_or_default()
            .parse::<EndpointType>()?;

        Ok(Config {
            access_key: options.access_key.unwrap_or_default(),
            secret_key: options.secret_key.unwrap_or_default(),
            security_token: options.security_token.unwrap_or_default(),
            ca_cert_path: options.cacert_file.unwrap_or_default(),
            client_cert_path: options.cert.unwrap_or_default(),
            client_key_path: options.key.unwrap_or_default(),
            cloud: options.cloud.unwrap_or_default(),
            domain_id: options.domain_id.unwrap_or_default(),
            domain_name: options.domain_name.unwrap_or_default(),
            endpoint_type,
            identity_endpoint: options.auth_url.unwrap_or_default(),
            insecure: options.insecure.unwrap_or(false),
            password: options.password.unwrap_or_default(),
            region: options.region.unwrap_or_default(),
            use_legacy_swift_auth: options.swauth.unwrap_or(false),
            tenant_id: options.tenant_id.unwrap_or_default(),
            tenant_name: options.tenant_name.unwrap_or_default(),
            token: options.token.unwrap_or_default(),
            username: options.user_name.unwrap_or_default(),
            user_id: options.user_id.unwrap_or_default(),
            agency_name: options.agency_name.unwrap_or_default(),
            agency_domain_name: options.agency_domain_name.unwrap_or_default(),
            delegated_project: options.delegated_project.unwrap_or_default(),
            max_retries,
            host_version: String::new(),
        })
    }

    /// Checks the invariants every configured provider relies on.
    pub fn validate(&self) -> Result<()> {
        if self.identity_endpoint.is_empty() {
            return Err(if self.cloud.is_empty() {
                ConfigError::invalid("one of `auth_url` or `cloud` must be set")
            } else {
                ConfigError::invalid(format!(
                    "cloud '{}' does not define auth.auth_url",
                    self.cloud
                ))
            });
        }
        if !self.identity_endpoint.starts_with("http://")
            && !self.identity_endpoint.starts_with("https://")
        {
            return Err(ConfigError::invalid(format!(
                "auth_url must be an http(s) URL, got {:?}",
                self.identity_endpoint
            )));
        }
        if self.agency_name.is_empty() != self.agency_domain_name.is_empty() {
            return Err(ConfigError::invalid(
                "`agency_name` and `agency_domain_name` must be set together",
            ));
        }
        if self.client_cert_path.is_empty() != self.client_key_path.is_empty() {
            return Err(ConfigError::invalid(
                "`cert` and `key` must be set together",
            ));
        }
        if self.auth_mode().is_none() {
            return Err(ConfigError::NoCredentials);
        }
        Ok(())
    }

    /// The credential mode this record will authenticate with.
    pub fn auth_mode(&self) -> Option<AuthMode> {
        if !self.token.is_empty() {
            Some(AuthMode::Token)
        } else if !self.access_key.is_empty() && !self.secret_key.is_empty() {
            Some(AuthMode::AkSk)
        } else if !self.password.is_empty()
            && (!self.username.is_empty() || !self.user_id.is_empty())
        {
            Some(AuthMode::Password)
        } else {
            None
        }
    }

    /// Whether cross-account delegation is configured.
    pub fn uses_agency(&self) -> bool {
        !self.agency_name.is_empty() && !self.agency_domain_name.is_empty()
    }

    /// The values that must never show up in logs or error text.
    pub fn secrets(&self) -> Vec<String> {
        [
            &self.password,
            &self.token,
            &self.access_key,
            &self.secret_key,
            &self.security_token,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .cloned()
        .collect()
    }

    /// Copy holding only the fields a cloud catalogue can express.
    pub fn persistable(&self) -> Config {
        Config {
            cloud: String::new(),
            use_legacy_swift_auth: false,
            max_retries: 0,
            host_version: String::new(),
            ..self.clone()
        }
    }
}

fn masked(value: &str) -> &'static str {
    mask(&(!value.is_empty()).then(String::new))
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("identity_endpoint", &self.identity_endpoint)
            .field("cloud", &self.cloud)
            .field("region", &self.region)
            .field("endpoint_type", &self.endpoint_type)
            .field("insecure", &self.insecure)
            .field("ca_cert_path", &self.ca_cert_path)
            .field("client_cert_path", &self.client_cert_path)
            .field("client_key_path", &self.client_key_path)
            .field("username", &self.username)
            .field("user_id", &self.user_id)
            .field("password", &masked(&self.password))
            .field("token", &masked(&self.token))
            .field("access_key", &masked(&self.access_key))
            .field("secret_key", &masked(&self.secret_key))
            .field("security_token", &masked(&self.security_token))
            .field("tenant_id", &self.tenant_id)
            .field("tenant_name", &self.tenant_name)
            .field("domain_id", &self.domain_id)
            .field("domain_name", &self.domain_name)
            .field("agency_name", &self.agency_name)
            .field("agency_domain_name", &self.agency_domain_name)
            .field("delegated_project", &self.delegated_project)
            .field("use_legacy_swift_auth", &self.use_legacy_swift_auth)
            .field("max_retries", &self.max_retries)
            .field("host_version", &self.host_version)
            .finish()
    }
}
