//! Engine-supplied provider options
//!
//! The host engine sends the provider block as a JSON object. Every field is
//! optional here; the loader fills gaps from the environment and the cloud
//! catalogue before validation.

use crate::catalogue::CloudEntry;
use crate::env;
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw provider options, keyed exactly as the host engine names them.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub security_token: Option<String>,
    pub auth_url: Option<String>,
    pub region: Option<String>,
    pub user_name: Option<String>,
    pub user_id: Option<String>,
    pub password: Option<String>,
    pub tenant_id: Option<String>,
    pub tenant_name: Option<String>,
    pub token: Option<String>,
    pub domain_id: Option<String>,
    pub domain_name: Option<String>,
    pub insecure: Option<bool>,
    pub endpoint_type: Option<String>,
    pub cacert_file: Option<String>,
    pub cert: Option<String>,
    pub key: Option<String>,
    pub swauth: Option<bool>,
    pub cloud: Option<String>,
    pub agency_name: Option<String>,
    pub agency_domain_name: Option<String>,
    pub delegated_project: Option<String>,
    pub max_retries: Option<i64>,
}

/// Fills `$field` from `$source` when it is still unset.
macro_rules! fill {
    ($target:expr, $source:expr) => {
        if $target.is_none() {
            $target = $source;
        }
    };
}

impl ProviderOptions {
    /// Parses the provider block sent by the host engine.
    ///
    /// `null` and empty strings are treated as unset.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let mut options: ProviderOptions = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::invalid(format!("malformed provider block: {e}")))?;
        options.drop_empty();
        Ok(options)
    }

    fn drop_empty(&mut self) {
        for field in [
            &mut self.access_key,
            &mut self.secret_key,
            &mut self.security_token,
            &mut self.auth_url,
            &mut self.region,
            &mut self.user_name,
            &mut self.user_id,
            &mut self.password,
            &mut self.tenant_id,
            &mut self.tenant_name,
            &mut self.token,
            &mut self.domain_id,
            &mut self.domain_name,
            &mut self.endpoint_type,
            &mut self.cacert_file,
            &mut self.cert,
            &mut self.key,
            &mut self.cloud,
            &mut self.agency_name,
            &mut self.agency_domain_name,
            &mut self.delegated_project,
        ] {
            if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *field = None;
            }
        }
    }

    /// Fills every unset option from its environment variables.
    pub fn fill_from_env(&mut self) -> Result<()> {
        fill!(self.auth_url, env::first(env::AUTH_URL));
        fill!(self.region, env::first(env::REGION));
        fill!(self.user_name, env::first(env::USER_NAME));
        fill!(self.user_id, env::first(env::USER_ID));
        fill!(self.password, env::first(env::PASSWORD));
        fill!(self.token, env::first(env::TOKEN));
        fill!(self.security_token, env::first(env::SECURITY_TOKEN));
        fill!(self.access_key, env::first(env::ACCESS_KEY));
        fill!(self.secret_key, env::first(env::SECRET_KEY));
        fill!(self.tenant_id, env::first(env::TENANT_ID));
        fill!(self.tenant_name, env::first(env::TENANT_NAME));
        fill!(self.domain_id, env::first(env::DOMAIN_ID));
        fill!(self.domain_name, env::first(env::DOMAIN_NAME));
        fill!(self.endpoint_type, env::first(env::ENDPOINT_TYPE));
        fill!(self.cacert_file, env::first(env::CACERT));
        fill!(self.cert, env::first(env::CERT));
        fill!(self.key, env::first(env::KEY));
        fill!(self.cloud, env::first(env::CLOUD));
        fill!(self.agency_name, env::first(env::AGENCY_NAME));
        fill!(self.agency_domain_name, env::first(env::AGENCY_DOMAIN_NAME));
        fill!(self.delegated_project, env::first(env::DELEGATED_PROJECT));
        fill!(self.insecure, env::boolean(env::INSECURE)?);
        fill!(self.swauth, env::boolean(env::SWAUTH)?);
        fill!(self.max_retries, env::integer(env::MAX_RETRIES)?);
        Ok(())
    }

    /// Fills every unset option from a cloud catalogue entry.
    pub fn fill_from_catalogue(&mut self, entry: &CloudEntry) {
        let auth = &entry.auth;
        fill!(self.auth_url, auth.auth_url.clone());
        fill!(self.user_name, auth.username.clone());
        fill!(self.user_id, auth.user_id.clone());
        fill!(self.password, auth.password.clone());
        fill!(self.token, auth.token.clone());
        fill!(self.access_key, auth.ak.clone());
        fill!(self.secret_key, auth.sk.clone());
        fill!(self.security_token, auth.security_token.clone());
        fill!(self.tenant_id, auth.project_id.clone());
        fill!(self.tenant_name, auth.project_name.clone());
        fill!(self.domain_id, auth.resolved_domain_id().map(str::to_string));
        fill!(self.domain_name, auth.resolved_domain_name().map(str::to_string));
        fill!(self.agency_name, auth.agency_name.clone());
        fill!(self.agency_domain_name, auth.agency_domain_name.clone());
        fill!(self.delegated_project, auth.delegated_project.clone());
        fill!(self.region, entry.region_name.clone());
        fill!(self.endpoint_type, entry.interface.clone());
        fill!(self.cacert_file, entry.cacert.clone());
        fill!(self.cert, entry.cert.clone());
        fill!(self.key, entry.key.clone());
        fill!(self.insecure, entry.verify.map(|verify| !verify));
    }
}

/// Masks a secret for `Debug` output.
pub(crate) fn mask(value: &Option<String>) -> &'static str {
    match value {
        Some(_) => "<redacted>",
        None => "<unset>",
    }
}

impl fmt::Debug for ProviderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderOptions")
            .field("auth_url", &self.auth_url)
            .field("region", &self.region)
            .field("user_name", &self.user_name)
            .field("user_id", &self.user_id)
            .field("password", &mask(&self.password))
            .field("token", &mask(&self.token))
            .field("access_key", &mask(&self.access_key))
            .field("secret_key", &mask(&self.secret_key))
            .field("security_token", &mask(&self.security_token))
            .field("tenant_id", &self.tenant_id)
            .field("tenant_name", &self.tenant_name)
            .field("domain_id", &self.domain_id)
            .field("domain_name", &self.domain_name)
            .field("insecure", &self.insecure)
            .field("endpoint_type", &self.endpoint_type)
            .field("cloud", &self.cloud)
            .field("agency_name", &self.agency_name)
            .field("agency_domain_name", &self.agency_domain_name)
            .field("delegated_project", &self.delegated_project)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
