//! Environment variable fallbacks
//!
//! Every provider option has at least one environment variable. Options with
//! several names are read in order and the first non-empty value wins.

use crate::error::{ConfigError, Result};

pub const AUTH_URL: &[&str] = &["OS_AUTH_URL"];
pub const REGION: &[&str] = &["OS_REGION_NAME", "OS_REGION"];
pub const USER_NAME: &[&str] = &["OS_USERNAME", "OS_USER_NAME"];
pub const USER_ID: &[&str] = &["OS_USER_ID"];
pub const PASSWORD: &[&str] = &["OS_PASSWORD"];
pub const TOKEN: &[&str] = &["OS_TOKEN", "OS_AUTH_TOKEN"];
pub const SECURITY_TOKEN: &[&str] = &["OS_SECURITY_TOKEN"];
pub const ACCESS_KEY: &[&str] = &["OS_ACCESS_KEY", "OS_AK"];
pub const SECRET_KEY: &[&str] = &["OS_SECRET_KEY", "OS_SK"];
pub const TENANT_ID: &[&str] = &["OS_TENANT_ID", "OS_PROJECT_ID"];
pub const TENANT_NAME: &[&str] = &["OS_TENANT_NAME", "OS_PROJECT_NAME"];
pub const DOMAIN_ID: &[&str] = &["OS_USER_DOMAIN_ID", "OS_PROJECT_DOMAIN_ID", "OS_DOMAIN_ID"];
pub const DOMAIN_NAME: &[&str] = &[
    "OS_USER_DOMAIN_NAME",
    "OS_PROJECT_DOMAIN_NAME",
    "OS_DOMAIN_NAME",
    "OS_DEFAULT_DOMAIN",
];
pub const INSECURE: &[&str] = &["OS_INSECURE"];
pub const ENDPOINT_TYPE: &[&str] = &["OS_ENDPOINT_TYPE", "OS_INTERFACE"];
pub const CACERT: &[&str] = &["OS_CACERT"];
pub const CERT: &[&str] = &["OS_CERT"];
pub const KEY: &[&str] = &["OS_KEY"];
pub const SWAUTH: &[&str] = &["OS_SWAUTH"];
pub const CLOUD: &[&str] = &["OS_CLOUD"];
pub const AGENCY_NAME: &[&str] = &["OS_AGENCY_NAME"];
pub const AGENCY_DOMAIN_NAME: &[&str] = &["OS_AGENCY_DOMAIN_NAME"];
pub const DELEGATED_PROJECT: &[&str] = &["OS_DELEGATED_PROJECT"];
pub const MAX_RETRIES: &[&str] = &["OS_MAX_RETRIES"];
pub const DEBUG: &[&str] = &["OS_DEBUG"];

/// Every variable consulted by the loader, including the catalogue locations.
pub const ALL: &[&str] = &[
    "OS_AUTH_URL",
    "OS_REGION_NAME",
    "OS_REGION",
    "OS_USERNAME",
    "OS_USER_NAME",
    "OS_USER_ID",
    "OS_PASSWORD",
    "OS_TOKEN",
    "OS_AUTH_TOKEN",
    "OS_SECURITY_TOKEN",
    "OS_ACCESS_KEY",
    "OS_AK",
    "OS_SECRET_KEY",
    "OS_SK",
    "OS_TENANT_ID",
    "OS_PROJECT_ID",
    "OS_TENANT_NAME",
    "OS_PROJECT_NAME",
    "OS_USER_DOMAIN_ID",
    "OS_PROJECT_DOMAIN_ID",
    "OS_DOMAIN_ID",
    "OS_USER_DOMAIN_NAME",
    "OS_PROJECT_DOMAIN_NAME",
    "OS_DOMAIN_NAME",
    "OS_DEFAULT_DOMAIN",
    "OS_INSECURE",
    "OS_ENDPOINT_TYPE",
    "OS_INTERFACE",
    "OS_CACERT",
    "OS_CERT",
    "OS_KEY",
    "OS_SWAUTH",
    "OS_CLOUD",
    "OS_AGENCY_NAME",
    "OS_AGENCY_DOMAIN_NAME",
    "OS_DELEGATED_PROJECT",
    "OS_MAX_RETRIES",
    "OS_DEBUG",
    "OS_CLIENT_CONFIG_FILE",
    "OS_CLIENT_SECURE_FILE",
];

/// Returns the first non-empty value among `names`.
pub fn first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.trim().is_empty())
}

/// Reads a boolean variable, accepting the usual spellings.
pub fn boolean(names: &[&str]) -> Result<Option<bool>> {
    let Some(name) = names
        .iter()
        .find(|name| std::env::var(name).is_ok_and(|v| !v.trim().is_empty()))
    else {
        return Ok(None);
    };
    let value = std::env::var(name).unwrap_or_default();
    parse_bool(&value)
        .map(Some)
        .ok_or_else(|| ConfigError::invalid(format!("{name}={value:?} is not a boolean")))
}

/// Reads an integer variable.
pub fn integer(names: &[&str]) -> Result<Option<i64>> {
    let Some(name) = names
        .iter()
        .find(|name| std::env::var(name).is_ok_and(|v| !v.trim().is_empty()))
    else {
        return Ok(None);
    };
    let value = std::env::var(name).unwrap_or_default();
    value
        .trim()
        .parse::<i64>()
        .map(Some)
        .map_err(|_| ConfigError::invalid(format!("{name}={value:?} is not an integer")))
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Whether debug mode is requested through the environment.
pub fn debug_enabled() -> bool {
    first(DEBUG).and_then(|v| parse_bool(&v)).unwrap_or(false)
}

/// Checks the environment values that can be validated before the host
/// supplies any configuration.
pub fn preflight() -> Result<()> {
    if let Some(retries) = integer(MAX_RETRIES)?
        && retries < 0
    {
        return Err(ConfigError::invalid(format!(
            "OS_MAX_RETRIES must be non-negative, got {retries}"
        )));
    }
    if let Some(kind) = first(ENDPOINT_TYPE) {
        kind.parse::<crate::EndpointType>()?;
    }
    boolean(INSECURE)?;
    boolean(SWAUTH)?;
    Ok(())
}
