//! Credential resolution
//!
//! Turns a validated [`Config`] into the two authentication option sets the
//! service-client factory needs: one scoped to a project (or a delegated
//! project when an agency is configured) and one scoped to a domain.

use crate::config::{AuthMode, Config};
use crate::error::{ConfigError, Result};
use serde::Serialize;
use std::fmt;

/// Exactly one way of proving identity.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Credential {
    Token {
        token_id: String,
    },
    AkSk {
        access_key: String,
        secret_key: String,
        security_token: Option<String>,
    },
    Password {
        username: Option<String>,
        user_id: Option<String>,
        password: String,
    },
}

impl Credential {
    pub fn mode(&self) -> AuthMode {
        match self {
            Credential::Token { .. } => AuthMode::Token,
            Credential::AkSk { .. } => AuthMode::AkSk,
            Credential::Password { .. } => AuthMode::Password,
        }
    }

    pub fn is_aksk(&self) -> bool {
        matches!(self, Credential::AkSk { .. })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Token { .. } => f.debug_struct("Token").finish_non_exhaustive(),
            Credential::AkSk { security_token, .. } => f
                .debug_struct("AkSk")
                .field("temporary", &security_token.is_some())
                .finish_non_exhaustive(),
            Credential::Password {
                username, user_id, ..
            } => f
                .debug_struct("Password")
                .field("username", username)
                .field("user_id", user_id)
                .finish_non_exhaustive(),
        }
    }
}

/// A named role in another account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Agency {
    pub name: String,
    pub domain_name: String,
}

/// What a token request is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// A project in the caller's own domain.
    Project {
        tenant_id: Option<String>,
        tenant_name: Option<String>,
    },
    /// A project inside the agency's domain.
    DelegatedProject { name: String },
    /// The domain itself.
    Domain,
}

/// One authentication option set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthOptions {
    pub identity_endpoint: String,
    pub credential: Credential,
    pub scope: Scope,
    pub domain_id: Option<String>,
    pub domain_name: Option<String>,
    pub agency: Option<Agency>,
    pub region: Option<String>,
}

impl AuthOptions {
    /// Name used to look up the project when no project ID is known.
    ///
    /// Falls back to the region name, which is the default project name.
    pub fn project_lookup_name(&self) -> Option<&str> {
        match &self.scope {
            Scope::Project {
                tenant_name: Some(name),
                ..
            } => Some(name),
            Scope::DelegatedProject { name } => Some(name),
            _ => self.region.as_deref(),
        }
    }
}

/// The project-scoped and domain-scoped option sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthOptionSet {
    pub project: AuthOptions,
    pub domain: AuthOptions,
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Selects the credential mode and builds both option sets.
///
/// Modes are tried in order: token, access/secret key pair, password.
pub fn resolve(config: &Config) -> Result<AuthOptionSet> {
    let credential = match config.auth_mode().ok_or(ConfigError::NoCredentials)? {
        AuthMode::Token => Credential::Token {
            token_id: config.token.clone(),
        },
        AuthMode::AkSk => Credential::AkSk {
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            security_token: non_empty(&config.security_token),
        },
        AuthMode::Password => Credential::Password {
            username: non_empty(&config.username),
            user_id: non_empty(&config.user_id),
            password: config.password.clone(),
        },
    };

    let agency = config.uses_agency().then(|| Agency {
        name: config.agency_name.clone(),
        domain_name: config.agency_domain_name.clone(),
    });

    let project_scope = match &agency {
        Some(_) => {
            let name = non_empty(&config.delegated_project)
                .or_else(|| non_empty(&config.tenant_name))
                .or_else(|| non_empty(&config.region))
                .ok_or_else(|| {
                    ConfigError::invalid(
                        "agency access needs `delegated_project`, `tenant_name` or `region`",
                    )
                })?;
            Scope::DelegatedProject { name }
        }
        None => Scope::Project {
            tenant_id: non_empty(&config.tenant_id),
            tenant_name: non_empty(&config.tenant_name),
        },
    };

    let project = AuthOptions {
        identity_endpoint: config.identity_endpoint.clone(),
        credential: credential.clone(),
        scope: project_scope,
        domain_id: non_empty(&config.domain_id),
        domain_name: non_empty(&config.domain_name),
        agency: agency.clone(),
        region: non_empty(&config.region),
    };

    let domain = AuthOptions {
        identity_endpoint: config.identity_endpoint.clone(),
        credential,
        scope: Scope::Domain,
        domain_id: non_empty(&config.domain_id),
        domain_name: non_empty(&config.domain_name),
        agency,
        region: non_empty(&config.region),
    };

    Ok(AuthOptionSet { project, domain })
}
