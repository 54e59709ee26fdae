//! Identity service calls
//!
//! Token issuance for password, token and agency (`assume_role`) flows,
//! AK/SK project and domain discovery, temporary credentials and the legacy
//! object-storage authentication.

use crate::error::{CloudError, Result};
use crate::service::ServiceCatalog;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use stratoform_config::{Agency, AuthOptions, Credential, Scope};
use stratoform_transport::{
    CancelToken, HttpRequest, Method, Pipeline, Signer, TransportError, Url,
};
use tracing::debug;

pub const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";
pub const PROJECT_ID_HEADER: &str = "X-Project-Id";
pub const DOMAIN_ID_HEADER: &str = "X-Domain-Id";

/// Default lifetime requested for temporary credentials.
pub const TEMPORARY_CREDENTIAL_SECONDS: u32 = 3600;

/// A token issued by the identity service.
#[derive(Clone)]
pub struct IssuedToken {
    pub id: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub catalog: ServiceCatalog,
    pub project_id: Option<String>,
    pub domain_id: Option<String>,
    pub user_id: Option<String>,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("expires_at", &self.expires_at)
            .field("project_id", &self.project_id)
            .field("domain_id", &self.domain_id)
            .field("user_id", &self.user_id)
            .field("catalog_services", &self.catalog.services.len())
            .finish_non_exhaustive()
    }
}

/// Temporary AK/SK material with its security token.
#[derive(Clone)]
pub struct TemporaryCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub security_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TemporaryCredentials {
    pub fn signer(&self) -> Signer {
        Signer::new(
            self.access_key.clone(),
            self.secret_key.clone(),
            self.security_token.clone(),
        )
    }
}

impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenEnvelope {
    token: TokenBody,
}

#[derive(Deserialize)]
struct TokenBody {
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    catalog: ServiceCatalog,
    #[serde(default)]
    project: Option<NamedRef>,
    #[serde(default)]
    domain: Option<NamedRef>,
    #[serde(default)]
    user: Option<UserRef>,
}

#[derive(Deserialize)]
struct NamedRef {
    id: String,
    #[serde(default)]
    domain: Option<Box<NamedRef>>,
}

#[derive(Deserialize)]
struct UserRef {
    id: String,
    #[serde(default)]
    domain: Option<NamedRef>,
}

/// Normalises an `auth_url` into the identity v3 base, ending in `/`.
pub fn identity_base(auth_url: &str) -> Result<Url> {
    let trimmed = auth_url.trim_end_matches('/');
    let with_version = if trimmed.ends_with("/v3") || trimmed.ends_with("/v3.0") {
        format!("{trimmed}/")
    } else {
        format!("{trimmed}/v3/")
    };
    Url::parse(&with_version).map_err(|e| {
        CloudError::Config(stratoform_config::ConfigError::Invalid(format!(
            "auth_url {auth_url:?} is not a valid URL: {e}"
        )))
    })
}

/// Rewrites an identity base between its `/v3/` and `/v3.0/` variants.
pub fn identity_variant(base: &Url, v30: bool) -> Url {
    let mut url = base.clone();
    let path = base.path().trim_end_matches('/');
    let stem = path
        .strip_suffix("/v3.0")
        .or_else(|| path.strip_suffix("/v3"))
        .unwrap_or(path);
    let version = if v30 { "v3.0" } else { "v3" };
    url.set_path(&format!("{stem}/{version}/"));
    url
}

fn scope_body(options: &AuthOptions) -> Value {
    match &options.scope {
        Scope::Project {
            tenant_id: Some(id),
            ..
        } => json!({ "project": { "id": id } }),
        Scope::Project { .. } => {
            let mut project = json!({ "name": options.project_lookup_name().unwrap_or_default() });
            if let Some(domain) = domain_ref(options) {
                project["domain"] = domain;
            }
            json!({ "project": project })
        }
        Scope::DelegatedProject { name } => json!({ "project": { "name": name } }),
        Scope::Domain => match &options.agency {
            Some(agency) => json!({ "domain": { "name": agency.domain_name } }),
            None => json!({ "domain": domain_ref(options).unwrap_or(Value::Null) }),
        },
    }
}

fn domain_ref(options: &AuthOptions) -> Option<Value> {
    if let Some(id) = &options.domain_id {
        Some(json!({ "id": id }))
    } else {
        options.domain_name.as_ref().map(|name| json!({ "name": name }))
    }
}

/// Identity section for a password or token credential.
fn identity_body(options: &AuthOptions) -> Option<Value> {
    match &options.credential {
        Credential::Password {
            username,
            user_id,
            password,
        } => {
            let user = match (user_id, username) {
                (Some(id), _) => json!({ "id": id, "password": password }),
                (None, name) => {
                    let mut user = json!({ "name": name, "password": password });
                    if let Some(domain) = domain_ref(options) {
                        user["domain"] = domain;
                    }
                    user
                }
            };
            Some(json!({ "methods": ["password"], "password": { "user": user } }))
        }
        Credential::Token { token_id } => {
            Some(json!({ "methods": ["token"], "token": { "id": token_id } }))
        }
        Credential::AkSk { .. } => None,
    }
}

fn assume_role_body(agency: &Agency, scope: Value) -> Value {
    json!({
        "auth": {
            "identity": {
                "methods": ["assume_role"],
                "assume_role": {
                    "domain_name": agency.domain_name,
                    "agency_name": agency.name,
                }
            },
            "scope": scope,
        }
    })
}

pub(crate) fn auth_error(error: TransportError) -> CloudError {
    match error.status() {
        Some(401) | Some(403) => CloudError::AuthFailed(error.to_string()),
        _ => CloudError::from(error),
    }
}

async fn post_tokens(
    pipeline: &Pipeline,
    base: &Url,
    body: Value,
    headers: &[(&str, &str)],
    signer: Option<&Signer>,
    cancel: &CancelToken,
) -> Result<IssuedToken> {
    let url = join(base, "auth/tokens")?;
    let mut request = HttpRequest::new(Method::POST, url).json(&body)?;
    for (name, value) in headers {
        request = request.header(name, value)?;
    }
    let response = pipeline
        .execute(request, signer, cancel)
        .await
        .map_err(auth_error)?;

    let id = response
        .header(SUBJECT_TOKEN_HEADER)
        .ok_or_else(|| CloudError::AuthFailed("identity service returned no token".to_string()))?
        .to_string();
    let envelope: TokenEnvelope = response.json()?;
    let token = envelope.token;

    let project_id = token.project.as_ref().map(|p| p.id.clone());
    let domain_id = token
        .domain
        .as_ref()
        .map(|d| d.id.clone())
        .or_else(|| {
            token
                .project
                .as_ref()
                .and_then(|p| p.domain.as_ref())
                .map(|d| d.id.clone())
        })
        .or_else(|| {
            token
                .user
                .as_ref()
                .and_then(|u| u.domain.as_ref())
                .map(|d| d.id.clone())
        });
    debug!(
        project_id = ?project_id,
        domain_id = ?domain_id,
        services = token.catalog.services.len(),
        "Token issued"
    );

    Ok(IssuedToken {
        id,
        expires_at: token.expires_at,
        catalog: token.catalog,
        project_id,
        domain_id,
        user_id: token.user.map(|u| u.id),
    })
}

/// Issues a scoped token for a password or token credential.
///
/// With an agency configured, the user first authenticates against their own
/// domain and then assumes the agency role in the requested scope.
pub async fn issue_token(
    pipeline: &Pipeline,
    base: &Url,
    options: &AuthOptions,
    cancel: &CancelToken,
) -> Result<IssuedToken> {
    let identity = identity_body(options).ok_or_else(|| {
        CloudError::AuthFailed("access/secret keys do not issue tokens directly".to_string())
    })?;

    match &options.agency {
        None => {
            let body = json!({ "auth": { "identity": identity, "scope": scope_body(options) } });
            post_tokens(pipeline, base, body, &[], None, cancel).await
        }
        Some(agency) => {
            let user_scope = json!({ "domain": domain_ref(options).unwrap_or(Value::Null) });
            let body = json!({ "auth": { "identity": identity, "scope": user_scope } });
            let user_token = post_tokens(pipeline, base, body, &[], None, cancel).await?;
            debug!(agency = %agency.name, "Assuming agency role");
            let body = assume_role_body(agency, scope_body(options));
            post_tokens(
                pipeline,
                base,
                body,
                &[(AUTH_TOKEN_HEADER, &user_token.id)],
                None,
                cancel,
            )
            .await
        }
    }
}

/// Assumes an agency role with a signed request.
pub async fn assume_role_signed(
    pipeline: &Pipeline,
    base: &Url,
    options: &AuthOptions,
    agency: &Agency,
    signer: &Signer,
    cancel: &CancelToken,
) -> Result<IssuedToken> {
    let body = assume_role_body(agency, scope_body(options));
    post_tokens(pipeline, base, body, &[], Some(signer), cancel).await
}

#[derive(Deserialize)]
struct ProjectList {
    #[serde(default)]
    projects: Vec<IdName>,
}

#[derive(Deserialize)]
struct DomainList {
    #[serde(default)]
    domains: Vec<IdName>,
}

#[derive(Deserialize)]
struct IdName {
    id: String,
    #[serde(default)]
    name: String,
}

/// Finds a project ID by name using signed requests.
pub async fn lookup_project_id(
    pipeline: &Pipeline,
    base: &Url,
    signer: &Signer,
    name: &str,
    cancel: &CancelToken,
) -> Result<String> {
    let mut url = join(base, "projects")?;
    url.query_pairs_mut().append_pair("name", name);
    let response = pipeline
        .execute(HttpRequest::get(url), Some(signer), cancel)
        .await
        .map_err(auth_error)?;
    let list: ProjectList = response.json()?;
    list.projects
        .into_iter()
        .find(|p| p.name == name || p.id == name)
        .map(|p| p.id)
        .ok_or_else(|| CloudError::AuthFailed(format!("project '{name}' not found")))
}

/// Finds the caller's domain ID using signed requests.
pub async fn lookup_domain_id(
    pipeline: &Pipeline,
    base: &Url,
    signer: &Signer,
    cancel: &CancelToken,
) -> Result<String> {
    let url = join(base, "auth/domains")?;
    let response = pipeline
        .execute(HttpRequest::get(url), Some(signer), cancel)
        .await
        .map_err(auth_error)?;
    let list: DomainList = response.json()?;
    list.domains
        .into_iter()
        .next()
        .map(|d| d.id)
        .ok_or_else(|| CloudError::AuthFailed("no domain visible to these keys".to_string()))
}

#[derive(Deserialize)]
struct CatalogEnvelope {
    #[serde(default)]
    catalog: ServiceCatalog,
}

/// Fetches the service catalogue for signed sessions.
pub async fn fetch_catalog(
    pipeline: &Pipeline,
    base: &Url,
    signer: &Signer,
    scope_header: (&str, &str),
    cancel: &CancelToken,
) -> Result<ServiceCatalog> {
    let url = join(base, "auth/catalog")?;
    let request = HttpRequest::get(url).header(scope_header.0, scope_header.1)?;
    let response = pipeline.execute(request, Some(signer), cancel).await?;
    Ok(response.json::<CatalogEnvelope>()?.catalog)
}

#[derive(Deserialize)]
struct CredentialEnvelope {
    credential: CredentialBody,
}

#[derive(Deserialize)]
struct CredentialBody {
    access: String,
    secret: String,
    #[serde(default)]
    securitytoken: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

/// Exchanges a token for temporary AK/SK material.
pub async fn create_temporary_credentials(
    pipeline: &Pipeline,
    base: &Url,
    token: &str,
    cancel: &CancelToken,
) -> Result<TemporaryCredentials> {
    let url = join(&identity_variant(base, true), "OS-CREDENTIAL/securitytokens")?;
    let body = json!({
        "auth": {
            "identity": {
                "methods": ["token"],
                "token": { "duration_seconds": TEMPORARY_CREDENTIAL_SECONDS }
            }
        }
    });
    let request = HttpRequest::new(Method::POST, url)
        .header(AUTH_TOKEN_HEADER, token)?
        .json(&body)?;
    let response = pipeline
        .execute(request, None, cancel)
        .await
        .map_err(auth_error)?;
    let credential = response.json::<CredentialEnvelope>()?.credential;
    debug!(expires_at = ?credential.expires_at, "Temporary credentials issued");
    Ok(TemporaryCredentials {
        access_key: credential.access,
        secret_key: credential.secret,
        security_token: credential.securitytoken,
        expires_at: credential.expires_at,
    })
}

/// Storage URL and token from legacy object-storage authentication.
#[derive(Clone)]
pub struct SwiftAuth {
    pub storage_url: Url,
    pub token: String,
}

/// Authenticates against the legacy `auth/v1.0` endpoint.
pub async fn legacy_swift_auth(
    pipeline: &Pipeline,
    auth_url: &str,
    user: &str,
    key: &str,
    cancel: &CancelToken,
) -> Result<SwiftAuth> {
    let base = Url::parse(&format!("{}/", auth_url.trim_end_matches('/')))
        .map_err(|e| CloudError::invalid_response(format!("auth_url: {e}")))?;
    let request = HttpRequest::get(join(&base, "auth/v1.0")?)
        .header("X-Auth-User", user)?
        .header("X-Auth-Key", key)?;
    let response = pipeline
        .execute(request, None, cancel)
        .await
        .map_err(auth_error)?;
    let storage_url = response
        .header("X-Storage-Url")
        .ok_or_else(|| CloudError::AuthFailed("no X-Storage-Url in reply".to_string()))?;
    let token = response
        .header(AUTH_TOKEN_HEADER)
        .ok_or_else(|| CloudError::AuthFailed("no X-Auth-Token in reply".to_string()))?;
    let storage_url = Url::parse(&format!("{}/", storage_url.trim_end_matches('/')))
        .map_err(|e| CloudError::invalid_response(format!("X-Storage-Url: {e}")))?;
    Ok(SwiftAuth {
        storage_url,
        token: token.to_string(),
    })
}

pub(crate) fn join(base: &Url, path: &str) -> Result<Url> {
    base.join(path.trim_start_matches('/'))
        .map_err(|e| CloudError::invalid_response(format!("cannot join {path:?} to {base}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password_options(scope: Scope) -> AuthOptions {
        AuthOptions {
            identity_endpoint: "https://iam.eu-de.example.com/v3".to_string(),
            credential: Credential::Password {
                username: Some("demouser".to_string()),
                user_id: None,
                password: "pw".to_string(),
            },
            scope,
            domain_id: None,
            domain_name: Some("OTC1354835".to_string()),
            agency: None,
            region: Some("eu-de".to_string()),
        }
    }

    #[test]
    fn test_identity_base() {
        assert_eq!(
            identity_base("https://iam.example.com/v3").unwrap().as_str(),
            "https://iam.example.com/v3/"
        );
        assert_eq!(
            identity_base("https://iam.example.com/").unwrap().as_str(),
            "https://iam.example.com/v3/"
        );
        assert_eq!(
            identity_base("http://localhost:33666").unwrap().as_str(),
            "http://localhost:33666/v3/"
        );
    }

    #[test]
    fn test_identity_variant_rewrites_version() {
        let base = identity_base("https://iam.example.com/v3").unwrap();
        let v30 = identity_variant(&base, true);
        assert_eq!(v30.as_str(), "https://iam.example.com/v3.0/");
        assert_eq!(identity_variant(&v30, false), base);
    }

    #[test]
    fn test_project_scope_by_name_carries_domain() {
        let options = password_options(Scope::Project {
            tenant_id: None,
            tenant_name: Some("eu-de_sub".to_string()),
        });
        let scope = scope_body(&options);
        assert_eq!(scope["project"]["name"], "eu-de_sub");
        assert_eq!(scope["project"]["domain"]["name"], "OTC1354835");
    }

    #[test]
    fn test_project_scope_falls_back_to_region() {
        let options = password_options(Scope::Project {
            tenant_id: None,
            tenant_name: None,
        });
        assert_eq!(scope_body(&options)["project"]["name"], "eu-de");
    }

    #[test]
    fn test_password_identity_body() {
        let options = password_options(Scope::Domain);
        let identity = identity_body(&options).unwrap();
        assert_eq!(identity["methods"][0], "password");
        assert_eq!(identity["password"]["user"]["name"], "demouser");
        assert_eq!(identity["password"]["user"]["domain"]["name"], "OTC1354835");
    }

    #[test]
    fn test_assume_role_scope() {
        let agency = Agency {
            name: "ops".to_string(),
            domain_name: "partner".to_string(),
        };
        let mut options = password_options(Scope::DelegatedProject {
            name: "eu-de_partner".to_string(),
        });
        options.agency = Some(agency.clone());
        let body = assume_role_body(&agency, scope_body(&options));
        assert_eq!(body["auth"]["identity"]["assume_role"]["agency_name"], "ops");
        assert_eq!(body["auth"]["scope"]["project"]["name"], "eu-de_partner");

        options.scope = Scope::Domain;
        assert_eq!(scope_body(&options)["domain"]["name"], "partner");
    }
}
