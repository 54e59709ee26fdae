//! Authenticated identity sessions
//!
//! A session holds the credential state for one scope (project or domain).
//! Readers take a snapshot; re-authentication swaps the whole state under a
//! write lock so no reader ever sees a half-updated token.

use crate::error::{CloudError, Result};
use crate::identity::{
    self, AUTH_TOKEN_HEADER, DOMAIN_ID_HEADER, IssuedToken, PROJECT_ID_HEADER,
};
use crate::service::ServiceCatalog;
use stratoform_config::{AuthOptions, Credential, Scope};
use stratoform_transport::{CancelToken, HttpRequest, Pipeline, Signer, Url};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

#[derive(Clone)]
pub enum SessionAuth {
    Token(String),
    Signed(Signer),
}

/// A consistent view of a session's credentials.
#[derive(Clone)]
pub struct SessionState {
    pub auth: SessionAuth,
    pub project_id: Option<String>,
    pub domain_id: Option<String>,
    pub catalog: ServiceCatalog,
    pub generation: u64,
}

impl SessionState {
    fn from_token(token: IssuedToken) -> Self {
        Self {
            auth: SessionAuth::Token(token.id),
            project_id: token.project_id,
            domain_id: token.domain_id,
            catalog: token.catalog,
            generation: 0,
        }
    }

    pub fn token(&self) -> Option<&str> {
        match &self.auth {
            SessionAuth::Token(token) => Some(token),
            SessionAuth::Signed(_) => None,
        }
    }

    pub fn signer(&self) -> Option<&Signer> {
        match &self.auth {
            SessionAuth::Signed(signer) => Some(signer),
            SessionAuth::Token(_) => None,
        }
    }

    /// Adds the headers that authenticate `request` under this state.
    pub fn prepare(&self, request: HttpRequest) -> Result<HttpRequest> {
        Ok(match &self.auth {
            SessionAuth::Token(token) => request.header(AUTH_TOKEN_HEADER, token)?,
            SessionAuth::Signed(_) => match (&self.project_id, &self.domain_id) {
                (Some(project), _) => request.header(PROJECT_ID_HEADER, project)?,
                (None, Some(domain)) => request.header(DOMAIN_ID_HEADER, domain)?,
                (None, None) => request,
            },
        })
    }
}

pub struct AuthSession {
    pipeline: Pipeline,
    base: Url,
    options: AuthOptions,
    state: RwLock<SessionState>,
    refresh: Mutex<()>,
}

impl AuthSession {
    /// Authenticates `options` and returns the live session.
    pub async fn authenticate(
        pipeline: Pipeline,
        options: AuthOptions,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let base = identity::identity_base(&options.identity_endpoint)?;
        let state = login(&pipeline, &base, &options, cancel).await?;
        info!(
            scope = scope_name(&options.scope),
            mode = ?options.credential.mode(),
            project_id = ?state.project_id,
            "Authenticated"
        );
        Ok(Self {
            pipeline,
            base,
            options,
            state: RwLock::new(state),
            refresh: Mutex::new(()),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn options(&self) -> &AuthOptions {
        &self.options
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn snapshot(&self) -> SessionState {
        self.state.read().await.clone()
    }

    /// Renews the token after the cloud rejected the one from `stale`.
    ///
    /// Concurrent callers holding the same stale generation share a single
    /// renewal; whoever arrives after it completes returns immediately.
    pub async fn reauthenticate(&self, stale: u64, cancel: &CancelToken) -> Result<()> {
        let _guard = self.refresh.lock().await;
        {
            let state = self.state.read().await;
            if state.generation != stale {
                debug!(generation = state.generation, "Token already renewed");
                return Ok(());
            }
            if state.token().is_none() {
                return Err(CloudError::AuthFailed(
                    "request signature rejected by the cloud".to_string(),
                ));
            }
        }

        let mut next = login(&self.pipeline, &self.base, &self.options, cancel).await?;
        let mut state = self.state.write().await;
        next.generation = state.generation + 1;
        *state = next;
        info!(generation = state.generation, "Re-authenticated");
        Ok(())
    }
}

fn scope_name(scope: &Scope) -> &'static str {
    match scope {
        Scope::Project { .. } => "project",
        Scope::DelegatedProject { .. } => "delegated-project",
        Scope::Domain => "domain",
    }
}

async fn login(
    pipeline: &Pipeline,
    base: &Url,
    options: &AuthOptions,
    cancel: &CancelToken,
) -> Result<SessionState> {
    let Credential::AkSk {
        access_key,
        secret_key,
        security_token,
    } = &options.credential
    else {
        let token = identity::issue_token(pipeline, base, options, cancel).await?;
        return Ok(SessionState::from_token(token));
    };

    let signer = Signer::new(access_key.clone(), secret_key.clone(), security_token.clone());
    let pipeline = pipeline.with_extra_secrets(signer.secrets());

    if let Some(agency) = &options.agency {
        let token =
            identity::assume_role_signed(&pipeline, base, options, agency, &signer, cancel).await?;
        return Ok(SessionState::from_token(token));
    }

    let (project_id, domain_id) = match &options.scope {
        Scope::Domain => {
            let domain_id = match &options.domain_id {
                Some(id) => id.clone(),
                None => identity::lookup_domain_id(&pipeline, base, &signer, cancel).await?,
            };
            (None, Some(domain_id))
        }
        Scope::Project {
            tenant_id: Some(id),
            ..
        } => (Some(id.clone()), options.domain_id.clone()),
        _ => {
            let name = options.project_lookup_name().ok_or_else(|| {
                CloudError::AuthFailed(
                    "set `tenant_id`, `tenant_name` or `region` to choose a project".to_string(),
                )
            })?;
            let id = identity::lookup_project_id(&pipeline, base, &signer, name, cancel).await?;
            (Some(id), options.domain_id.clone())
        }
    };

    let scope_header = project_id
        .as_deref()
        .map(|project| (PROJECT_ID_HEADER, project))
        .or_else(|| domain_id.as_deref().map(|domain| (DOMAIN_ID_HEADER, domain)));
    let catalog = match scope_header {
        Some(header) => {
            match identity::fetch_catalog(&pipeline, base, &signer, header, cancel).await {
                Ok(catalog) => catalog,
                Err(CloudError::Cancelled) => return Err(CloudError::Cancelled),
                Err(e) => {
                    debug!(
                        error = %e,
                        "No service catalogue for signed session, deriving endpoints"
                    );
                    ServiceCatalog::default()
                }
            }
        }
        None => ServiceCatalog::default(),
    };

    Ok(SessionState {
        auth: SessionAuth::Signed(signer),
        project_id,
        domain_id,
        catalog,
        generation: 0,
    })
}
