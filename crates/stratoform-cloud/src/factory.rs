//! Service-client factory
//!
//! Owns the two long-lived identity sessions (project-scoped and
//! domain-scoped) and derives per-service clients from them on demand.

use crate::client::ServiceClient;
use crate::error::{CloudError, Result};
use crate::identity::{self, TemporaryCredentials};
use crate::obs::ObsClient;
use crate::service::ServiceKind;
use crate::session::AuthSession;
use std::sync::Arc;
use stratoform_config::{AuthMode, AuthOptionSet, Config, ConfigError, EndpointType, resolve};
use stratoform_transport::{CancelToken, Pipeline, Url};
use tokio::sync::OnceCell;
use tracing::{debug, info};

const PROJECT_PLACEHOLDERS: &[&str] = &[
    "$(tenant_id)s",
    "%(tenant_id)s",
    "$(project_id)s",
    "{project_id}",
];

pub struct ClientFactory {
    config: Arc<Config>,
    pipeline: Pipeline,
    auth: AuthOptionSet,
    project: OnceCell<Arc<AuthSession>>,
    domain: OnceCell<Arc<AuthSession>>,
    temporary: OnceCell<TemporaryCredentials>,
}

impl ClientFactory {
    /// Builds a factory without contacting the cloud.
    pub fn new(config: Arc<Config>, pipeline: Pipeline) -> Result<Self> {
        let auth = resolve(&config)?;
        Ok(Self {
            config,
            pipeline,
            auth,
            project: OnceCell::new(),
            domain: OnceCell::new(),
            temporary: OnceCell::new(),
        })
    }

    /// Builds a factory and authenticates the project-scoped session.
    pub async fn connect(
        config: Arc<Config>,
        pipeline: Pipeline,
        cancel: &CancelToken,
    ) -> Result<Self> {
        let factory = Self::new(config, pipeline)?;
        factory.project_session(cancel).await?;
        Ok(factory)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn project_session(&self, cancel: &CancelToken) -> Result<Arc<AuthSession>> {
        self.project
            .get_or_try_init(|| async {
                AuthSession::authenticate(self.pipeline.clone(), self.auth.project.clone(), cancel)
                    .await
                    .map(Arc::new)
            })
            .await
            .cloned()
    }

    pub async fn domain_session(&self, cancel: &CancelToken) -> Result<Arc<AuthSession>> {
        self.domain
            .get_or_try_init(|| async {
                AuthSession::authenticate(self.pipeline.clone(), self.auth.domain.clone(), cancel)
                    .await
                    .map(Arc::new)
            })
            .await
            .cloned()
    }

    /// A project-scoped client for `(kind, region, availability)`.
    ///
    /// `None` falls back to the configured region and endpoint type.
    pub async fn service_client(
        &self,
        kind: ServiceKind,
        region: Option<&str>,
        availability: Option<EndpointType>,
        cancel: &CancelToken,
    ) -> Result<ServiceClient> {
        let session = self.project_session(cancel).await?;
        self.client_for(session, kind, region, availability).await
    }

    /// A domain-scoped client, for services that manage domain-level objects.
    pub async fn domain_client(
        &self,
        kind: ServiceKind,
        cancel: &CancelToken,
    ) -> Result<ServiceClient> {
        let session = self.domain_session(cancel).await?;
        self.client_for(session, kind, None, None).await
    }

    /// A domain-scoped identity client, on the `/v3.0/` path when `v30` is set.
    pub async fn identity_client(&self, v30: bool, cancel: &CancelToken) -> Result<ServiceClient> {
        let session = self.domain_session(cancel).await?;
        let endpoint = identity::identity_variant(session.base(), v30);
        Ok(ServiceClient::with_session(
            ServiceKind::Identity,
            self.config.region.clone(),
            endpoint,
            session,
        ))
    }

    async fn client_for(
        &self,
        session: Arc<AuthSession>,
        kind: ServiceKind,
        region: Option<&str>,
        availability: Option<EndpointType>,
    ) -> Result<ServiceClient> {
        let region = self.region(region)?;
        let availability = availability.unwrap_or(self.config.endpoint_type);
        let state = session.snapshot().await;

        let raw = match kind {
            ServiceKind::Identity => identity::identity_variant(session.base(), false).to_string(),
            _ => match state.catalog.locate(kind, &region, availability) {
                Some(url) => url.to_string(),
                None => derive_endpoint(session.base(), kind, &region)?,
            },
        };
        let project_id = state.project_id.as_deref();
        let endpoint = finish_endpoint(&raw, project_id, kind, &region, availability)?;
        debug!(service = %kind, region = %region, endpoint = %endpoint, "Service client ready");
        Ok(ServiceClient::with_session(kind, region, endpoint, session))
    }

    fn region(&self, region: Option<&str>) -> Result<String> {
        match region.filter(|r| !r.is_empty()) {
            Some(region) => Ok(region.to_string()),
            None if !self.config.region.is_empty() => Ok(self.config.region.clone()),
            None => Err(ConfigError::Invalid(
                "`region` must be set on the provider or the resource".to_string(),
            )
            .into()),
        }
    }

    /// Temporary AK/SK material, fetched at most once per invocation.
    ///
    /// Configured keys are used as they are; otherwise the project token is
    /// exchanged for temporary credentials.
    pub async fn temporary_credentials(
        &self,
        cancel: &CancelToken,
    ) -> Result<TemporaryCredentials> {
        self.temporary
            .get_or_try_init(|| async {
                if self.config.auth_mode() == Some(AuthMode::AkSk) {
                    return Ok(TemporaryCredentials {
                        access_key: self.config.access_key.clone(),
                        secret_key: self.config.secret_key.clone(),
                        security_token: (!self.config.security_token.is_empty())
                            .then(|| self.config.security_token.clone()),
                        expires_at: None,
                    });
                }
                let session = self.project_session(cancel).await?;
                let state = session.snapshot().await;
                let token = state.token().ok_or_else(|| {
                    CloudError::AuthFailed(
                        "no token available for temporary credentials".to_string(),
                    )
                })?;
                info!("Requesting temporary credentials");
                let (pipeline, base) = (session.pipeline(), session.base());
                identity::create_temporary_credentials(pipeline, base, token, cancel).await
            })
            .await
            .cloned()
    }

    /// Object-storage client.
    ///
    /// With `swauth` the legacy token endpoint is used; otherwise requests
    /// are signed with temporary credentials.
    pub async fn object_store(
        &self,
        region: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<ObsClient> {
        let region = self.region(region)?;
        if self.config.use_legacy_swift_auth {
            let user = if self.config.tenant_name.is_empty() {
                self.config.username.clone()
            } else {
                format!("{}:{}", self.config.tenant_name, self.config.username)
            };
            let auth = identity::legacy_swift_auth(
                &self.pipeline,
                &self.config.identity_endpoint,
                &user,
                &self.config.password,
                cancel,
            )
            .await?;
            let client = ServiceClient::with_token(
                ServiceKind::ObjectStore,
                region,
                auth.storage_url,
                self.pipeline.clone(),
                auth.token,
            );
            return Ok(ObsClient::new(client));
        }

        let credentials = self.temporary_credentials(cancel).await?;
        let session = self.project_session(cancel).await?;
        let state = session.snapshot().await;
        let raw = match state
            .catalog
            .locate(ServiceKind::ObjectStore, &region, self.config.endpoint_type)
        {
            Some(url) => url.to_string(),
            None => derive_endpoint(session.base(), ServiceKind::ObjectStore, &region)?,
        };
        let endpoint = finish_endpoint(
            &raw,
            state.project_id.as_deref(),
            ServiceKind::ObjectStore,
            &region,
            self.config.endpoint_type,
        )?;
        let client = ServiceClient::with_signer(
            ServiceKind::ObjectStore,
            region,
            endpoint,
            self.pipeline.clone(),
            credentials.signer(),
        );
        Ok(ObsClient::new(client))
    }
}

/// Derives `https://<prefix>.<region>.<cloud-domain>/<version>` from the
/// identity endpoint, whose host is `<iam>.<region>.<cloud-domain>`.
pub fn derive_endpoint(identity: &Url, kind: ServiceKind, region: &str) -> Result<String> {
    let host = identity.host_str().unwrap_or_default();
    let labels: Vec<&str> = host.split('.').collect();
    let domain = if labels.len() > 2 {
        labels[2..].join(".")
    } else {
        host.to_string()
    };
    let host = if kind.is_regional() {
        format!("{}.{region}.{domain}", kind.host_prefix())
    } else {
        format!("{}.{domain}", kind.host_prefix())
    };
    Ok(format!("{}://{host}/{}", identity.scheme(), kind.version_path()))
}

fn finish_endpoint(
    raw: &str,
    project_id: Option<&str>,
    kind: ServiceKind,
    region: &str,
    availability: EndpointType,
) -> Result<Url> {
    let mut url = raw.to_string();
    for placeholder in PROJECT_PLACEHOLDERS {
        if url.contains(placeholder) {
            let project = project_id.ok_or_else(|| CloudError::EndpointNotFound {
                service: kind.to_string(),
                region: region.to_string(),
                availability: format!("{availability}, no project ID to substitute"),
            })?;
            url = url.replace(placeholder, project);
        }
    }
    if !url.ends_with('/') {
        url.push('/');
    }
    Url::parse(&url).map_err(|e| CloudError::EndpointNotFound {
        service: kind.to_string(),
        region: region.to_string(),
        availability: format!("{availability}, invalid URL {url:?}: {e}"),
    })
}
