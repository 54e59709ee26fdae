//! Authenticated per-service clients

use crate::error::{CloudError, Result};
use crate::identity::{AUTH_TOKEN_HEADER, join};
use crate::service::ServiceKind;
use crate::session::AuthSession;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use stratoform_transport::{
    CancelToken, HttpRequest, HttpResponse, Method, Pipeline, Signer, Url,
};
use tracing::warn;

#[derive(Clone)]
enum ClientAuth {
    /// Token or signature from a refreshable identity session.
    Session(Arc<AuthSession>),
    /// A fixed token, as issued by legacy object-storage authentication.
    Static(String),
    /// Fixed key material, as used with temporary credentials.
    Signed(Signer),
}

/// A client bound to one service endpoint.
#[derive(Clone)]
pub struct ServiceClient {
    kind: ServiceKind,
    region: String,
    endpoint: Url,
    pipeline: Pipeline,
    auth: ClientAuth,
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("kind", &self.kind)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl ServiceClient {
    pub(crate) fn with_session(
        kind: ServiceKind,
        region: String,
        endpoint: Url,
        session: Arc<AuthSession>,
    ) -> Self {
        Self {
            kind,
            region,
            endpoint,
            pipeline: session.pipeline().clone(),
            auth: ClientAuth::Session(session),
        }
    }

    pub(crate) fn with_token(
        kind: ServiceKind,
        region: String,
        endpoint: Url,
        pipeline: Pipeline,
        token: String,
    ) -> Self {
        let pipeline = pipeline.with_extra_secrets([token.clone()]);
        Self {
            kind,
            region,
            endpoint,
            pipeline,
            auth: ClientAuth::Static(token),
        }
    }

    pub(crate) fn with_signer(
        kind: ServiceKind,
        region: String,
        endpoint: Url,
        pipeline: Pipeline,
        signer: Signer,
    ) -> Self {
        let pipeline = pipeline.with_extra_secrets(signer.secrets());
        Self {
            kind,
            region,
            endpoint,
            pipeline,
            auth: ClientAuth::Signed(signer),
        }
    }

    pub fn kind(&self) -> ServiceKind {
        self.kind
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Resolves `path` against the service endpoint.
    pub fn url(&self, path: &str) -> Result<Url> {
        join(&self.endpoint, path)
    }

    /// Sends an authenticated request.
    ///
    /// A 401 on a token session triggers one re-authentication and retry.
    pub async fn request(
        &self,
        request: HttpRequest,
        cancel: &CancelToken,
    ) -> Result<HttpResponse> {
        match &self.auth {
            ClientAuth::Static(token) => {
                let request = request.header(AUTH_TOKEN_HEADER, token)?;
                Ok(self.pipeline.execute(request, None, cancel).await?)
            }
            ClientAuth::Signed(signer) => {
                Ok(self.pipeline.execute(request, Some(signer), cancel).await?)
            }
            ClientAuth::Session(session) => {
                let mut renewed = false;
                loop {
                    let state = session.snapshot().await;
                    let prepared = state.prepare(request.clone())?;
                    let pipeline = match state.token() {
                        Some(token) => self.pipeline.with_extra_secrets([token.to_string()]),
                        None => self.pipeline.clone(),
                    };
                    match pipeline.execute(prepared, state.signer(), cancel).await {
                        Err(e)
                            if e.status() == Some(401) && !renewed && state.token().is_some() =>
                        {
                            warn!(service = %self.kind, "Token rejected, re-authenticating");
                            session.reauthenticate(state.generation, cancel).await?;
                            renewed = true;
                        }
                        result => return Ok(result?),
                    }
                }
            }
        }
    }

    pub async fn get(&self, path: &str, cancel: &CancelToken) -> Result<HttpResponse> {
        self.request(HttpRequest::get(self.url(path)?), cancel).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancelToken,
    ) -> Result<T> {
        Ok(self.get(path, cancel).await?.json()?)
    }

    pub async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
        cancel: &CancelToken,
    ) -> Result<HttpResponse> {
        let request = HttpRequest::new(method, self.url(path)?).json(body)?;
        self.request(request, cancel).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancelToken,
    ) -> Result<T> {
        Ok(self
            .send_json(Method::POST, path, body, cancel)
            .await?
            .json()?)
    }

    pub async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancelToken,
    ) -> Result<T> {
        Ok(self.send_json(Method::PUT, path, body, cancel).await?.json()?)
    }

    pub async fn delete(&self, path: &str, cancel: &CancelToken) -> Result<()> {
        let request = HttpRequest::new(Method::DELETE, self.url(path)?);
        self.request(request, cancel).await?;
        Ok(())
    }

    /// Like [`ServiceClient::delete`], but an already-missing object is success.
    pub async fn delete_if_exists(&self, path: &str, cancel: &CancelToken) -> Result<bool> {
        match self.delete(path, cancel).await {
            Ok(()) => Ok(true),
            Err(CloudError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
