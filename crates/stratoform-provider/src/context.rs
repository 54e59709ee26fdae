//! State shared by every callback of one provider invocation

use crate::data::ResourceData;
use crate::error::{ProviderError, Result};
use std::sync::Arc;
use std::time::Duration;
use stratoform_cloud::{ClientFactory, MutexRegistry, ObsClient, ServiceClient, ServiceKind};
use stratoform_config::Config;
use stratoform_transport::CancelToken;

/// Everything `Configure` builds: the client factory and the named locks.
pub struct ProviderMeta {
    factory: ClientFactory,
    mutexes: MutexRegistry,
}

impl ProviderMeta {
    pub fn new(factory: ClientFactory) -> Self {
        Self {
            factory,
            mutexes: MutexRegistry::new(),
        }
    }

    pub fn factory(&self) -> &ClientFactory {
        &self.factory
    }

    pub fn mutexes(&self) -> &MutexRegistry {
        &self.mutexes
    }

    pub fn config(&self) -> &Config {
        self.factory.config()
    }
}

/// Passed to every resource callback.
#[derive(Clone)]
pub struct CallContext {
    meta: Option<Arc<ProviderMeta>>,
    cancel: CancelToken,
    timeout: Duration,
}

impl CallContext {
    pub fn new(meta: Option<Arc<ProviderMeta>>, cancel: CancelToken, timeout: Duration) -> Self {
        Self {
            meta,
            cancel,
            timeout,
        }
    }

    pub fn meta(&self) -> Result<&ProviderMeta> {
        self.meta.as_deref().ok_or(ProviderError::NotConfigured)
    }

    pub fn mutexes(&self) -> Result<&MutexRegistry> {
        Ok(self.meta()?.mutexes())
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    /// Budget for the current operation.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The resource's own `region`, falling back to the provider's.
    pub fn region(&self, d: &ResourceData) -> Result<String> {
        let region = d.get_str("region");
        if !region.is_empty() {
            return Ok(region.to_string());
        }
        let configured = &self.meta()?.config().region;
        if configured.is_empty() {
            return Err(ProviderError::invalid(
                "`region` must be set on the provider or the resource",
            ));
        }
        Ok(configured.clone())
    }

    /// A project-scoped client in the resource's region.
    pub async fn client(&self, kind: ServiceKind, d: &ResourceData) -> Result<ServiceClient> {
        let region = self.region(d)?;
        Ok(self
            .meta()?
            .factory()
            .service_client(kind, Some(&region), None, &self.cancel)
            .await?)
    }

    pub async fn identity_client(&self) -> Result<ServiceClient> {
        Ok(self.meta()?.factory().identity_client(false, &self.cancel).await?)
    }

    pub async fn object_store(&self, d: &ResourceData) -> Result<ObsClient> {
        let region = self.region(d)?;
        Ok(self
            .meta()?
            .factory()
            .object_store(Some(&region), &self.cancel)
            .await?)
    }
}
