//! Provider dispatch
//!
//! Routes each engine operation to the named resource or data source,
//! applies the shared-vs-managed policy and absorbs "not found" during reads
//! and deletes.

use crate::context::{CallContext, ProviderMeta};
use crate::data::ResourceData;
use crate::diff::{PlannedChange, ResourceDiff};
use crate::error::{ProviderError, Result};
use crate::resource::{DataSource, Resource, SHARED};
use crate::schema::{Attribute, Schema, one_of};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use stratoform_cloud::{ClientFactory, CloudError};
use stratoform_config::{Config, ProviderOptions};
use stratoform_transport::{CancelToken, Pipeline, PipelineSettings};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

struct Registered<T: ?Sized> {
    node: Arc<T>,
    schema: Arc<Schema>,
}

pub struct Provider {
    resources: BTreeMap<String, Registered<dyn Resource>>,
    data_sources: BTreeMap<String, Registered<dyn DataSource>>,
    meta: RwLock<Option<Arc<ProviderMeta>>>,
    debug: bool,
}

/// Schema of the provider block.
pub fn provider_schema() -> Schema {
    let text = || Attribute::string().optional();
    Schema::new()
        .attribute("access_key", text().sensitive())
        .attribute("secret_key", text().sensitive())
        .attribute("security_token", text().sensitive())
        .attribute("auth_url", text().describe("Identity service endpoint"))
        .attribute("region", text())
        .attribute("user_name", text())
        .attribute("user_id", text())
        .attribute("password", text().sensitive())
        .attribute("tenant_id", text())
        .attribute("tenant_name", text())
        .attribute("token", text().sensitive())
        .attribute("domain_id", text())
        .attribute("domain_name", text())
        .attribute("insecure", Attribute::bool().optional())
        .attribute(
            "endpoint_type",
            text().validate(one_of(&["public", "internal", "admin", ""])),
        )
        .attribute("cacert_file", text())
        .attribute("cert", text())
        .attribute("key", text().sensitive())
        .attribute("swauth", Attribute::bool().optional())
        .attribute("cloud", text().describe("Catalogue entry to load defaults from"))
        .attribute("agency_name", text())
        .attribute("agency_domain_name", text())
        .attribute("delegated_project", text())
        .attribute("max_retries", Attribute::int().optional())
}

/// `null` means "no object"; anything else must be an object.
fn state_object(value: &Value) -> Result<Option<Map<String, Value>>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(object) => Ok(Some(object.clone())),
        other => Err(ProviderError::invalid(format!(
            "expected an object or null, got {other}"
        ))),
    }
}

fn absorb_not_found(result: Result<()>, d: &mut ResourceData, type_name: &str) -> Result<()> {
    match result {
        Err(e) if e.is_not_found() => {
            warn!(type_name, id = d.id(), error = %e, "Object already gone");
            d.clear_id();
            Ok(())
        }
        other => other,
    }
}

impl Provider {
    /// A provider with no resources registered.
    pub fn empty(debug: bool) -> Self {
        Self {
            resources: BTreeMap::new(),
            data_sources: BTreeMap::new(),
            meta: RwLock::new(None),
            debug,
        }
    }

    /// A provider with every built-in resource and data source.
    pub fn new(debug: bool) -> Self {
        crate::resources::register(Self::empty(debug))
    }

    pub fn with_resource(mut self, name: &str, resource: impl Resource + 'static) -> Self {
        let schema = Arc::new(resource.schema());
        self.resources.insert(
            name.to_string(),
            Registered {
                node: Arc::new(resource),
                schema,
            },
        );
        self
    }

    pub fn with_data_source(mut self, name: &str, data_source: impl DataSource + 'static) -> Self {
        let schema = Arc::new(data_source.schema());
        self.data_sources.insert(
            name.to_string(),
            Registered {
                node: Arc::new(data_source),
                schema,
            },
        );
        self
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn data_source_names(&self) -> impl Iterator<Item = &str> {
        self.data_sources.keys().map(String::as_str)
    }

    fn resource(&self, type_name: &str) -> Result<&Registered<dyn Resource>> {
        self.resources
            .get(type_name)
            .ok_or_else(|| ProviderError::UnknownType {
                kind: "resource",
                name: type_name.to_string(),
            })
    }

    fn data_source(&self, type_name: &str) -> Result<&Registered<dyn DataSource>> {
        self.data_sources
            .get(type_name)
            .ok_or_else(|| ProviderError::UnknownType {
                kind: "data source",
                name: type_name.to_string(),
            })
    }

    async fn context(&self, cancel: &CancelToken, timeout: Duration) -> CallContext {
        CallContext::new(self.meta.read().await.clone(), cancel.clone(), timeout)
    }

    /// The full schema: provider block, resources and data sources.
    pub fn schema(&self) -> Value {
        let resources: Map<String, Value> = self
            .resources
            .iter()
            .map(|(name, r)| (name.clone(), r.schema.to_json()))
            .collect();
        let data_sources: Map<String, Value> = self
            .data_sources
            .iter()
            .map(|(name, r)| (name.clone(), r.schema.to_json()))
            .collect();
        json!({
            "provider": provider_schema().to_json(),
            "resource_schemas": resources,
            "data_source_schemas": data_sources,
        })
    }

    /// Loads the configuration and authenticates.
    pub async fn configure(
        &self,
        options: &Value,
        host_version: &str,
        cancel: &CancelToken,
    ) -> Result<()> {
        if let Some(block) = state_object(options)? {
            provider_schema().validate(&block).map_err(|e| match e {
                ProviderError::Invalid(message) => {
                    stratoform_config::ConfigError::Invalid(message).into()
                }
                other => other,
            })?;
        }
        let options = ProviderOptions::from_value(options)?;
        let mut config = Config::load(&options)?;
        config.host_version = host_version.to_string();
        let config = Arc::new(config);

        let pipeline = Pipeline::new(PipelineSettings::from_config(&config, self.debug))?;
        let factory = ClientFactory::connect(config.clone(), pipeline, cancel).await?;
        self.attach(ProviderMeta::new(factory)).await;
        info!(
            region = %config.region,
            endpoint_type = %config.endpoint_type,
            "Provider configured"
        );
        Ok(())
    }

    /// Installs an already-built context, replacing any previous one.
    pub async fn attach(&self, meta: ProviderMeta) {
        *self.meta.write().await = Some(Arc::new(meta));
    }

    pub fn validate_resource(&self, type_name: &str, config: &Value) -> Result<()> {
        let entry = self.resource(type_name)?;
        match state_object(config)? {
            Some(config) => entry.schema.validate(&config),
            None => Ok(()),
        }
    }

    pub fn validate_data_source(&self, type_name: &str, config: &Value) -> Result<()> {
        let entry = self.data_source(type_name)?;
        match state_object(config)? {
            Some(config) => entry.schema.validate(&config),
            None => Ok(()),
        }
    }

    pub async fn plan_resource_change(
        &self,
        type_name: &str,
        prior: &Value,
        config: &Value,
        cancel: &CancelToken,
    ) -> Result<PlannedChange> {
        let entry = self.resource(type_name)?;
        let prior = state_object(prior)?;
        let Some(config) = state_object(config)? else {
            return Ok(PlannedChange::destroy(prior.is_some()));
        };
        entry.schema.validate(&config)?;

        let mut diff = ResourceDiff::propose(entry.schema.clone(), prior, config);
        let ctx = self.context(cancel, entry.node.timeouts().read).await;
        entry.node.customize_diff(&ctx, &mut diff).await?;
        let change = diff.finish();
        debug!(type_name, action = ?change.action, replace = ?change.requires_replace, "Planned");
        Ok(change)
    }

    pub async fn apply_resource_change(
        &self,
        type_name: &str,
        prior: &Value,
        planned: &Value,
        cancel: &CancelToken,
    ) -> Result<Value> {
        let entry = self.resource(type_name)?;
        let node = &entry.node;
        let timeouts = node.timeouts();

        match (state_object(prior)?, state_object(planned)?) {
            (None, None) => Ok(Value::Null),
            (Some(prior), None) => {
                let mut d = ResourceData::new(entry.schema.clone(), prior);
                let ctx = self.context(cancel, timeouts.delete).await;
                if node.supports_shared() && d.get_bool(SHARED) {
                    info!(type_name, id = d.id(), "Forgetting shared object without deleting it");
                } else {
                    let result = node.delete(&ctx, &mut d).await;
                    absorb_not_found(result, &mut d, type_name)?;
                    info!(type_name, id = d.id(), "Deleted");
                }
                Ok(Value::Null)
            }
            (None, Some(planned)) => {
                let mut d = ResourceData::new(entry.schema.clone(), planned);
                d.clear_id();
                let ctx = self.context(cancel, timeouts.create).await;
                if node.supports_shared() && d.get_bool(SHARED) {
                    node.adopt(&ctx, &mut d).await?;
                    info!(type_name, id = d.id(), "Adopted existing object as shared");
                    node.read(&ctx, &mut d).await?;
                } else {
                    node.create(&ctx, &mut d).await?;
                    info!(type_name, id = d.id(), "Created");
                }
                Ok(d.to_state())
            }
            (Some(prior), Some(planned)) => {
                let mut d = ResourceData::new(entry.schema.clone(), planned).with_prior(prior);
                let ctx = self.context(cancel, timeouts.update).await;
                node.update(&ctx, &mut d).await?;
                info!(type_name, id = d.id(), "Updated");
                Ok(d.to_state())
            }
        }
    }

    pub async fn read_resource(
        &self,
        type_name: &str,
        state: &Value,
        cancel: &CancelToken,
    ) -> Result<Value> {
        let entry = self.resource(type_name)?;
        let Some(state) = state_object(state)? else {
            return Ok(Value::Null);
        };
        let mut d = ResourceData::new(entry.schema.clone(), state.clone()).with_prior(state);
        if d.id().is_empty() {
            return Ok(Value::Null);
        }
        let ctx = self.context(cancel, entry.node.timeouts().read).await;
        let result = entry.node.read(&ctx, &mut d).await;
        absorb_not_found(result, &mut d, type_name)?;
        Ok(d.to_state())
    }

    pub async fn import_resource_state(
        &self,
        type_name: &str,
        id: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<Value>> {
        let entry = self.resource(type_name)?;
        let mut d = ResourceData::new(entry.schema.clone(), Map::new());
        d.set_id(id);
        let ctx = self.context(cancel, entry.node.timeouts().read).await;
        entry.node.import(&ctx, &mut d).await?;
        let result = entry.node.read(&ctx, &mut d).await;
        absorb_not_found(result, &mut d, type_name)?;
        if d.id().is_empty() {
            return Err(CloudError::NotFound(format!(
                "cannot import {type_name} '{id}': the object does not exist"
            ))
            .into());
        }
        info!(type_name, id = d.id(), "Imported");
        Ok(vec![d.to_state()])
    }

    pub async fn read_data_source(
        &self,
        type_name: &str,
        config: &Value,
        cancel: &CancelToken,
    ) -> Result<Value> {
        let entry = self.data_source(type_name)?;
        let config = state_object(config)?.unwrap_or_default();
        entry.schema.validate(&config)?;
        let mut d = ResourceData::new(entry.schema.clone(), config);
        d.clear_id();
        let ctx = self.context(cancel, crate::resource::DEFAULT_TIMEOUT).await;
        entry.node.read(&ctx, &mut d).await?;
        Ok(d.to_state())
    }
}
