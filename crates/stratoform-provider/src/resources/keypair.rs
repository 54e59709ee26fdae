//! Compute key pairs
//!
//! A key pair whose name and public key match one already in the project is
//! adopted as shared: it is recorded but never created or deleted.

use super::region;
use crate::context::CallContext;
use crate::data::ResourceData;
use crate::diff::ResourceDiff;
use crate::error::{ProviderError, Result};
use crate::resource::{DataSource, Resource, SHARED, check_deleted};
use crate::schema::{Attribute, Schema, trim_space};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stratoform_cloud::{ServiceClient, ServiceKind};
use stratoform_transport::CancelToken;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
struct KeypairBody {
    name: String,
    public_key: String,
    #[serde(default)]
    fingerprint: String,
    #[serde(default)]
    private_key: Option<String>,
}

#[derive(Deserialize)]
struct KeypairEnvelope {
    keypair: KeypairBody,
}

#[derive(Serialize)]
struct CreateKeypair<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_key: Option<&'a str>,
}

#[derive(Serialize)]
struct CreateKeypairRequest<'a> {
    keypair: CreateKeypair<'a>,
}

async fn fetch(
    client: &ServiceClient,
    name: &str,
    cancel: &CancelToken,
) -> stratoform_cloud::Result<KeypairBody> {
    let envelope: KeypairEnvelope = client
        .get_json(&format!("os-keypairs/{name}"), cancel)
        .await?;
    Ok(envelope.keypair)
}

fn record(d: &mut ResourceData, keypair: &KeypairBody, region: &str) -> Result<()> {
    d.set("name", keypair.name.as_str())?;
    d.set("public_key", keypair.public_key.as_str())?;
    d.set("fingerprint", keypair.fingerprint.as_str())?;
    d.set("region", region)?;
    Ok(())
}

/// `stratoform_compute_keypair_v2`
pub struct Keypair;

#[async_trait]
impl Resource for Keypair {
    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("name", Attribute::string().required().force_new())
            .attribute(
                "public_key",
                Attribute::string()
                    .optional()
                    .computed()
                    .force_new()
                    .state_func(trim_space),
            )
            .attribute("private_key", Attribute::string().computed().sensitive())
            .attribute("fingerprint", Attribute::string().computed())
            .attribute("region", region())
            .attribute(SHARED, Attribute::bool().computed())
    }

    fn supports_shared(&self) -> bool {
        true
    }

    async fn create(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let client = ctx.client(ServiceKind::Compute, d).await?;
        let name = d.get_str("name").to_string();
        let public_key = d.get("public_key").and_then(|v| v.as_str()).map(str::to_string);
        let request = CreateKeypairRequest {
            keypair: CreateKeypair {
                name: &name,
                public_key: public_key.as_deref(),
            },
        };
        let created: KeypairEnvelope = client
            .post_json("os-keypairs", &request, ctx.cancel())
            .await?;
        d.set_id(created.keypair.name.as_str());
        if let Some(private_key) = &created.keypair.private_key {
            d.set("private_key", private_key.as_str())?;
        }
        d.set(SHARED, false)?;
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let client = ctx.client(ServiceKind::Compute, d).await?;
        let result = fetch(&client, d.id(), ctx.cancel()).await;
        if let Some(keypair) = check_deleted(d, result, "keypair")? {
            record(d, &keypair, client.region())?;
        }
        Ok(())
    }

    async fn delete(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let client = ctx.client(ServiceKind::Compute, d).await?;
        client
            .delete_if_exists(&format!("os-keypairs/{}", d.id()), ctx.cancel())
            .await?;
        d.clear_id();
        Ok(())
    }

    async fn import(&self, _ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        d.set(SHARED, false)
    }

    /// Looks for a key pair with the same name and public key.
    async fn customize_diff(&self, ctx: &CallContext, diff: &mut ResourceDiff) -> Result<()> {
        if !diff.will_create() {
            return Ok(());
        }
        let name = diff.get_str("name").to_string();
        let wanted = diff.get_str("public_key").to_string();
        if name.is_empty() {
            return diff.set_new_computed(SHARED);
        }
        if wanted.is_empty() {
            return diff.set_new(SHARED, false);
        }

        let region = match diff.get_str("region") {
            "" => ctx.meta()?.config().region.clone(),
            region => region.to_string(),
        };
        let client = ctx
            .meta()?
            .factory()
            .service_client(ServiceKind::Compute, Some(&region), None, ctx.cancel())
            .await?;
        let shared = match fetch(&client, &name, ctx.cancel()).await {
            Ok(existing) => existing.public_key.trim() == wanted,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e.into()),
        };
        debug!(name, shared, "Checked for an existing key pair");
        diff.set_new(SHARED, shared)
    }

    async fn adopt(&self, _ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let name = d.get_str("name");
        if name.is_empty() {
            return Err(ProviderError::invalid("`name` is required to adopt a key pair"));
        }
        let name = name.to_string();
        d.set_id(name);
        Ok(())
    }
}

/// `stratoform_compute_keypair_v2` data source: looks a key pair up by name.
pub struct KeypairLookup;

#[async_trait]
impl DataSource for KeypairLookup {
    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("name", Attribute::string().required())
            .attribute("public_key", Attribute::string().computed())
            .attribute("fingerprint", Attribute::string().computed())
            .attribute("region", Attribute::string().optional().computed())
    }

    async fn read(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let client = ctx.client(ServiceKind::Compute, d).await?;
        let keypair = fetch(&client, d.get_str("name"), ctx.cancel()).await?;
        d.set_id(keypair.name.as_str());
        record(d, &keypair, client.region())
    }
}
