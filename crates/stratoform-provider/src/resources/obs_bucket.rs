//! Object storage buckets
//!
//! Requests are signed with temporary credentials obtained once per
//! provider, or go through legacy storage auth when `swauth` is set.

use super::region;
use crate::context::CallContext;
use crate::data::ResourceData;
use crate::error::Result;
use crate::resource::Resource;
use crate::schema::{Attribute, Schema, one_of, string_length};
use async_trait::async_trait;
use stratoform_cloud::obs::LOG_TARGET;
use stratoform_transport::Url;
use tracing::{debug, warn};

const ACLS: &[&str] = &[
    "private",
    "public-read",
    "public-read-write",
    "authenticated-read",
    "bucket-owner-read",
    "bucket-owner-full-control",
    "log-delivery-write",
];

const STORAGE_CLASSES: &[&str] = &["STANDARD", "WARM", "COLD"];

/// `stratoform_obs_bucket`
pub struct ObsBucket;

#[async_trait]
impl Resource for ObsBucket {
    fn schema(&self) -> Schema {
        Schema::new()
            .attribute(
                "bucket",
                Attribute::string()
                    .required()
                    .force_new()
                    .validate(string_length(3, 63)),
            )
            .attribute(
                "acl",
                Attribute::string()
                    .optional()
                    .default("private")
                    .validate(one_of(ACLS)),
            )
            .attribute(
                "storage_class",
                Attribute::string()
                    .optional()
                    .computed()
                    .force_new()
                    .validate(one_of(STORAGE_CLASSES)),
            )
            .attribute("bucket_domain_name", Attribute::string().computed())
            .attribute("region", region())
    }

    async fn create(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let obs = ctx.object_store(d).await?;
        let bucket = d.get_str("bucket").to_string();
        let storage_class = d.get("storage_class").and_then(|v| v.as_str()).map(str::to_string);
        obs.create_bucket(&bucket, d.get_str("acl"), storage_class.as_deref(), ctx.cancel())
            .await?;
        d.set_id(bucket);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let obs = ctx.object_store(d).await?;
        let bucket = d.id().to_string();
        if !obs.bucket_exists(&bucket, ctx.cancel()).await? {
            warn!(target: LOG_TARGET, bucket, "Bucket no longer exists, removing from state");
            d.clear_id();
            return Ok(());
        }
        let storage_class = obs
            .bucket_storage_class(&bucket, ctx.cancel())
            .await?
            .unwrap_or_else(|| "STANDARD".to_string());
        let host = Url::parse(obs.endpoint())
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_default();
        d.set("bucket_domain_name", format!("{bucket}.{host}"))?;
        d.set("storage_class", storage_class)?;
        d.set("region", obs.region())?;
        d.set("bucket", bucket)?;
        Ok(())
    }

    async fn update(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        if d.has_change("acl") {
            let obs = ctx.object_store(d).await?;
            debug!(target: LOG_TARGET, bucket = d.id(), acl = d.get_str("acl"), "Changing ACL");
            obs.set_bucket_acl(d.id(), d.get_str("acl"), ctx.cancel()).await?;
        }
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let obs = ctx.object_store(d).await?;
        obs.delete_bucket(d.id(), ctx.cancel()).await?;
        d.clear_id();
        Ok(())
    }

    /// The imported identity is the bucket name; the ACL cannot be read back.
    async fn import(&self, _ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let bucket = d.id().to_string();
        d.set("bucket", bucket)?;
        d.set("acl", "private")
    }
}
