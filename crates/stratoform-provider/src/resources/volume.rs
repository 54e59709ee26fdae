//! Block storage volumes

use super::region;
use crate::context::CallContext;
use crate::data::ResourceData;
use crate::error::Result;
use crate::resource::{Resource, check_deleted};
use crate::schema::{Attribute, Schema, int_between};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use stratoform_cloud::{
    DELETED, ServiceClient, ServiceKind, StateChangeConf, Tags, tags, wait_for_state,
};
use stratoform_transport::{CancelToken, Method};

/// Tag API resource type for volumes.
const TAG_RESOURCE: &str = "cloudvolumes";

fn non_empty(value: Option<String>) -> Value {
    value.filter(|s| !s.is_empty()).map_or(Value::Null, Value::String)
}

#[derive(Debug, Clone, Deserialize)]
struct VolumeBody {
    id: String,
    status: String,
    size: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    volume_type: Option<String>,
    #[serde(default)]
    availability_zone: Option<String>,
}

#[derive(Deserialize)]
struct VolumeEnvelope {
    volume: VolumeBody,
}

#[derive(Deserialize)]
struct TagsEnvelope {
    #[serde(default)]
    tags: Tags,
}

#[derive(Serialize)]
struct CreateVolume<'a> {
    size: i64,
    #[serde(skip_serializing_if = "str::is_empty")]
    name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    volume_type: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    availability_zone: &'a str,
}

#[derive(Serialize)]
struct UpdateVolume<'a> {
    name: &'a str,
    description: &'a str,
}

#[derive(Serialize)]
struct VolumeRequest<T> {
    volume: T,
}

/// `stratoform_blockstorage_volume_v2`
pub struct Volume {
    poll: Duration,
}

impl Default for Volume {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(3),
        }
    }
}

impl Volume {
    /// Uses `poll` as the floor between status checks.
    pub fn with_poll_interval(poll: Duration) -> Self {
        Self { poll }
    }

    async fn fetch(
        &self,
        client: &ServiceClient,
        id: &str,
        cancel: &CancelToken,
    ) -> stratoform_cloud::Result<VolumeBody> {
        let envelope: VolumeEnvelope = client.get_json(&format!("volumes/{id}"), cancel).await?;
        Ok(envelope.volume)
    }

    async fn wait(
        &self,
        client: &ServiceClient,
        id: &str,
        pending: &[&str],
        target: &str,
        ctx: &CallContext,
    ) -> Result<()> {
        let conf = StateChangeConf::new(pending, &[target], ctx.timeout())
            .delay(self.poll / 3)
            .min_timeout(self.poll)
            .what(format!("volume {id}"));
        wait_for_state(&conf, ctx.cancel(), || async {
            let volume = self.fetch(client, id, ctx.cancel()).await?;
            let status = volume.status.clone();
            Ok((Some(volume), status))
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Resource for Volume {
    fn schema(&self) -> Schema {
        Schema::new()
            .attribute(
                "size",
                Attribute::int()
                    .required()
                    .force_new()
                    .validate(int_between(1, 32768))
                    .describe("Size in GiB"),
            )
            .attribute("name", Attribute::string().optional())
            .attribute("description", Attribute::string().optional())
            .attribute("volume_type", Attribute::string().optional().computed().force_new())
            .attribute(
                "availability_zone",
                Attribute::string().optional().computed().force_new(),
            )
            .attribute("tags", Attribute::map(Attribute::string()).optional())
            .attribute("status", Attribute::string().computed())
            .attribute("region", region())
    }

    async fn create(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let client = ctx.client(ServiceKind::BlockStorage, d).await?;
        let request = VolumeRequest {
            volume: CreateVolume {
                size: d.get_i64("size"),
                name: d.get_str("name"),
                description: d.get_str("description"),
                volume_type: d.get_str("volume_type"),
                availability_zone: d.get_str("availability_zone"),
            },
        };
        let created: VolumeEnvelope = client.post_json("volumes", &request, ctx.cancel()).await?;
        let id = created.volume.id;
        d.set_id(id.as_str());

        self.wait(&client, &id, &["creating", "downloading"], "available", ctx)
            .await?;
        tags::reconcile(
            &client,
            TAG_RESOURCE,
            &id,
            &Tags::new(),
            &d.get_tags("tags"),
            ctx.cancel(),
        )
        .await?;
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let client = ctx.client(ServiceKind::BlockStorage, d).await?;
        let result = self.fetch(&client, d.id(), ctx.cancel()).await;
        let Some(volume) = check_deleted(d, result, "volume")? else {
            return Ok(());
        };
        let tags: TagsEnvelope = client
            .get_json(&format!("{TAG_RESOURCE}/{}/tags", volume.id), ctx.cancel())
            .await?;

        d.set("size", volume.size)?;
        d.set("name", non_empty(volume.name))?;
        d.set("description", non_empty(volume.description))?;
        d.set("volume_type", volume.volume_type.unwrap_or_default())?;
        d.set("availability_zone", volume.availability_zone.unwrap_or_default())?;
        d.set("status", volume.status)?;
        d.set("region", client.region())?;
        d.set(
            "tags",
            tags.tags
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect::<Map<String, Value>>(),
        )?;
        Ok(())
    }

    async fn update(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let client = ctx.client(ServiceKind::BlockStorage, d).await?;
        let id = d.id().to_string();
        if d.has_change("name") || d.has_change("description") {
            let request = VolumeRequest {
                volume: UpdateVolume {
                    name: d.get_str("name"),
                    description: d.get_str("description"),
                },
            };
            client
                .send_json(Method::PUT, &format!("volumes/{id}"), &request, ctx.cancel())
                .await?;
        }
        if d.has_change("tags") {
            tags::reconcile(
                &client,
                TAG_RESOURCE,
                &id,
                &d.prior_tags("tags"),
                &d.get_tags("tags"),
                ctx.cancel(),
            )
            .await?;
        }
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let client = ctx.client(ServiceKind::BlockStorage, d).await?;
        let id = d.id().to_string();
        if client
            .delete_if_exists(&format!("volumes/{id}"), ctx.cancel())
            .await?
        {
            self.wait(&client, &id, &["deleting", "available"], DELETED, ctx)
                .await?;
        }
        d.clear_id();
        Ok(())
    }
}
