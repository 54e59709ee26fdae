//! CCE cluster nodes
//!
//! Node creation is asynchronous: the API returns a job whose sub-job of
//! kind `CreateNodeVM` eventually names the node. Mutations of one cluster
//! are serialised through a named mutex.

use super::region;
use crate::context::CallContext;
use crate::data::ResourceData;
use crate::error::{ProviderError, Result};
use crate::reflect::{expand, flatten};
use crate::resource::{Resource, Timeouts, check_deleted};
use crate::schema::{Attribute, Schema, int_between};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use stratoform_cloud::{
    CceJobs, CloudError, DELETED, ServiceClient, ServiceKind, StateChangeConf, wait_for_job,
    wait_for_state,
};
use stratoform_transport::{CancelToken, Method};
use tracing::info;

/// Sub-job whose resource ID is the new node.
const CREATE_VM_JOB: &str = "CreateNodeVM";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct VolumeSpec {
    size: i64,
    volumetype: String,
}

/// Schema-shaped node arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeArgs {
    cluster_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    flavor_id: String,
    availability_zone: String,
    key_pair: String,
    root_volume: VolumeSpec,
    data_volumes: Vec<VolumeSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct NodeMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeLogin {
    #[serde(rename = "sshKey")]
    ssh_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeSpec {
    flavor: String,
    az: String,
    login: NodeLogin,
    root_volume: VolumeSpec,
    data_volumes: Vec<VolumeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeStatus {
    #[serde(default)]
    phase: String,
    #[serde(default, rename = "jobID")]
    job_id: String,
    #[serde(default, rename = "privateIP")]
    private_ip: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateNodeRequest<'a> {
    kind: &'a str,
    api_version: &'a str,
    metadata: NodeMetadata,
    spec: NodeSpec,
}

#[derive(Debug, Deserialize)]
struct NodeBody {
    metadata: NodeMetadata,
    spec: NodeSpec,
    #[serde(default)]
    status: NodeStatus,
}

/// Response to a create request; only the job matters.
#[derive(Debug, Deserialize)]
struct AcceptedNode {
    #[serde(default)]
    status: NodeStatus,
}

#[derive(Serialize)]
struct RenameNode<'a> {
    metadata: RenameMetadata<'a>,
}

#[derive(Serialize)]
struct RenameMetadata<'a> {
    name: &'a str,
}

fn volume_schema() -> Schema {
    Schema::new()
        .attribute("size", Attribute::int().required().validate(int_between(10, 32768)))
        .attribute("volumetype", Attribute::string().required())
}

fn lock_key(cluster_id: &str) -> String {
    format!("cce-cluster/{cluster_id}")
}

/// `stratoform_cce_node_v3`
pub struct CceNode {
    poll: Duration,
}

impl Default for CceNode {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(10),
        }
    }
}

impl CceNode {
    /// Uses `poll` as the floor between job and status checks.
    pub fn with_poll_interval(poll: Duration) -> Self {
        Self { poll }
    }

    async fn fetch(
        &self,
        client: &ServiceClient,
        cluster_id: &str,
        id: &str,
        cancel: &CancelToken,
    ) -> stratoform_cloud::Result<NodeBody> {
        client
            .get_json(&format!("clusters/{cluster_id}/nodes/{id}"), cancel)
            .await
    }
}

#[async_trait]
impl Resource for CceNode {
    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("cluster_id", Attribute::string().required().force_new())
            .attribute("name", Attribute::string().optional().computed())
            .attribute("flavor_id", Attribute::string().required().force_new())
            .attribute("availability_zone", Attribute::string().required().force_new())
            .attribute("key_pair", Attribute::string().required().force_new())
            .attribute(
                "root_volume",
                Attribute::block(volume_schema())
                    .required()
                    .max_items(1)
                    .force_new(),
            )
            .attribute(
                "data_volumes",
                Attribute::block(volume_schema()).required().force_new(),
            )
            .attribute(
                "labels",
                Attribute::map(Attribute::string()).optional().force_new(),
            )
            .attribute("private_ip", Attribute::string().computed())
            .attribute("status", Attribute::string().computed())
            .attribute("region", region())
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts {
            create: Duration::from_secs(20 * 60),
            delete: Duration::from_secs(20 * 60),
            ..Timeouts::default()
        }
    }

    async fn create(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let args: NodeArgs = expand(d.schema(), d.values())?;
        let client = ctx.client(ServiceKind::Cce, d).await?;
        let request = CreateNodeRequest {
            kind: "Node",
            api_version: "v3",
            metadata: NodeMetadata {
                name: args.name.clone().unwrap_or_default(),
                labels: args.labels.clone(),
                ..NodeMetadata::default()
            },
            spec: NodeSpec {
                flavor: args.flavor_id.clone(),
                az: args.availability_zone.clone(),
                login: NodeLogin {
                    ssh_key: args.key_pair.clone(),
                },
                root_volume: args.root_volume.clone(),
                data_volumes: args.data_volumes.clone(),
                count: Some(1),
            },
        };

        let job_id = {
            let _guard = ctx.mutexes()?.lock(&lock_key(&args.cluster_id)).await;
            let accepted: AcceptedNode = client
                .post_json(
                    &format!("clusters/{}/nodes", args.cluster_id),
                    &request,
                    ctx.cancel(),
                )
                .await?;
            accepted.status.job_id
        };
        if job_id.is_empty() {
            let reason = "node creation returned no job ID".to_string();
            return Err(CloudError::InvalidResponse(reason).into());
        }

        let jobs = CceJobs(&client);
        let job = wait_for_job(&jobs, &job_id, ctx.timeout(), self.poll, ctx.cancel()).await?;
        let node_id = job.resource_of(CREATE_VM_JOB).ok_or_else(|| {
            CloudError::InvalidResponse(format!(
                "job {job_id} has no {CREATE_VM_JOB} sub-job with a resource ID"
            ))
        })?;
        info!(cluster_id = %args.cluster_id, node_id, "Node created");
        d.set_id(node_id);
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let client = ctx.client(ServiceKind::Cce, d).await?;
        let cluster_id = d.get_str("cluster_id").to_string();
        let result = self.fetch(&client, &cluster_id, d.id(), ctx.cancel()).await;
        let Some(node) = check_deleted(d, result, "cce node")? else {
            return Ok(());
        };

        let args = NodeArgs {
            cluster_id,
            name: Some(node.metadata.name).filter(|n| !n.is_empty()),
            flavor_id: node.spec.flavor,
            availability_zone: node.spec.az,
            key_pair: node.spec.login.ssh_key,
            root_volume: node.spec.root_volume,
            data_volumes: node.spec.data_volumes,
            labels: node.metadata.labels,
            private_ip: Some(node.status.private_ip).filter(|ip| !ip.is_empty()),
            status: Some(node.status.phase).filter(|p| !p.is_empty()),
        };
        let values = flatten(d.schema(), &args)?;
        d.set_all(values)?;
        d.set("region", client.region())?;
        Ok(())
    }

    async fn update(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        if d.has_change("name") {
            let client = ctx.client(ServiceKind::Cce, d).await?;
            let cluster_id = d.get_str("cluster_id").to_string();
            let _guard = ctx.mutexes()?.lock(&lock_key(&cluster_id)).await;
            let request = RenameNode {
                metadata: RenameMetadata {
                    name: d.get_str("name"),
                },
            };
            client
                .send_json(
                    Method::PUT,
                    &format!("clusters/{cluster_id}/nodes/{}", d.id()),
                    &request,
                    ctx.cancel(),
                )
                .await?;
        }
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let client = ctx.client(ServiceKind::Cce, d).await?;
        let cluster_id = d.get_str("cluster_id").to_string();
        let id = d.id().to_string();
        let deleted = {
            let _guard = ctx.mutexes()?.lock(&lock_key(&cluster_id)).await;
            client
                .delete_if_exists(&format!("clusters/{cluster_id}/nodes/{id}"), ctx.cancel())
                .await?
        };
        if deleted {
            let pending = ["Deleting", "Active", "Abnormal"];
            let conf = StateChangeConf::new(&pending, &[DELETED], ctx.timeout())
                .delay(self.poll / 2)
                .min_timeout(self.poll)
                .what(format!("cce node {id}"));
            wait_for_state(&conf, ctx.cancel(), || async {
                let node = self.fetch(&client, &cluster_id, &id, ctx.cancel()).await?;
                let phase = node.status.phase.clone();
                Ok((Some(node), phase))
            })
            .await?;
        }
        d.clear_id();
        Ok(())
    }

    /// Accepts `<cluster_id>/<node_id>`.
    async fn import(&self, _ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let Some((cluster_id, node_id)) = d.id().split_once('/') else {
            return Err(ProviderError::invalid(format!(
                "expected `<cluster_id>/<node_id>`, got '{}'",
                d.id()
            )));
        };
        let (cluster_id, node_id) = (cluster_id.to_string(), node_id.to_string());
        d.set("cluster_id", cluster_id)?;
        d.set_id(node_id);
        Ok(())
    }
}
