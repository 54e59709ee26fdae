//! DNS record sets
//!
//! The identity is `<zone_id>/<recordset_id>`. A record set with the same
//! name, type and records already in the zone is adopted as shared.

use super::region;
use crate::context::CallContext;
use crate::data::ResourceData;
use crate::diff::ResourceDiff;
use crate::error::{ProviderError, Result};
use crate::reflect::{expand, flatten};
use crate::resource::{Resource, SHARED, check_deleted};
use crate::schema::{Attribute, Schema, int_between, one_of};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use stratoform_cloud::{
    CloudError, DELETED, ServiceClient, ServiceKind, StateChangeConf, wait_for_state,
};
use stratoform_transport::{CancelToken, HttpRequest, Method};
use tracing::debug;

const RECORD_TYPES: &[&str] = &["A", "AAAA", "CNAME", "MX", "NS", "PTR", "SRV", "TXT", "CAA"];

/// Fields sent on create; names match the schema and the API.
#[derive(Debug, Serialize, Deserialize)]
struct RecordSetOptions {
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    records: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ttl: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

#[derive(Serialize)]
struct UpdateRecordSet<'a> {
    records: &'a [String],
    ttl: i64,
    description: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordSet {
    id: String,
    zone_id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    records: Vec<String>,
    #[serde(default)]
    ttl: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct RecordSetList {
    #[serde(default)]
    recordsets: Vec<RecordSet>,
}

/// Appends the root dot that the service always reports.
fn fqdn(value: &Value) -> Value {
    match value {
        Value::String(name) if !name.ends_with('.') => Value::String(format!("{name}.")),
        other => other.clone(),
    }
}

fn split_id(id: &str) -> Result<(&str, &str)> {
    id.split_once('/')
        .filter(|(zone, recordset)| !zone.is_empty() && !recordset.is_empty())
        .ok_or_else(|| {
            ProviderError::invalid(format!("expected `<zone_id>/<recordset_id>`, got '{id}'"))
        })
}

async fn find_existing(
    client: &ServiceClient,
    zone_id: &str,
    name: &str,
    record_type: &str,
    cancel: &CancelToken,
) -> stratoform_cloud::Result<Option<RecordSet>> {
    let mut url = client.url(&format!("zones/{zone_id}/recordsets"))?;
    url.query_pairs_mut()
        .append_pair("name", name)
        .append_pair("type", record_type);
    let list: RecordSetList = client
        .request(HttpRequest::get(url), cancel)
        .await?
        .json()?;
    Ok(list
        .recordsets
        .into_iter()
        .find(|rs| rs.name == name && rs.record_type == record_type))
}

/// `stratoform_dns_recordset_v2`
pub struct DnsRecordSet {
    poll: Duration,
}

impl Default for DnsRecordSet {
    fn default() -> Self {
        Self {
            poll: Duration::from_secs(3),
        }
    }
}

impl DnsRecordSet {
    /// Uses `poll` as the floor between status checks.
    pub fn with_poll_interval(poll: Duration) -> Self {
        Self { poll }
    }

    async fn fetch(
        &self,
        client: &ServiceClient,
        zone_id: &str,
        id: &str,
        cancel: &CancelToken,
    ) -> stratoform_cloud::Result<RecordSet> {
        client
            .get_json(&format!("zones/{zone_id}/recordsets/{id}"), cancel)
            .await
    }

    async fn wait(
        &self,
        client: &ServiceClient,
        zone_id: &str,
        id: &str,
        pending: &[&str],
        target: &str,
        ctx: &CallContext,
    ) -> Result<()> {
        let conf = StateChangeConf::new(pending, &[target], ctx.timeout())
            .min_timeout(self.poll)
            .what(format!("record set {id}"));
        wait_for_state(&conf, ctx.cancel(), || async {
            let recordset = self.fetch(client, zone_id, id, ctx.cancel()).await?;
            let status = recordset.status.clone();
            Ok((Some(recordset), status))
        })
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Resource for DnsRecordSet {
    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("zone_id", Attribute::string().required().force_new())
            .attribute(
                "name",
                Attribute::string().required().force_new().state_func(fqdn),
            )
            .attribute(
                "type",
                Attribute::string()
                    .required()
                    .force_new()
                    .validate(one_of(RECORD_TYPES)),
            )
            .attribute("records", Attribute::set(Attribute::string()).required())
            .attribute(
                "ttl",
                Attribute::int()
                    .optional()
                    .default(300)
                    .validate(int_between(1, 2_147_483_647)),
            )
            .attribute("description", Attribute::string().optional())
            .attribute("status", Attribute::string().computed())
            .attribute("region", region())
            .attribute(SHARED, Attribute::bool().computed())
    }

    fn supports_shared(&self) -> bool {
        true
    }

    async fn create(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let zone_id = d.get_str("zone_id").to_string();
        let options: RecordSetOptions = expand(d.schema(), d.values())?;
        let client = ctx.client(ServiceKind::Dns, d).await?;
        let created: RecordSet = client
            .post_json(&format!("zones/{zone_id}/recordsets"), &options, ctx.cancel())
            .await?;
        d.set_id(format!("{zone_id}/{}", created.id));
        d.set(SHARED, false)?;

        self.wait(&client, &zone_id, &created.id, &["PENDING_CREATE"], "ACTIVE", ctx)
            .await?;
        self.read(ctx, d).await
    }

    async fn read(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let client = ctx.client(ServiceKind::Dns, d).await?;
        let id = d.id().to_string();
        let (zone_id, recordset_id) = split_id(&id)?;
        let result = self.fetch(&client, zone_id, recordset_id, ctx.cancel()).await;
        let Some(recordset) = check_deleted(d, result, "record set")? else {
            return Ok(());
        };
        let values = flatten(d.schema(), &recordset)?;
        d.set_all(values)?;
        d.set("region", client.region())?;
        Ok(())
    }

    async fn update(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        if d.has_change("records") || d.has_change("ttl") || d.has_change("description") {
            let client = ctx.client(ServiceKind::Dns, d).await?;
            let id = d.id().to_string();
            let (zone_id, recordset_id) = split_id(&id)?;
            let records = d.get_strings("records");
            let request = UpdateRecordSet {
                records: &records,
                ttl: d.get_i64("ttl"),
                description: d.get_str("description"),
            };
            client
                .send_json(
                    Method::PUT,
                    &format!("zones/{zone_id}/recordsets/{recordset_id}"),
                    &request,
                    ctx.cancel(),
                )
                .await?;
            self.wait(&client, zone_id, recordset_id, &["PENDING_UPDATE"], "ACTIVE", ctx)
                .await?;
        }
        self.read(ctx, d).await
    }

    async fn delete(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let client = ctx.client(ServiceKind::Dns, d).await?;
        let id = d.id().to_string();
        let (zone_id, recordset_id) = split_id(&id)?;
        let path = format!("zones/{zone_id}/recordsets/{recordset_id}");
        if client.delete_if_exists(&path, ctx.cancel()).await? {
            self.wait(&client, zone_id, recordset_id, &["ACTIVE", "PENDING_DELETE"], DELETED, ctx)
                .await?;
        }
        d.clear_id();
        Ok(())
    }

    async fn import(&self, _ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let id = d.id().to_string();
        let (zone_id, _) = split_id(&id)?;
        d.set("zone_id", zone_id)?;
        d.set(SHARED, false)
    }

    /// Marks the record set shared when an identical one already exists.
    async fn customize_diff(&self, ctx: &CallContext, diff: &mut ResourceDiff) -> Result<()> {
        if !diff.will_create() {
            return Ok(());
        }
        let zone_id = diff.get_str("zone_id").to_string();
        let name = diff.get_str("name").to_string();
        let record_type = diff.get_str("type").to_string();
        if zone_id.is_empty() || name.is_empty() || record_type.is_empty() {
            return diff.set_new_computed(SHARED);
        }

        let region = match diff.get_str("region") {
            "" => ctx.meta()?.config().region.clone(),
            region => region.to_string(),
        };
        let client = ctx
            .meta()?
            .factory()
            .service_client(ServiceKind::Dns, Some(&region), None, ctx.cancel())
            .await?;
        let wanted: BTreeSet<String> = diff.get_strings("records").into_iter().collect();
        let shared = find_existing(&client, &zone_id, &name, &record_type, ctx.cancel())
            .await?
            .is_some_and(|existing| {
                existing.records.into_iter().collect::<BTreeSet<_>>() == wanted
            });
        debug!(zone_id, name, record_type, shared, "Checked for an existing record set");
        diff.set_new(SHARED, shared)
    }

    async fn adopt(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let client = ctx.client(ServiceKind::Dns, d).await?;
        let zone_id = d.get_str("zone_id").to_string();
        let name = d.get_str("name").to_string();
        let record_type = d.get_str("type").to_string();
        let existing = find_existing(&client, &zone_id, &name, &record_type, ctx.cancel())
            .await?
            .ok_or_else(|| {
                CloudError::NotFound(format!(
                    "record set {name} ({record_type}) in zone {zone_id}"
                ))
            })?;
        d.set_id(format!("{zone_id}/{}", existing.id));
        Ok(())
    }
}
