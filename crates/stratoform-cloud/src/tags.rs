//! Tag reconciliation
//!
//! Tags live at `<service>/<resource_type>/<resource_id>/tags/action` and are
//! changed with batch `delete` and `create` actions.

use crate::client::ServiceClient;
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use stratoform_transport::{CancelToken, Method};
use tracing::debug;

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Serialize)]
struct TagAction<'a> {
    action: &'static str,
    tags: Vec<TagPair<'a>>,
}

#[derive(Debug, Serialize)]
struct TagPair<'a> {
    key: &'a str,
    value: &'a str,
}

/// Tags to remove and tags to add so that `old` becomes `new`.
///
/// A changed value appears in both: the old pair is removed, the new added.
pub fn diff(old: &Tags, new: &Tags) -> (Tags, Tags) {
    let removals = old
        .iter()
        .filter(|(k, v)| new.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let additions = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    (removals, additions)
}

async fn apply(
    client: &ServiceClient,
    path: &str,
    action: &'static str,
    tags: &Tags,
    cancel: &CancelToken,
) -> Result<()> {
    let body = TagAction {
        action,
        tags: tags
            .iter()
            .map(|(key, value)| TagPair { key, value })
            .collect(),
    };
    client.send_json(Method::POST, path, &body, cancel).await?;
    Ok(())
}

/// Makes the tags of one resource go from `old` to `new`.
///
/// Deletions are sent before additions. Equal maps send nothing.
pub async fn reconcile(
    client: &ServiceClient,
    resource_type: &str,
    resource_id: &str,
    old: &Tags,
    new: &Tags,
    cancel: &CancelToken,
) -> Result<()> {
    let (removals, additions) = diff(old, new);
    if removals.is_empty() && additions.is_empty() {
        return Ok(());
    }
    let path = format!("{resource_type}/{resource_id}/tags/action");
    debug!(
        service = %client.kind(),
        resource_id,
        removed = removals.len(),
        added = additions.len(),
        "Reconciling tags"
    );
    if !removals.is_empty() {
        apply(client, &path, "delete", &removals, cancel).await?;
    }
    if !additions.is_empty() {
        apply(client, &path, "create", &additions, cancel).await?;
    }
    Ok(())
}
