//! Built-in resources and data sources

mod cce_node;
mod dns_recordset;
mod identity_project;
mod keypair;
mod obs_bucket;
mod volume;

pub use cce_node::CceNode;
pub use dns_recordset::DnsRecordSet;
pub use identity_project::IdentityProject;
pub use keypair::{Keypair, KeypairLookup};
pub use obs_bucket::ObsBucket;
pub use volume::Volume;

use crate::provider::Provider;
use crate::schema::Attribute;

/// Registers every built-in node under its public name.
pub fn register(provider: Provider) -> Provider {
    provider
        .with_resource("stratoform_compute_keypair_v2", Keypair)
        .with_resource("stratoform_blockstorage_volume_v2", Volume::default())
        .with_resource("stratoform_cce_node_v3", CceNode::default())
        .with_resource("stratoform_dns_recordset_v2", DnsRecordSet::default())
        .with_resource("stratoform_obs_bucket", ObsBucket)
        .with_data_source("stratoform_compute_keypair_v2", KeypairLookup)
        .with_data_source("stratoform_identity_project_v3", IdentityProject)
}

/// The optional per-resource `region` override.
fn region() -> Attribute {
    Attribute::string().optional().computed().force_new()
}
