//! Service kinds and endpoint catalogues

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use stratoform_config::EndpointType;

/// A cloud service a client can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Compute,
    Ecs,
    BlockStorage,
    ObjectStore,
    Identity,
    Dns,
    Cce,
    Elb,
    Rds,
    Network,
}

impl ServiceKind {
    /// The `type` this service has in the token's service catalogue.
    pub fn catalog_type(&self) -> &'static str {
        match self {
            ServiceKind::Compute => "compute",
            ServiceKind::Ecs => "ecs",
            ServiceKind::BlockStorage => "volumev2",
            ServiceKind::ObjectStore => "object",
            ServiceKind::Identity => "identity",
            ServiceKind::Dns => "dns",
            ServiceKind::Cce => "cce",
            ServiceKind::Elb => "elb",
            ServiceKind::Rds => "rds",
            ServiceKind::Network => "network",
        }
    }

    /// Host prefix used when the endpoint has to be derived.
    pub fn host_prefix(&self) -> &'static str {
        match self {
            ServiceKind::Compute | ServiceKind::Ecs => "ecs",
            ServiceKind::BlockStorage => "evs",
            ServiceKind::ObjectStore => "obs",
            ServiceKind::Identity => "iam",
            ServiceKind::Dns => "dns",
            ServiceKind::Cce => "cce",
            ServiceKind::Elb => "elb",
            ServiceKind::Rds => "rds",
            ServiceKind::Network => "vpc",
        }
    }

    /// Version path appended to a derived endpoint.
    pub fn version_path(&self) -> &'static str {
        match self {
            ServiceKind::Compute => "v2.1/{project_id}",
            ServiceKind::Ecs => "v1/{project_id}",
            ServiceKind::BlockStorage => "v2/{project_id}",
            ServiceKind::ObjectStore => "",
            ServiceKind::Identity => "v3",
            ServiceKind::Dns => "v2",
            ServiceKind::Cce => "api/v3/projects/{project_id}",
            ServiceKind::Elb => "v2.0",
            ServiceKind::Rds => "v3/{project_id}",
            ServiceKind::Network => "v1/{project_id}",
        }
    }

    /// Whether a derived endpoint needs the region in its host name.
    pub fn is_regional(&self) -> bool {
        !matches!(self, ServiceKind::Identity)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.catalog_type())
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "compute" => ServiceKind::Compute,
            "ecs" => ServiceKind::Ecs,
            "volumev2" | "blockstorage" | "evs" => ServiceKind::BlockStorage,
            "object" | "object-store" | "obs" => ServiceKind::ObjectStore,
            "identity" | "iam" => ServiceKind::Identity,
            "dns" => ServiceKind::Dns,
            "cce" => ServiceKind::Cce,
            "elb" => ServiceKind::Elb,
            "rds" => ServiceKind::Rds,
            "network" | "vpc" => ServiceKind::Network,
            other => return Err(format!("unknown service kind '{other}'")),
        })
    }
}

/// Service catalogue returned with a token.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ServiceCatalog {
    pub services: Vec<CatalogService>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogService {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogEndpoint {
    pub interface: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    pub url: String,
}

impl ServiceCatalog {
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Finds the endpoint for `(kind, region, availability)`.
    ///
    /// Global endpoints (no region) match any region.
    pub fn locate(
        &self,
        kind: ServiceKind,
        region: &str,
        availability: EndpointType,
    ) -> Option<&str> {
        let service = self
            .services
            .iter()
            .find(|s| s.service_type == kind.catalog_type())?;
        let mut candidates = service
            .endpoints
            .iter()
            .filter(|e| e.interface == availability.as_str());
        let regional = candidates.clone().find(|e| {
            e.region.as_deref() == Some(region) || e.region_id.as_deref() == Some(region)
        });
        regional
            .or_else(|| candidates.find(|e| e.region.is_none() && e.region_id.is_none()))
            .map(|e| e.url.as_str())
    }
}
