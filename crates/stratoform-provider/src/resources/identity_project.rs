//! Identity projects, looked up through the domain-scoped identity client

use crate::context::CallContext;
use crate::data::ResourceData;
use crate::error::{ProviderError, Result};
use crate::resource::DataSource;
use crate::schema::{Attribute, Schema};
use async_trait::async_trait;
use serde::Deserialize;
use stratoform_transport::HttpRequest;

#[derive(Debug, Deserialize)]
struct Project {
    id: String,
    name: String,
    #[serde(default)]
    domain_id: String,
    #[serde(default)]
    parent_id: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    enabled: bool,
}

#[derive(Deserialize)]
struct ProjectList {
    #[serde(default)]
    projects: Vec<Project>,
}

/// `stratoform_identity_project_v3`
pub struct IdentityProject;

#[async_trait]
impl DataSource for IdentityProject {
    fn schema(&self) -> Schema {
        Schema::new()
            .attribute("name", Attribute::string().optional().computed())
            .attribute("domain_id", Attribute::string().optional().computed())
            .attribute("parent_id", Attribute::string().computed())
            .attribute("description", Attribute::string().computed())
            .attribute("enabled", Attribute::bool().computed())
    }

    async fn read(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        let client = ctx.identity_client().await?;
        let mut url = client.url("projects")?;
        {
            let mut query = url.query_pairs_mut();
            for key in ["name", "domain_id"] {
                let value = d.get_str(key);
                if !value.is_empty() {
                    query.append_pair(key, value);
                }
            }
        }
        let list: ProjectList = client
            .request(HttpRequest::get(url), ctx.cancel())
            .await?
            .json()?;

        let id = d.id().to_string();
        let mut matches: Vec<Project> = list
            .projects
            .into_iter()
            .filter(|p| id.is_empty() || p.id == id)
            .collect();
        let project = match matches.len() {
            1 => matches.remove(0),
            0 => {
                return Err(ProviderError::invalid(
                    "no project matches the given filters",
                ));
            }
            n => {
                return Err(ProviderError::invalid(format!(
                    "{n} projects match the given filters; narrow the search"
                )));
            }
        };

        d.set_id(project.id);
        d.set("name", project.name)?;
        d.set("domain_id", project.domain_id)?;
        d.set("parent_id", project.parent_id)?;
        d.set("description", project.description)?;
        d.set("enabled", project.enabled)?;
        Ok(())
    }
}
