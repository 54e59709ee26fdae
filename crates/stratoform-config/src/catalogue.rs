//! Cloud catalogue (`clouds.yaml`) discovery and parsing
//!
//! The catalogue maps cloud names to connection settings:
//!
//! ```yaml
//! clouds:
//!   otc:
//!     auth:
//!       auth_url: https://iam.eu-de.otc.example.com/v3
//!       username: demouser
//!       password: secret
//!       project_name: eu-de_sub
//!       domain_name: OTC000001
//!     region_name: eu-de
//!     verify: false
//! ```
//!
//! A sibling `secure.yaml` with the same shape may hold secrets; its values
//! fill whatever the public entry leaves unset.

use crate::config::Config;
use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE_ENV: &str = "OS_CLIENT_CONFIG_FILE";
pub const SECURE_FILE_ENV: &str = "OS_CLIENT_SECURE_FILE";

const CATALOGUE_FILE: &str = "clouds.yaml";
const SECURE_FILE: &str = "secure.yaml";

/// Parsed cloud catalogue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalogue {
    #[serde(default)]
    pub clouds: BTreeMap<String, CloudEntry>,
}

/// Settings for one named cloud.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudEntry {
    pub auth: CloudAuth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cacert: Option<String>,
}

/// The `auth` section of a cloud entry.
///
/// Domain names and IDs accept several synonyms; see
/// [`CloudAuth::resolved_domain_name`] and [`CloudAuth::resolved_domain_id`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudAuth {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ak: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_domain_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_domain_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_domain_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_domain_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency_domain_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegated_project: Option<String>,
}

fn first_set<'a>(candidates: &[&'a Option<String>]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|c| Option::as_deref(*c))
        .find(|v| !v.is_empty())
}

impl CloudAuth {
    /// Domain name, from `user_domain_name`, `project_domain_name` or
    /// `domain_name` in that order.
    pub fn resolved_domain_name(&self) -> Option<&str> {
        first_set(&[
            &self.user_domain_name,
            &self.project_domain_name,
            &self.domain_name,
        ])
    }

    /// Domain ID, from `user_domain_id`, `project_domain_id`,
    /// `default_domain` or `domain_id` in that order.
    pub fn resolved_domain_id(&self) -> Option<&str> {
        first_set(&[
            &self.user_domain_id,
            &self.project_domain_id,
            &self.default_domain,
            &self.domain_id,
        ])
    }

    fn overlay(&mut self, secure: &CloudAuth) {
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(
                    if self.$field.is_none() {
                        self.$field = secure.$field.clone();
                    }
                )*
            };
        }
        overlay!(
            auth_url,
            username,
            user_id,
            password,
            token,
            ak,
            sk,
            security_token,
            project_name,
            project_id,
            user_domain_name,
            project_domain_name,
            domain_name,
            user_domain_id,
            project_domain_id,
            default_domain,
            domain_id,
            agency_name,
            agency_domain_name,
            delegated_project,
        );
    }
}

impl CloudEntry {
    /// Fills unset fields from a `secure.yaml` entry.
    pub fn overlay(&mut self, secure: &CloudEntry) {
        self.auth.overlay(&secure.auth);
        if self.region_name.is_none() {
            self.region_name = secure.region_name.clone();
        }
        if self.interface.is_none() {
            self.interface = secure.interface.clone();
        }
        if self.verify.is_none() {
            self.verify = secure.verify;
        }
        if self.cert.is_none() {
            self.cert = secure.cert.clone();
        }
        if self.key.is_none() {
            self.key = secure.key.clone();
        }
        if self.cacert.is_none() {
            self.cacert = secure.cacert.clone();
        }
    }
}

impl From<&Config> for CloudEntry {
    fn from(config: &Config) -> Self {
        fn opt(value: &str) -> Option<String> {
            (!value.is_empty()).then(|| value.to_string())
        }

        CloudEntry {
            auth: CloudAuth {
                auth_url: opt(&config.identity_endpoint),
                username: opt(&config.username),
                user_id: opt(&config.user_id),
                password: opt(&config.password),
                token: opt(&config.token),
                ak: opt(&config.access_key),
                sk: opt(&config.secret_key),
                security_token: opt(&config.security_token),
                project_name: opt(&config.tenant_name),
                project_id: opt(&config.tenant_id),
                domain_name: opt(&config.domain_name),
                domain_id: opt(&config.domain_id),
                agency_name: opt(&config.agency_name),
                agency_domain_name: opt(&config.agency_domain_name),
                delegated_project: opt(&config.delegated_project),
                ..Default::default()
            },
            region_name: opt(&config.region),
            interface: Some(config.endpoint_type.as_str().to_string()),
            verify: Some(!config.insecure),
            cert: opt(&config.client_cert_path),
            key: opt(&config.client_key_path),
            cacert: opt(&config.ca_cert_path),
        }
    }
}

impl Catalogue {
    /// Parses a catalogue file.
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogueUnreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::CatalogueUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Serialises the catalogue as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::CatalogueUnreadable {
            path: PathBuf::from("<memory>"),
            reason: e.to_string(),
        })
    }

    /// Looks up a cloud by name.
    pub fn cloud(&self, name: &str) -> Result<&CloudEntry> {
        self.clouds
            .get(name)
            .ok_or_else(|| ConfigError::CloudEntryMissing(name.to_string()))
    }

    /// Candidate catalogue locations, in search order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV)
            && !path.is_empty()
        {
            paths.push(PathBuf::from(path));
        }
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(CATALOGUE_FILE));
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("openstack").join(CATALOGUE_FILE));
        }
        paths.push(PathBuf::from("/etc/openstack").join(CATALOGUE_FILE));
        paths
    }

    /// Finds the catalogue file.
    ///
    /// An explicit `OS_CLIENT_CONFIG_FILE` that does not exist is an error
    /// rather than a reason to keep searching.
    pub fn discover() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV)
            && !path.is_empty()
        {
            let path = PathBuf::from(path);
            if !path.is_file() {
                return Err(ConfigError::CatalogueUnreadable {
                    path,
                    reason: format!("{CONFIG_FILE_ENV} points to a missing file"),
                });
            }
            return Ok(path);
        }

        let paths = Self::search_paths();
        for path in &paths {
            debug!(path = %path.display(), "Looking for cloud catalogue");
            if path.is_file() {
                return Ok(path.clone());
            }
        }

        Err(ConfigError::CatalogueNotFound {
            searched: paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
    }

    fn secure_path(catalogue_path: &Path) -> Option<PathBuf> {
        if let Ok(path) = std::env::var(SECURE_FILE_ENV)
            && !path.is_empty()
        {
            return Some(PathBuf::from(path));
        }
        let sibling = catalogue_path.parent()?.join(SECURE_FILE);
        sibling.is_file().then_some(sibling)
    }

    /// Discovers the catalogue, selects `name` and applies the secure overlay.
    pub fn load_cloud(name: &str) -> Result<CloudEntry> {
        let path = Self::discover()?;
        debug!(path = %path.display(), cloud = name, "Loading cloud catalogue");
        let catalogue = Self::load(&path)?;
        let mut entry = catalogue.cloud(name)?.clone();

        if let Some(secure_path) = Self::secure_path(&path) {
            let secure = Self::load(&secure_path)?;
            if let Some(secure_entry) = secure.clouds.get(name) {
                debug!(path = %secure_path.display(), "Applying secure overlay");
                entry.overlay(secure_entry);
            }
        }

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
clouds:
  otc:
    auth:
      auth_url: http://localhost:33666
      username: demouser
      password: qwerty!1234
      project_name: eu-de_sub
      domain_name: OTC1354835
    region_name: eu-de
    verify: false
    cert: cert_file.crt
    key: key_file.key
    cacert: ca.crt
  synonyms:
    auth:
      project_id: 4b04680e-c627-4acb-a972-918cc661bcba
      project_domain_name: OTC12392130
      default_domain: default-domain-id
"#;

    #[test]
    fn test_parse_sample() {
        let catalogue = Catalogue::parse(Path::new("clouds.yaml"), SAMPLE).unwrap();
        let otc = catalogue.cloud("otc").unwrap();
        assert_eq!(otc.auth.username.as_deref(), Some("demouser"));
        assert_eq!(otc.verify, Some(false));
        assert_eq!(otc.region_name.as_deref(), Some("eu-de"));
    }

    #[test]
    fn test_domain_synonyms() {
        let catalogue = Catalogue::parse(Path::new("clouds.yaml"), SAMPLE).unwrap();
        let entry = catalogue.cloud("synonyms").unwrap();
        assert_eq!(entry.auth.resolved_domain_name(), Some("OTC12392130"));
        assert_eq!(entry.auth.resolved_domain_id(), Some("default-domain-id"));
    }

    #[test]
    fn test_user_domain_name_wins_over_domain_name() {
        let auth = CloudAuth {
            user_domain_name: Some("user-dom".to_string()),
            domain_name: Some("plain-dom".to_string()),
            ..Default::default()
        };
        assert_eq!(auth.resolved_domain_name(), Some("user-dom"));
    }

    #[test]
    fn test_missing_cloud() {
        let catalogue = Catalogue::parse(Path::new("clouds.yaml"), SAMPLE).unwrap();
        let err = catalogue.cloud("nope").unwrap_err();
        assert_eq!(err.code(), "cloud-entry-missing");
    }

    #[test]
    fn test_malformed_yaml() {
        let err = Catalogue::parse(Path::new("clouds.yaml"), "clouds: [unclosed").unwrap_err();
        assert_eq!(err.code(), "cloud-catalogue-unreadable");
    }

    #[test]
    fn test_overlay_fills_only_missing() {
        let mut public = CloudEntry {
            auth: CloudAuth {
                username: Some("public-user".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let secure = CloudEntry {
            auth: CloudAuth {
                username: Some("secure-user".to_string()),
                password: Some("from-secure".to_string()),
                ..Default::default()
            },
            verify: Some(true),
            ..Default::default()
        };
        public.overlay(&secure);

        assert_eq!(public.auth.username.as_deref(), Some("public-user"));
        assert_eq!(public.auth.password.as_deref(), Some("from-secure"));
        assert_eq!(public.verify, Some(true));
    }
}
