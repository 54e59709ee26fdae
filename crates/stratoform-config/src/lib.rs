//! Stratoform configuration
//!
//! Loads the provider configuration from engine options, environment
//! variables and the `clouds.yaml` catalogue, then resolves the credential
//! mode into project-scoped and domain-scoped authentication options.
//!
//! ```ignore
//! use stratoform_config::{Config, ProviderOptions, resolve};
//!
//! let options = ProviderOptions::from_value(&provider_block)?;
//! let config = Config::load(&options)?;
//! let auth = resolve(&config)?;
//! ```

pub mod auth;
pub mod catalogue;
pub mod config;
pub mod env;
pub mod error;
pub mod options;

pub use auth::{Agency, AuthOptionSet, AuthOptions, Credential, Scope, resolve};
pub use catalogue::{Catalogue, CloudAuth, CloudEntry};
pub use config::{AuthMode, Config, EndpointType};
pub use error::{ConfigError, Result};
pub use options::ProviderOptions;
