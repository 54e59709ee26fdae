//! Stratoform provider
//!
//! The resource node contract and the dispatch that drives it:
//!
//! - [`schema`]: attribute descriptors and configuration validation
//! - [`data`]: per-instance values handed to callbacks
//! - [`diff`]: planning and the action decision
//! - [`resource`]: the [`Resource`] and [`DataSource`] traits
//! - [`provider`]: name-based dispatch and the shared-vs-managed policy
//! - [`reflect`]: moving values between schemas and option structs
//! - [`resources`]: the built-in nodes

pub mod context;
pub mod data;
pub mod diff;
pub mod error;
pub mod provider;
pub mod reflect;
pub mod resource;
pub mod resources;
pub mod schema;

pub use context::{CallContext, ProviderMeta};
pub use data::ResourceData;
pub use diff::{ChangeAction, PlannedChange, ResourceDiff};
pub use error::{ProviderError, Result};
pub use provider::{Provider, provider_schema};
pub use resource::{DataSource, Resource, SHARED, Timeouts, check_deleted};
pub use schema::{Attribute, Schema, UNKNOWN, ValueType};
