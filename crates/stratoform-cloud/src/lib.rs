//! Stratoform cloud access
//!
//! Authenticated service clients and the helpers every resource uses
//! around them:
//!
//! - [`ClientFactory`]: project- and domain-scoped sessions, per-service clients
//! - [`waiter`]: polling for status transitions
//! - [`job`]: asynchronous job polling and sub-job inspection
//! - [`tags`]: tag reconciliation
//! - [`MutexRegistry`]: named locks for non-atomic cloud APIs

pub mod client;
pub mod error;
pub mod factory;
pub mod identity;
pub mod job;
pub mod mutex;
pub mod obs;
pub mod service;
pub mod session;
pub mod tags;
pub mod waiter;

pub use client::ServiceClient;
pub use error::{CloudError, Result};
pub use factory::ClientFactory;
pub use identity::TemporaryCredentials;
pub use job::{CceJobs, EcsJobs, JobApi, JobStatus, JobTree, wait_for_job};
pub use mutex::{MutexRegistry, NamedGuard};
pub use obs::ObsClient;
pub use service::{ServiceCatalog, ServiceKind};
pub use session::AuthSession;
pub use tags::Tags;
pub use waiter::{DELETED, StateChangeConf, wait_for_state};
