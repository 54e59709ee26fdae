//! The resource node contract
//!
//! Every managed resource implements [`Resource`]; read-only lookups
//! implement [`DataSource`]. Provider dispatch owns the shared-vs-managed
//! policy, so implementations only supply the cloud calls.

use crate::context::CallContext;
use crate::data::ResourceData;
use crate::diff::ResourceDiff;
use crate::error::{ProviderError, Result};
use crate::schema::Schema;
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// Computed attribute holding the shared flag of resources that support it.
pub const SHARED: &str = "shared";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Per-operation time budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_TIMEOUT,
            read: DEFAULT_TIMEOUT,
            update: DEFAULT_TIMEOUT,
            delete: DEFAULT_TIMEOUT,
        }
    }
}

#[async_trait]
pub trait Resource: Send + Sync {
    fn schema(&self) -> Schema;

    fn timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Whether matching cloud objects may be adopted instead of created.
    ///
    /// Such resources declare a computed [`SHARED`] attribute and decide
    /// it in [`Resource::customize_diff`].
    fn supports_shared(&self) -> bool {
        false
    }

    /// Creates the object, waits for it and finishes with a read.
    async fn create(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()>;

    /// Refreshes every attribute; clears the identity when the object is gone.
    async fn read(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()>;

    /// Applies in-place changes. Resources whose attributes all force
    /// replacement keep the default, which only refreshes.
    async fn update(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()> {
        self.read(ctx, d).await
    }

    /// Deletes the object; an object that is already gone is not an error.
    async fn delete(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()>;

    /// Turns an imported identity into enough state for a read.
    async fn import(&self, _ctx: &CallContext, _d: &mut ResourceData) -> Result<()> {
        Ok(())
    }

    async fn customize_diff(&self, _ctx: &CallContext, _diff: &mut ResourceDiff) -> Result<()> {
        Ok(())
    }

    /// Records the identity of an existing object instead of creating one.
    async fn adopt(&self, _ctx: &CallContext, _d: &mut ResourceData) -> Result<()> {
        Err(ProviderError::invalid("this resource cannot adopt existing objects"))
    }
}

#[async_trait]
pub trait DataSource: Send + Sync {
    fn schema(&self) -> Schema;

    async fn read(&self, ctx: &CallContext, d: &mut ResourceData) -> Result<()>;
}

/// Turns a "not found" outcome into a cleared identity.
///
/// Returns `Ok(None)` when the object is gone and any other error unchanged.
pub fn check_deleted<T>(
    d: &mut ResourceData,
    result: stratoform_cloud::Result<T>,
    what: &str,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => {
            warn!(what, id = d.id(), "Object no longer exists, removing from state");
            d.clear_id();
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
