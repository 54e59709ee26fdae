//! Object storage client
//!
//! Bucket-level calls on path-style URLs (`<endpoint>/<bucket>`). Everything
//! here logs under the `stratoform::obs` target, which the binary mirrors to
//! the object-storage debug log file.

use crate::client::ServiceClient;
use crate::error::{CloudError, Result};
use stratoform_transport::{CancelToken, HttpRequest, Method};
use tracing::debug;

pub const LOG_TARGET: &str = "stratoform::obs";

#[derive(Debug, Clone)]
pub struct ObsClient {
    client: ServiceClient,
}

impl ObsClient {
    pub fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    pub fn region(&self) -> &str {
        self.client.region()
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint().as_str()
    }

    /// Creates `bucket` with a canned ACL and optional storage class.
    pub async fn create_bucket(
        &self,
        bucket: &str,
        acl: &str,
        storage_class: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<()> {
        debug!(target: LOG_TARGET, bucket, acl, "CreateBucket");
        let location = format!(
            "<CreateBucketConfiguration><Location>{}</Location></CreateBucketConfiguration>",
            self.client.region()
        );
        let mut request = HttpRequest::new(Method::PUT, self.client.url(bucket)?)
            .header("x-obs-acl", acl)?
            .body(location.into_bytes());
        if let Some(class) = storage_class {
            request = request.header("x-obs-storage-class", class)?;
        }
        self.client.request(request, cancel).await?;
        debug!(target: LOG_TARGET, bucket, "CreateBucket done");
        Ok(())
    }

    /// Whether `bucket` exists and is visible to these credentials.
    pub async fn bucket_exists(&self, bucket: &str, cancel: &CancelToken) -> Result<bool> {
        debug!(target: LOG_TARGET, bucket, "HeadBucket");
        let request = HttpRequest::new(Method::HEAD, self.client.url(bucket)?);
        match self.client.request(request, cancel).await {
            Ok(_) => Ok(true),
            Err(CloudError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Storage class reported for `bucket`, if the service returns one.
    pub async fn bucket_storage_class(
        &self,
        bucket: &str,
        cancel: &CancelToken,
    ) -> Result<Option<String>> {
        let request = HttpRequest::new(Method::HEAD, self.client.url(bucket)?);
        let response = self.client.request(request, cancel).await?;
        Ok(response.header("x-obs-storage-class").map(str::to_string))
    }

    pub async fn set_bucket_acl(
        &self,
        bucket: &str,
        acl: &str,
        cancel: &CancelToken,
    ) -> Result<()> {
        debug!(target: LOG_TARGET, bucket, acl, "SetBucketAcl");
        let mut url = self.client.url(bucket)?;
        url.set_query(Some("acl"));
        let request = HttpRequest::new(Method::PUT, url).header("x-obs-acl", acl)?;
        self.client.request(request, cancel).await?;
        Ok(())
    }

    /// Deletes `bucket`; a missing bucket counts as deleted.
    pub async fn delete_bucket(&self, bucket: &str, cancel: &CancelToken) -> Result<()> {
        debug!(target: LOG_TARGET, bucket, "DeleteBucket");
        let deleted = self.client.delete_if_exists(bucket, cancel).await?;
        debug!(target: LOG_TARGET, bucket, deleted, "DeleteBucket done");
        Ok(())
    }
}
