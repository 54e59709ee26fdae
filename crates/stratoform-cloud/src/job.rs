//! Asynchronous job polling
//!
//! Long-running operations return a job ID. The job is polled until it
//! reaches `SUCCESS` or `FAIL`; on success its sub-job tree carries the IDs
//! of the objects it created.
//!
//! Two wire shapes exist. ECS-style jobs:
//!
//! ```json
//! {"job_id": "J", "job_type": "createServer", "status": "SUCCESS",
//!  "entities": {"sub_jobs": [{"job_id": "J1", "status": "SUCCESS",
//!                             "entities": {"server_id": "S1"}}]}}
//! ```
//!
//! and CCE-style jobs:
//!
//! ```json
//! {"metadata": {"uid": "J"},
//!  "spec": {"type": "CreateNode", "subJobs": [
//!     {"metadata": {"uid": "J1"}, "spec": {"type": "CreateNodeVM", "resourceID": "N42"},
//!      "status": {"phase": "Success"}}]},
//!  "status": {"phase": "Running"}}
//! ```

use crate::client::ServiceClient;
use crate::error::{CloudError, Result};
use crate::waiter::{StateChangeConf, wait_for_state};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use stratoform_transport::CancelToken;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Init,
    Running,
    Success,
    Fail,
}

impl JobStatus {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "INIT" | "INITIALIZING" => Ok(JobStatus::Init),
            "RUNNING" => Ok(JobStatus::Running),
            "SUCCESS" => Ok(JobStatus::Success),
            "FAIL" | "FAILED" => Ok(JobStatus::Fail),
            other => Err(CloudError::invalid_response(format!("unknown job status '{other}'"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Init => "INIT",
            JobStatus::Running => "RUNNING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Fail => "FAIL",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job and its sub-jobs, normalised from either wire shape.
#[derive(Debug, Clone, PartialEq)]
pub struct JobTree {
    pub id: String,
    pub kind: String,
    pub status: JobStatus,
    pub resource_id: Option<String>,
    pub entities: Map<String, Value>,
    pub message: String,
    pub children: Vec<JobTree>,
}

impl JobTree {
    /// Depth-first search for the first job of `kind`.
    pub fn find_kind(&self, kind: &str) -> Option<&JobTree> {
        if self.kind == kind {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_kind(kind))
    }

    /// Depth-first search for a string entity, such as `server_group_id`.
    pub fn find_entity(&self, key: &str) -> Option<&str> {
        if let Some(Value::String(value)) = self.entities.get(key) {
            return Some(value);
        }
        self.children.iter().find_map(|c| c.find_entity(key))
    }

    /// Resource ID carried by the first sub-job of `kind`.
    pub fn resource_of(&self, kind: &str) -> Option<&str> {
        self.find_kind(kind)?.resource_id.as_deref()
    }
}

#[derive(Deserialize)]
struct EcsJob {
    job_id: String,
    #[serde(default)]
    job_type: String,
    status: String,
    #[serde(default)]
    entities: Map<String, Value>,
    #[serde(default)]
    fail_reason: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

impl EcsJob {
    fn into_tree(mut self) -> Result<JobTree> {
        let children = match self.entities.remove("sub_jobs") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|v| {
                    serde_json::from_value::<EcsJob>(v)
                        .map_err(|e| CloudError::invalid_response(format!("sub-job: {e}")))?
                        .into_tree()
                })
                .collect::<Result<Vec<_>>>()?,
            _ => Vec::new(),
        };
        let resource_id = ["server_id", "volume_id", "nic_id", "resource_id"]
            .iter()
            .find_map(|key| self.entities.get(*key).and_then(Value::as_str))
            .map(str::to_string);
        let message = match (self.error_code, self.fail_reason) {
            (Some(code), Some(reason)) => format!("{code}: {reason}"),
            (None, Some(reason)) => reason,
            (Some(code), None) => code,
            (None, None) => String::new(),
        };
        Ok(JobTree {
            id: self.job_id,
            kind: self.job_type,
            status: JobStatus::parse(&self.status)?,
            resource_id,
            entities: self.entities,
            message,
            children,
        })
    }
}

#[derive(Deserialize)]
struct CceJob {
    metadata: CceMetadata,
    spec: CceSpec,
    #[serde(default)]
    status: Option<CcePhase>,
}

#[derive(Deserialize)]
struct CceMetadata {
    uid: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CceSpec {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(rename = "resourceID", default)]
    resource_id: Option<String>,
    #[serde(default)]
    sub_jobs: Vec<CceJob>,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Deserialize)]
struct CcePhase {
    #[serde(default)]
    phase: String,
    #[serde(default)]
    reason: String,
}

impl CceJob {
    fn into_tree(self) -> Result<JobTree> {
        let phase = self.status.unwrap_or(CcePhase {
            phase: "Init".to_string(),
            reason: String::new(),
        });
        let status = if phase.phase.is_empty() {
            JobStatus::Init
        } else {
            JobStatus::parse(&phase.phase)?
        };
        Ok(JobTree {
            id: self.metadata.uid,
            kind: self.spec.kind,
            status,
            resource_id: self.spec.resource_id.filter(|id| !id.is_empty()),
            entities: self.spec.rest,
            message: phase.reason,
            children: self
                .spec
                .sub_jobs
                .into_iter()
                .map(CceJob::into_tree)
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

/// Parses an ECS-style job document.
pub fn parse_ecs_job(value: Value) -> Result<JobTree> {
    serde_json::from_value::<EcsJob>(value)
        .map_err(|e| CloudError::invalid_response(format!("job: {e}")))?
        .into_tree()
}

/// Parses a CCE-style job document.
pub fn parse_cce_job(value: Value) -> Result<JobTree> {
    serde_json::from_value::<CceJob>(value)
        .map_err(|e| CloudError::invalid_response(format!("job: {e}")))?
        .into_tree()
}

/// Where job details come from.
#[async_trait]
pub trait JobApi: Send + Sync {
    async fn job_details(&self, job_id: &str, cancel: &CancelToken) -> Result<JobTree>;
}

/// Jobs served at `<ecs>/jobs/<id>`.
pub struct EcsJobs<'a>(pub &'a ServiceClient);

#[async_trait]
impl JobApi for EcsJobs<'_> {
    async fn job_details(&self, job_id: &str, cancel: &CancelToken) -> Result<JobTree> {
        let value: Value = self.0.get_json(&format!("jobs/{job_id}"), cancel).await?;
        parse_ecs_job(value)
    }
}

/// Jobs served at `<cce>/jobs/<id>`.
pub struct CceJobs<'a>(pub &'a ServiceClient);

#[async_trait]
impl JobApi for CceJobs<'_> {
    async fn job_details(&self, job_id: &str, cancel: &CancelToken) -> Result<JobTree> {
        let value: Value = self.0.get_json(&format!("jobs/{job_id}"), cancel).await?;
        parse_cce_job(value)
    }
}

/// Polls `job_id` until it succeeds, fails or `timeout` elapses.
pub async fn wait_for_job(
    api: &dyn JobApi,
    job_id: &str,
    timeout: Duration,
    min_timeout: Duration,
    cancel: &CancelToken,
) -> Result<JobTree> {
    let conf = StateChangeConf::new(
        &[JobStatus::Init.as_str(), JobStatus::Running.as_str()],
        &[JobStatus::Success.as_str()],
        timeout,
    )
    .min_timeout(min_timeout)
    .what(format!("job {job_id}"));

    let tree = wait_for_state(&conf, cancel, || async {
        let tree = api.job_details(job_id, cancel).await?;
        if tree.status == JobStatus::Fail {
            return Err(CloudError::JobFailed {
                job_id: job_id.to_string(),
                message: failure_message(&tree),
            });
        }
        let status = tree.status.to_string();
        Ok((Some(tree), status))
    })
    .await?
    .ok_or_else(|| CloudError::NotFound(format!("job {job_id}")))?;

    info!(job_id, kind = %tree.kind, "Job succeeded");
    Ok(tree)
}

/// The first non-empty failure message in the tree.
fn failure_message(tree: &JobTree) -> String {
    if !tree.message.is_empty() {
        return tree.message.clone();
    }
    tree.children
        .iter()
        .map(failure_message)
        .find(|m| !m.is_empty())
        .unwrap_or_else(|| "no reason given".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn cce_job(phase: &str) -> Value {
        json!({
            "kind": "Job",
            "metadata": { "uid": "J" },
            "spec": {
                "type": "CreateNode",
                "clusterUID": "c1",
                "subJobs": [{
                    "metadata": { "uid": "J1" },
                    "spec": { "type": "CreateNodeVM", "resourceID": "N42" },
                    "status": { "phase": "Success" }
                }]
            },
            "status": { "phase": phase, "reason": "" }
        })
    }

    struct Scripted {
        replies: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl JobApi for Scripted {
        async fn job_details(&self, _job_id: &str, _cancel: &CancelToken) -> Result<JobTree> {
            let value = self.replies.lock().unwrap().remove(0);
            parse_cce_job(value)
        }
    }

    #[test]
    fn test_parse_ecs_job() {
        let tree = parse_ecs_job(json!({
            "job_id": "J",
            "job_type": "createServer",
            "status": "SUCCESS",
            "entities": {
                "server_group_id": "G7",
                "sub_jobs": [{
                    "job_id": "J1",
                    "job_type": "createSingleServer",
                    "status": "SUCCESS",
                    "entities": { "server_id": "S1" }
                }]
            }
        }))
        .unwrap();

        assert_eq!(tree.status, JobStatus::Success);
        assert_eq!(tree.find_entity("server_group_id"), Some("G7"));
        assert_eq!(tree.resource_of("createSingleServer"), Some("S1"));
    }

    #[test]
    fn test_parse_cce_job() {
        let tree = parse_cce_job(cce_job("Running")).unwrap();
        assert_eq!(tree.status, JobStatus::Running);
        assert_eq!(tree.resource_of("CreateNodeVM"), Some("N42"));
        assert_eq!(tree.find_entity("clusterUID"), Some("c1"));
    }

    #[tokio::test]
    async fn test_running_running_success_yields_node_id() {
        let api = Scripted {
            replies: Mutex::new(vec![cce_job("Running"), cce_job("Running"), cce_job("Success")]),
        };
        let tree = wait_for_job(
            &api,
            "J",
            Duration::from_secs(5),
            Duration::from_millis(5),
            &CancelToken::never(),
        )
        .await
        .unwrap();

        assert_eq!(tree.resource_of("CreateNodeVM"), Some("N42"));
        assert!(api.replies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_job_reports_reason() {
        let mut failed = cce_job("Failed");
        failed["status"]["reason"] = json!("quota exceeded");
        let api = Scripted {
            replies: Mutex::new(vec![cce_job("Init"), failed]),
        };
        let err = wait_for_job(
            &api,
            "J",
            Duration::from_secs(5),
            Duration::from_millis(5),
            &CancelToken::never(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CloudError::JobFailed { .. }));
        assert!(err.to_string().contains("quota exceeded"));
    }
}
