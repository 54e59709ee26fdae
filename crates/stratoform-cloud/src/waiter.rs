//! State-change waiter
//!
//! Polls a refresh callback until the observed status reaches a target,
//! leaves the pending set, or the timeout elapses.

use crate::error::{CloudError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use stratoform_transport::{CancelToken, TransportError};
use tokio::time::Instant;
use tracing::debug;

/// Target status meaning "the object is gone".
pub const DELETED: &str = "DELETED";

const INITIAL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_INTERVAL: Duration = Duration::from_secs(10);

/// Describes one wait.
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    pub timeout: Duration,
    /// Wait before the first refresh
    pub delay: Duration,
    /// Floor for the interval between refreshes
    pub min_timeout: Duration,
    /// Consecutive "not found" observations tolerated when not waiting for deletion
    pub not_found_checks: u32,
    /// Used in log lines and timeout errors
    pub what: String,
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            timeout,
            delay: Duration::ZERO,
            min_timeout: Duration::from_secs(3),
            not_found_checks: 20,
            what: "state change".to_string(),
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    pub fn what(mut self, what: impl Into<String>) -> Self {
        self.what = what.into();
        self
    }

    fn waits_for_deletion(&self) -> bool {
        self.target.iter().any(|t| t == DELETED)
    }

    fn next_sleep(&self, interval: Duration) -> Duration {
        let millis = interval.as_millis() as u64;
        let jittered = Duration::from_millis(rand::thread_rng().gen_range(millis / 2..=millis));
        jittered.max(self.min_timeout)
    }
}

fn cancelled(_: TransportError) -> CloudError {
    CloudError::Cancelled
}

/// Waits until `refresh` reports a target status.
///
/// `refresh` returns the current object (if it still exists) and its status.
/// Returns the object on success, or `None` when the target was [`DELETED`]
/// and the object disappeared.
pub async fn wait_for_state<T, F, Fut>(
    conf: &StateChangeConf,
    cancel: &CancelToken,
    mut refresh: F,
) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(Option<T>, String)>>,
{
    let deadline = Instant::now() + conf.timeout;
    let mut interval = INITIAL_INTERVAL;
    let mut not_found = 0u32;
    let mut last_state = String::from("<none>");

    if !conf.delay.is_zero() {
        cancel.sleep(conf.delay).await.map_err(cancelled)?;
    }

    loop {
        let observed = match cancel
            .run(tokio::time::timeout_at(deadline, refresh()))
            .await
            .map_err(cancelled)?
        {
            Ok(result) => result,
            Err(_elapsed) => {
                return Err(CloudError::WaitTimeout {
                    what: conf.what.clone(),
                    timeout: conf.timeout,
                    last_state,
                });
            }
        };

        let vanished = match observed {
            Ok((Some(object), state)) => {
                debug!(what = %conf.what, state = %state, "Refreshed");
                if conf.target.contains(&state) {
                    return Ok(Some(object));
                }
                if !conf.pending.contains(&state) {
                    return Err(CloudError::UnexpectedState {
                        state,
                        expected: conf.target.clone(),
                    });
                }
                not_found = 0;
                last_state = state;
                None
            }
            Ok((None, _)) => Some(CloudError::NotFound(conf.what.clone())),
            Err(e) if e.is_not_found() => Some(e),
            Err(e) => return Err(e),
        };

        if let Some(error) = vanished {
            if conf.waits_for_deletion() {
                debug!(what = %conf.what, "Object is gone");
                return Ok(None);
            }
            not_found += 1;
            if not_found > conf.not_found_checks {
                return Err(error);
            }
            last_state = "<not found>".to_string();
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(CloudError::WaitTimeout {
                what: conf.what.clone(),
                timeout: conf.timeout,
                last_state,
            });
        }
        let sleep = conf.next_sleep(interval).min(deadline - now);
        cancel.sleep(sleep).await.map_err(cancelled)?;
        interval = (interval * 2).min(MAX_INTERVAL);
    }
}
