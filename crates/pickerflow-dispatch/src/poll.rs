//! Polling of server-side tasks.

use std::sync::Arc;
use std::time::Duration;

use pickerflow_core::Credentials;
use serde_json::Value;
use tracing::debug;

use crate::api::{ApiResult, BoxFuture, PickerApi};
use crate::TASK_POLL_INTERVAL;

/// Terminal states that mean the task failed.
const FAILURE_STATES: &[&str] = &["failed", "failure", "error"];

/// Status payload of a server-side task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatus {
    payload: Value,
}

impl TaskStatus {
    /// Wrap a status payload.
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// Reported state, if any.
    pub fn state(&self) -> Option<&str> {
        self.payload.get("state").and_then(Value::as_str)
    }

    /// Check if the task is still running.
    pub fn is_pending(&self) -> bool {
        self.state()
            .is_some_and(|state| state.eq_ignore_ascii_case("pending"))
    }

    /// Check if the task ended in failure.
    pub fn is_failure(&self) -> bool {
        let failed_state = self.state().is_some_and(|state| {
            FAILURE_STATES
                .iter()
                .any(|failure| state.eq_ignore_ascii_case(failure))
        });
        failed_state || self.payload.get("error").is_some_and(|e| !e.is_null())
    }

    /// Error payload of a failed task.
    pub fn error_payload(&self) -> Value {
        match self.payload.get("error") {
            Some(error) if !error.is_null() => error.clone(),
            _ => self.payload.clone(),
        }
    }

    /// Metadata produced by a successful task.
    pub fn result_metadata(&self) -> Value {
        match self.payload.get("result") {
            Some(result) if result.is_object() => result.clone(),
            _ => self.payload.clone(),
        }
    }

    /// The raw payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

/// Waits for a task to reach a terminal state.
///
/// Implementations decide the wait policy. A transport failure is an `Err`;
/// a task that failed on the server is an `Ok` status with
/// [`TaskStatus::is_failure`] set.
pub trait TaskPoller: Send + Sync {
    fn poll<'a>(&'a self, task_id: &'a str, credentials: &'a Credentials) -> BoxFuture<'a, ApiResult<TaskStatus>>;
}

/// Checks a task at a fixed interval until it stops being pending.
///
/// There is no attempt limit and no backoff: a task that stays pending
/// keeps this loop alive until the process ends.
pub struct FixedIntervalPoller {
    api: Arc<dyn PickerApi>,
    interval: Duration,
}

impl FixedIntervalPoller {
    /// Create a poller with the default 3 second interval.
    pub fn new(api: Arc<dyn PickerApi>) -> Self {
        Self::with_interval(api, TASK_POLL_INTERVAL)
    }

    /// Create a poller with a custom interval.
    pub fn with_interval(api: Arc<dyn PickerApi>, interval: Duration) -> Self {
        Self { api, interval }
    }

    /// Interval between status requests.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl TaskPoller for FixedIntervalPoller {
    fn poll<'a>(&'a self, task_id: &'a str, credentials: &'a Credentials) -> BoxFuture<'a, ApiResult<TaskStatus>> {
        Box::pin(async move {
            let mut attempts = 0u64;
            loop {
                tokio::time::sleep(self.interval).await;
                attempts += 1;

                let status = TaskStatus::new(self.api.task_status(credentials, task_id).await?);
                if !status.is_pending() {
                    debug!(task_id, attempts, state = ?status.state(), "Task finished");
                    return Ok(status);
                }
                debug!(task_id, attempts, "Task still pending");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pending_is_case_insensitive() {
        assert!(TaskStatus::new(json!({"state": "PENDING"})).is_pending());
        assert!(TaskStatus::new(json!({"state": "pending"})).is_pending());
        assert!(!TaskStatus::new(json!({"state": "SUCCESS"})).is_pending());
        assert!(!TaskStatus::new(json!({"id": "T1"})).is_pending());
    }

    #[test]
    fn test_failure_detection() {
        let failed = TaskStatus::new(json!({"state": "FAILED", "error": {"code": "E"}}));
        assert!(failed.is_failure());
        assert_eq!(failed.error_payload(), json!({"code": "E"}));

        let errored = TaskStatus::new(json!({"state": "done", "error": "quota"}));
        assert!(errored.is_failure());

        let ok = TaskStatus::new(json!({"state": "SUCCESS", "result": {"id": "new"}}));
        assert!(!ok.is_failure());
        assert_eq!(ok.result_metadata(), json!({"id": "new"}));
    }
}
