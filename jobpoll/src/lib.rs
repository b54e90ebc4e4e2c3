pub mod api;
pub mod config;
pub mod error;
pub mod notify;
pub mod poller;
pub mod utils;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

pub use api::{ApiClient, JobStatusSource, Session};
pub use config::{PollInterval, PollerConfig};
pub use error::{ConfigError, JobError, TransportError};
pub use notify::{ChannelNotifier, Notification, NotificationKind, Notifier, TracingNotifier};
pub use poller::{AsyncJobPoller, CancelOnDrop, Subscription, SubscriptionState};

/// Opaque job identifier handed out by the backend when it accepts an
/// asynchronous command. The wire may carry it as a string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum WireId {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        Ok(match WireId::deserialize(deserializer)? {
            WireId::Text(s) => JobId(s),
            WireId::Unsigned(n) => JobId(n.to_string()),
            WireId::Signed(n) => JobId(n.to_string()),
        })
    }
}

/// Failure reported by the backend for a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub code: Option<i64>,
    pub text: String,
}

impl JobFailure {
    pub fn new(code: Option<i64>, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    /// Pulls `errorcode`/`errortext` out of a failed job's `jobresult`.
    pub fn from_job_result(result: Option<&Value>) -> Self {
        match result {
            Some(Value::Object(obj)) => {
                let code = obj.get("errorcode").and_then(Value::as_i64);
                let text = obj
                    .get("errortext")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| Value::Object(obj.clone()).to_string());
                Self { code, text }
            }
            Some(Value::String(s)) => Self::new(None, s.clone()),
            _ => Self::new(None, "job failed without an error message"),
        }
    }
}

/// Status of an asynchronous job. Encoded upstream as `jobstatus` 0/1/2.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Pending,
    Succeeded(Value),
    Failed(JobFailure),
}

impl JobStatus {
    pub const PENDING: u8 = 0;
    pub const SUCCEEDED: u8 = 1;
    pub const FAILED: u8 = 2;

    pub fn code(&self) -> u8 {
        match self {
            JobStatus::Pending => Self::PENDING,
            JobStatus::Succeeded(_) => Self::SUCCEEDED,
            JobStatus::Failed(_) => Self::FAILED,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// One decoded `queryAsyncJobResult` answer.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncJob {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Command that created the job, when the backend echoes it.
    pub cmd: Option<String>,
    pub result_code: Option<i64>,
    pub proc_status: Option<i64>,
    pub created: Option<DateTime<Utc>>,
}

impl AsyncJob {
    pub fn new(job_id: JobId, status: JobStatus) -> Self {
        Self {
            job_id,
            status,
            cmd: None,
            result_code: None,
            proc_status: None,
            created: None,
        }
    }

    pub fn pending(job_id: impl Into<JobId>) -> Self {
        Self::new(job_id.into(), JobStatus::Pending)
    }

    pub fn succeeded(job_id: impl Into<JobId>, result: Value) -> Self {
        Self::new(job_id.into(), JobStatus::Succeeded(result))
    }

    pub fn failed(job_id: impl Into<JobId>, failure: JobFailure) -> Self {
        Self::new(job_id.into(), JobStatus::Failed(failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_id_accepts_strings_and_numbers() {
        let ids: Vec<JobId> = serde_json::from_value(json!(["a1-b2", 42, -7])).unwrap();
        assert_eq!(ids, vec![JobId::from("a1-b2"), JobId::from(42), JobId::from("-7")]);
        assert_eq!(serde_json::to_value(JobId::from(42)).unwrap(), json!("42"));
    }

    #[test]
    fn failure_text_comes_from_errortext() {
        let result = json!({ "errorcode": 530, "errortext": "Insufficient capacity" });
        let failure = JobFailure::from_job_result(Some(&result));
        assert_eq!(failure, JobFailure::new(Some(530), "Insufficient capacity"));

        let failure = JobFailure::from_job_result(Some(&json!("disk gone")));
        assert_eq!(failure.text, "disk gone");
        assert_eq!(failure.code, None);

        let failure = JobFailure::from_job_result(None);
        assert!(!failure.text.is_empty());
    }

    #[test]
    fn status_codes() {
        assert_eq!(JobStatus::Pending.code(), 0);
        assert_eq!(JobStatus::Succeeded(json!({})).code(), 1);
        assert_eq!(JobStatus::Failed(JobFailure::new(None, "x")).code(), 2);
        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Succeeded(Value::Null).is_terminal());
    }
}
