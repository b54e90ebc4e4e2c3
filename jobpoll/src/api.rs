use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::PollerConfig;
use crate::error::{ConfigError, TransportError};
use crate::{AsyncJob, JobFailure, JobId, JobStatus};

pub const QUERY_JOB_COMMAND: &str = "queryAsyncJobResult";

/// Who is talking to which management endpoint. Passed explicitly to the
/// client instead of living in process globals.
#[derive(Debug, Clone)]
pub struct Session {
    pub api_url: Url,
    pub session_key: Option<String>,
}

impl Session {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            session_key: None,
        }
    }

    pub fn with_session_key(mut self, key: impl Into<String>) -> Self {
        self.session_key = Some(key.into());
        self
    }
}

/// Anything that can answer "what is the state of job X right now".
#[async_trait]
pub trait JobStatusSource: Send + Sync {
    async fn query(&self, job_id: &JobId) -> Result<AsyncJob, TransportError>;
}

pub struct ApiClient {
    client: Client,
    session: Session,
}

impl ApiClient {
    pub fn new(session: Session, timeout: Duration) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        Ok(Self {
            client: Client::builder()
                .timeout(timeout)
                .default_headers(headers)
                .build()?,
            session,
        })
    }

    pub fn from_config(config: &PollerConfig) -> Result<Self, ConfigError> {
        let mut session = Session::new(config.require_api_url()?.clone());
        session.session_key = config.session_key.clone();
        Self::new(session, config.request_timeout)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn command_url<I, K, V>(&self, command: &str, params: I) -> Url
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut url = self.session.api_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("command", command);
            for (k, v) in params {
                query.append_pair(k.as_ref(), v.as_ref());
            }
            query.append_pair("response", "json");
            if let Some(key) = &self.session.session_key {
                query.append_pair("sessionkey", key);
            }
        }
        url
    }

    async fn call<I, K, V>(&self, command: &str, params: I) -> Result<Value, TransportError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let url = self.command_url(command, params);
        debug!(%command, "calling API");

        let res = self.client.get(url).send().await?;
        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), status.canonical_reason(), &body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Fires an asynchronous command and returns the job id it was given.
    pub async fn submit_command<I, K, V>(
        &self,
        command: &str,
        params: I,
    ) -> Result<JobId, TransportError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let body = self.call(command, params).await?;
        extract_job_id(command, &body)
    }
}

#[async_trait]
impl JobStatusSource for ApiClient {
    async fn query(&self, job_id: &JobId) -> Result<AsyncJob, TransportError> {
        let body = self
            .call(QUERY_JOB_COMMAND, [("jobId", job_id.as_str())])
            .await?;
        decode_job(job_id, body)
    }
}

#[derive(Debug, Deserialize)]
struct RawJobResult {
    jobid: Option<JobId>,
    jobstatus: i64,
    jobresult: Option<Value>,
    jobresultcode: Option<i64>,
    jobprocstatus: Option<i64>,
    cmd: Option<String>,
    created: Option<String>,
}

/// Decodes a `queryAsyncJobResult` body, bare or wrapped in its
/// `queryasyncjobresultresponse` envelope.
pub fn decode_job(requested: &JobId, body: Value) -> Result<AsyncJob, TransportError> {
    let inner = match body {
        Value::Object(mut obj) => match obj.remove("queryasyncjobresultresponse") {
            Some(inner) => inner,
            None => Value::Object(obj),
        },
        other => other,
    };
    let raw: RawJobResult = serde_json::from_value(inner)?;

    let status = match raw.jobstatus {
        0 => JobStatus::Pending,
        1 => JobStatus::Succeeded(raw.jobresult.unwrap_or(Value::Null)),
        2 => JobStatus::Failed(JobFailure::from_job_result(raw.jobresult.as_ref())),
        other => {
            return Err(TransportError::Decode(format!("unknown jobstatus {other}")));
        }
    };

    Ok(AsyncJob {
        job_id: raw.jobid.unwrap_or_else(|| requested.clone()),
        status,
        cmd: raw.cmd,
        result_code: raw.jobresultcode,
        proc_status: raw.jobprocstatus,
        created: raw.created.as_deref().and_then(parse_timestamp),
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn extract_job_id(command: &str, body: &Value) -> Result<JobId, TransportError> {
    let envelope = format!("{}response", command.to_lowercase());
    let id = body
        .get(&envelope)
        .and_then(|inner| inner.get("jobid"))
        .or_else(|| body.get("jobid"))
        .cloned();

    match id {
        Some(Value::Null) | None => Err(TransportError::MissingJobId {
            command: command.to_string(),
        }),
        Some(id) => Ok(serde_json::from_value(id)?),
    }
}

/// Builds an error from a non-2xx answer, preferring the `errortext` of the
/// command's response envelope over the bare status line.
fn api_error(status: u16, reason: Option<&str>, body: &str) -> TransportError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let detail = parsed.as_ref().and_then(|v| {
        if v.get("errortext").is_some() {
            return Some(v);
        }
        v.as_object()?
            .iter()
            .find(|(k, inner)| k.ends_with("response") && inner.get("errortext").is_some())
            .map(|(_, inner)| inner)
    });

    match detail {
        Some(d) => TransportError::Api {
            status,
            code: d.get("errorcode").and_then(Value::as_i64),
            text: d
                .get("errortext")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        None => TransportError::Api {
            status,
            code: None,
            text: reason.unwrap_or("unexpected status").to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_wrapped_pending_job() {
        let body = json!({
            "queryasyncjobresultresponse": {
                "jobid": "9f1c",
                "jobstatus": 0,
                "jobprocstatus": 0,
                "jobresultcode": 0,
                "cmd": "org.apache.cloudstack.api.command.user.vm.DeployVMCmd",
                "created": "2024-03-01T10:15:00+0000"
            }
        });
        let job = decode_job(&JobId::from("9f1c"), body).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.proc_status, Some(0));
        assert!(job.cmd.unwrap().ends_with("DeployVMCmd"));
        assert_eq!(job.created.unwrap().to_rfc3339(), "2024-03-01T10:15:00+00:00");
    }

    #[test]
    fn decodes_bare_success_and_failure() {
        let ok = decode_job(
            &JobId::from(7),
            json!({ "jobstatus": 1, "jobresult": { "virtualmachine": { "id": "vm-1" } } }),
        )
        .unwrap();
        assert_eq!(ok.job_id, JobId::from("7"));
        assert_eq!(
            ok.status,
            JobStatus::Succeeded(json!({ "virtualmachine": { "id": "vm-1" } }))
        );

        let failed = decode_job(
            &JobId::from(7),
            json!({ "jobstatus": 2, "jobresult": { "errorcode": 530, "errortext": "no host" } }),
        )
        .unwrap();
        assert_eq!(
            failed.status,
            JobStatus::Failed(JobFailure::new(Some(530), "no host"))
        );
    }

    #[test]
    fn unknown_or_missing_status_is_a_decode_error() {
        let err = decode_job(&JobId::from("x"), json!({ "jobstatus": 9 })).unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));

        let err = decode_job(&JobId::from("x"), json!({ "nothing": true })).unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[test]
    fn job_id_extraction() {
        let body = json!({ "deployvirtualmachineresponse": { "id": "vm", "jobid": "j-1" } });
        assert_eq!(
            extract_job_id("deployVirtualMachine", &body).unwrap(),
            JobId::from("j-1")
        );
        assert_eq!(
            extract_job_id("x", &json!({ "jobid": 12 })).unwrap(),
            JobId::from(12)
        );
        assert!(matches!(
            extract_job_id("listZones", &json!({ "listzonesresponse": {} })),
            Err(TransportError::MissingJobId { .. })
        ));
    }

    #[test]
    fn api_error_prefers_envelope_text() {
        let err = api_error(
            431,
            Some("Unknown"),
            r#"{"deletevolumeresponse":{"errorcode":431,"errortext":"volume is attached"}}"#,
        );
        match err {
            TransportError::Api { status, code, text } => {
                assert_eq!(status, 431);
                assert_eq!(code, Some(431));
                assert_eq!(text, "volume is attached");
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = api_error(502, Some("Bad Gateway"), "<html>");
        assert_eq!(err.to_string(), "API error 502: Bad Gateway");
    }

    #[test]
    fn command_url_carries_session_key() {
        let session = Session::new(Url::parse("http://mgmt/client/api").unwrap())
            .with_session_key("k=1");
        let client = ApiClient::new(session, Duration::from_secs(1)).unwrap();
        let url = client.command_url(QUERY_JOB_COMMAND, [("jobId", "42")]);
        assert_eq!(
            url.as_str(),
            "http://mgmt/client/api?command=queryAsyncJobResult&jobId=42&response=json&sessionkey=k%3D1"
        );
    }
}
