use axum::{
    extract::{Query, State},
    Json,
};
use jobpoll::{JobFailure, JobStatus};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{ApiError, CommandError};
use crate::state::{AppState, JobRecord};

pub const DEFAULT_SIMULATED_DURATION_MS: u64 = 1000;

/// Error code reported for jobs that fail on the backend.
const JOB_FAILURE_CODE: i64 = 530;

type Params = HashMap<String, String>;

#[derive(Serialize)]
pub struct JobView {
    pub jobid: Uuid,
    pub cmd: String,
    pub jobstatus: u8,
    pub jobprocstatus: u8,
    pub jobresultcode: i64,
    pub jobresulttype: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobresult: Option<Value>,
    pub created: String,
}

impl JobView {
    fn new(job_id: Uuid, record: JobRecord) -> Self {
        let jobstatus = record.status.code();
        let (jobresultcode, jobresult) = match record.status {
            JobStatus::Pending => (0, None),
            JobStatus::Succeeded(result) => (0, Some(result)),
            JobStatus::Failed(failure) => (
                JOB_FAILURE_CODE,
                Some(json!({
                    "errorcode": failure.code.unwrap_or(JOB_FAILURE_CODE),
                    "errortext": failure.text,
                })),
            ),
        };
        Self {
            jobid: job_id,
            cmd: record.cmd,
            jobstatus,
            jobprocstatus: 0,
            jobresultcode,
            jobresulttype: "object",
            jobresult,
            created: record.created.to_rfc3339(),
        }
    }
}

/// GET /api?command=...
pub async fn dispatch(
    State(state): State<AppState>,
    Query(params): Query<Params>,
) -> Result<Json<Value>, CommandError> {
    let command = params.get("command").cloned().unwrap_or_default();
    debug!(%command, "api call");

    let result = match command.as_str() {
        "queryAsyncJobResult" => query_async_job_result(&state, &params),
        "simulateAsyncJob" => simulate_async_job(&state, &params),
        "listAsyncJobs" => Ok(list_async_jobs(&state)),
        "" => Err(ApiError::MissingParam("command")),
        other => Err(ApiError::UnknownCommand(other.to_string())),
    };

    let body = result.map_err(|e| e.for_command(&command))?;
    let mut envelope = serde_json::Map::new();
    envelope.insert(format!("{}response", command.to_lowercase()), body);
    Ok(Json(Value::Object(envelope)))
}

fn query_async_job_result(state: &AppState, params: &Params) -> Result<Value, ApiError> {
    let raw = params
        .get("jobId")
        .or_else(|| params.get("jobid"))
        .ok_or(ApiError::MissingParam("jobId"))?;
    let job_id = Uuid::parse_str(raw).map_err(|_| ApiError::UnknownJob(raw.clone()))?;
    let record = state
        .job(&job_id)
        .ok_or_else(|| ApiError::UnknownJob(raw.clone()))?;

    Ok(json!(JobView::new(job_id, record)))
}

/// Accepts a job that finishes by itself after `durationMs`.
fn simulate_async_job(state: &AppState, params: &Params) -> Result<Value, ApiError> {
    let duration_ms = match params.get("durationMs") {
        Some(raw) => raw.parse::<u64>().map_err(|_| ApiError::InvalidParam {
            name: "durationMs",
            value: raw.clone(),
        })?,
        None => DEFAULT_SIMULATED_DURATION_MS,
    };
    let succeed = match params.get("outcome").map(String::as_str) {
        None | Some("success") => true,
        Some("failure") => false,
        Some(other) => {
            return Err(ApiError::InvalidParam {
                name: "outcome",
                value: other.to_string(),
            })
        }
    };
    let message = params.get("message").cloned();

    let job_id = state.accept_job("simulateAsyncJob");
    info!(%job_id, duration_ms, succeed, "accepted simulated job");

    let state_clone = state.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(duration_ms)).await;
        let status = if succeed {
            JobStatus::Succeeded(json!({
                "simulation": {
                    "id": job_id,
                    "message": message.unwrap_or_else(|| "done".into()),
                }
            }))
        } else {
            JobStatus::Failed(JobFailure::new(
                Some(JOB_FAILURE_CODE),
                message.unwrap_or_else(|| "simulated failure".into()),
            ))
        };
        state_clone.finish_job(job_id, status);
        debug!(%job_id, "simulated job finished");
    });

    Ok(json!({ "jobid": job_id }))
}

fn list_async_jobs(state: &AppState) -> Value {
    let mut jobs: Vec<JobView> = state
        .jobs
        .iter()
        .map(|entry| JobView::new(*entry.key(), entry.value().clone()))
        .collect();
    jobs.sort_by(|a, b| a.created.cmp(&b.created));

    json!({
        "count": jobs.len(),
        "asyncjobs": jobs,
    })
}
