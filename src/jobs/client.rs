//! HTTP client for the job server.
//!
//! `request_jobs` is the only call whose failure reaches the caller. Every
//! other call is a one-way notification: failures are logged and dropped,
//! never retried, and never interrupt the agent loop.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use super::types::{
    AgentStatus, Heartbeat, Job, JobBatch, JobCompleted, JobOutcome, JobRequest, JobStarted,
    Metric, ProgressReport, ProgressUpdate, TelemetryReport, ToolCallback,
};
use crate::agent::JobMetrics;
use crate::config::Config;

#[derive(Debug, Error)]
pub enum JobServerError {
    /// The server could not be reached (connect, timeout, reset).
    #[error("job server unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected job server response {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    #[error("malformed job request response: {0}")]
    MalformedBody(String),
}

/// Result of one poll of the job queue.
#[derive(Debug)]
pub enum JobPoll {
    /// `204 No Content`, or a `200` with no jobs in it.
    NoJob,
    Jobs(Vec<Job>),
}

/// Client for the job server's agent endpoints.
#[derive(Clone)]
pub struct JobServerClient {
    client: reqwest::Client,
    base_url: String,
    agent_id: String,
    agent_version: String,
}

impl JobServerClient {
    pub fn new(
        base_url: impl Into<String>,
        agent_id: impl Into<String>,
        agent_version: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent_id: agent_id.into(),
            agent_version: agent_version.into(),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            config.api_base_url.clone(),
            config.agent_id.clone(),
            config.agent_version.clone(),
            config.report_timeout,
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Ask the server for up to `max_jobs` jobs matching `capabilities`.
    pub async fn request_jobs(
        &self,
        capabilities: Vec<String>,
        max_jobs: u32,
    ) -> Result<JobPoll, JobServerError> {
        let request = JobRequest {
            agent_id: self.agent_id.clone(),
            capabilities,
            status: AgentStatus::Idle,
            max_jobs,
            agent_version: self.agent_version.clone(),
        };

        tracing::debug!("Requesting jobs");
        let response = self
            .client
            .post(self.url("/agent/jobs/request"))
            .json(&request)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(JobPoll::NoJob),
            StatusCode::OK => {
                let body = response.text().await?;
                let batch: JobBatch = serde_json::from_str(&body)
                    .map_err(|e| JobServerError::MalformedBody(e.to_string()))?;
                if batch.jobs.is_empty() {
                    Ok(JobPoll::NoJob)
                } else {
                    Ok(JobPoll::Jobs(batch.jobs))
                }
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(JobServerError::UnexpectedStatus { status, body })
            }
        }
    }

    /// Liveness/status notification.
    pub async fn heartbeat(&self, status: AgentStatus, current_job_id: Option<&str>) {
        let body = Heartbeat {
            agent_id: &self.agent_id,
            status,
            agent_version: &self.agent_version,
            current_job_id,
        };
        self.notify("/agent/heartbeat", &body, "heartbeat").await;
    }

    /// Report the `start` phase of a job.
    pub async fn job_started(&self, job_id: &str) {
        let body = JobStarted {
            agent_id: &self.agent_id,
            start_time: utc_now_iso(),
        };
        if self
            .notify(&format!("/agent/jobs/{}/start", job_id), &body, "job start")
            .await
        {
            tracing::info!(job_id, "Reported job start");
        }
    }

    /// Report the `complete` phase of a job.
    pub async fn job_completed(&self, job_id: &str, outcome: &JobOutcome) {
        let body = JobCompleted {
            agent_id: &self.agent_id,
            status: outcome.status,
            summary: outcome.summary.as_deref(),
            final_result_url: outcome.result_url.as_deref(),
            error_message: outcome.error_message.as_deref(),
        };
        if self
            .notify(
                &format!("/agent/jobs/{}/complete", job_id),
                &body,
                "job completion",
            )
            .await
        {
            tracing::info!(job_id, status = ?outcome.status, "Reported job completion");
        }
    }

    /// Append an entry to the job's progress log.
    pub async fn progress(&self, job_id: &str, update: &ProgressUpdate) {
        let body = ProgressReport {
            agent_id: &self.agent_id,
            update,
        };
        self.notify(&format!("/agent/jobs/{}/progress", job_id), &body, "progress")
            .await;
    }

    /// Log a tool invocation: once with input only, again with the output.
    pub async fn tool_callback(
        &self,
        job_id: &str,
        tool_name: &str,
        tool_input: &Value,
        tool_output: Option<&Value>,
    ) {
        let body = ToolCallback {
            run_id: job_id,
            tool_name,
            tool_input,
            tool_output,
        };
        self.notify("/agent/callbacks/tool", &body, "tool callback")
            .await;
    }

    /// Flush end-of-job metrics.
    pub async fn telemetry(&self, job_id: &str, metrics: &JobMetrics) {
        let body = TelemetryReport {
            agent_id: &self.agent_id,
            metrics: vec![
                Metric {
                    name: "tool_calls",
                    value: metrics.tool_calls() as f64,
                    job_id,
                },
                Metric {
                    name: "job_duration_ms",
                    value: metrics.duration_ms() as f64,
                    job_id,
                },
            ],
        };
        self.notify("/agent/telemetry", &body, "telemetry").await;
    }

    /// POST `body` to `path`, swallowing every failure. Returns whether the
    /// server accepted it.
    async fn notify<T: Serialize + ?Sized>(&self, path: &str, body: &T, what: &str) -> bool {
        let result = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Failed to report {}: {}", what, e);
                false
            }
        }
    }
}

/// Current UTC time, ISO-8601 with second precision and a `Z` suffix.
pub fn utc_now_iso() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}
