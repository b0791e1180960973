//! Wire types for the job server contract.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /agent/jobs/request`.
#[derive(Debug, Clone, Serialize)]
pub struct JobRequest {
    pub agent_id: String,
    /// Names of every tool this agent can run.
    pub capabilities: Vec<String>,
    pub status: AgentStatus,
    pub max_jobs: u32,
    pub agent_version: String,
}

/// `200` body of `POST /agent/jobs/request`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobBatch {
    #[serde(default)]
    pub jobs: Vec<Job>,
}

/// Kind of work a job asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobType {
    RepositoryAnalysis,
    CodeGeneration,
    DirectToolCall,
    Other(String),
}

impl JobType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "repository_analysis" => JobType::RepositoryAnalysis,
            "code_generation" => JobType::CodeGeneration,
            "direct_tool_call" => JobType::DirectToolCall,
            other => JobType::Other(other.to_string()),
        }
    }
}

/// A unit of work assigned by the job server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Job {
    #[serde(default)]
    job_id: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    pub job_type: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub payload: Map<String, Value>,
    #[serde(default)]
    pub project: Option<Value>,
}

impl Job {
    /// Build a job locally (tests and tooling).
    pub fn new(job_id: impl Into<String>, job_type: impl Into<String>, payload: Value) -> Self {
        Self {
            job_id: Some(Value::String(job_id.into())),
            id: None,
            job_type: job_type.into(),
            payload: match payload {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            project: None,
        }
    }

    /// The job identifier; `job_id` wins over `id`, numbers are stringified.
    pub fn id(&self) -> Option<String> {
        self.job_id
            .as_ref()
            .and_then(id_string)
            .or_else(|| self.id.as_ref().and_then(id_string))
    }

    pub fn kind(&self) -> JobType {
        JobType::parse(&self.job_type)
    }

    /// Explicit tool requested by the payload, if any.
    pub fn tool_name(&self) -> Option<&str> {
        self.payload
            .get("tool_name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
    }

    /// Declared tool arguments; absent or null means none.
    pub fn tool_args(&self) -> Value {
        match self.payload.get("tool_args") {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(args) => args.clone(),
        }
    }

    /// Whether the job names its tool and skips LLM tool selection.
    pub fn is_direct_tool_call(&self) -> bool {
        match self.kind() {
            JobType::DirectToolCall => true,
            JobType::RepositoryAnalysis => self.tool_name().is_some(),
            _ => false,
        }
    }

    /// Human-readable task: `description`, `prompt`, `title`, then the job type.
    pub fn task_description(&self) -> String {
        ["description", "prompt", "title"]
            .iter()
            .filter_map(|key| self.payload.get(*key).and_then(Value::as_str))
            .find(|text| !text.trim().is_empty())
            .unwrap_or(self.job_type.as_str())
            .to_string()
    }

    /// `payload.metadata.result_url`, passed through on completion.
    pub fn result_url(&self) -> Option<String> {
        self.payload
            .get("metadata")
            .and_then(|meta| meta.get("result_url"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Local checkout named by `payload.project` or the job's `project`.
    pub fn project_local_path(&self) -> Option<String> {
        self.payload
            .get("project")
            .into_iter()
            .chain(self.project.as_ref())
            .filter_map(|project| project.get("local_path").and_then(Value::as_str))
            .find(|path| !path.trim().is_empty())
            .map(str::to_string)
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Agent status as reported by heartbeats and job requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Assigned,
    Processing,
}

/// Body of `POST /agent/heartbeat`.
#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat<'a> {
    pub agent_id: &'a str,
    pub status: AgentStatus,
    pub agent_version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_job_id: Option<&'a str>,
}

/// Body of `POST /agent/jobs/{id}/start`.
#[derive(Debug, Clone, Serialize)]
pub struct JobStarted<'a> {
    pub agent_id: &'a str,
    /// UTC, ISO-8601, second precision.
    pub start_time: String,
}

/// Final outcome of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Success,
    Failed,
}

/// What the agent reports when a job ends.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub status: CompletionStatus,
    pub summary: Option<String>,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
}

impl JobOutcome {
    pub fn success(summary: impl Into<String>, result_url: Option<String>) -> Self {
        Self {
            status: CompletionStatus::Success,
            summary: Some(summary.into()),
            result_url,
            error_message: None,
        }
    }

    pub fn failed(summary: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: CompletionStatus::Failed,
            summary: Some(summary.into()),
            result_url: None,
            error_message: Some(error.into()),
        }
    }
}

/// Body of `POST /agent/jobs/{id}/complete`.
#[derive(Debug, Clone, Serialize)]
pub struct JobCompleted<'a> {
    pub agent_id: &'a str,
    pub status: CompletionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_result_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<&'a str>,
}

/// One progress-log entry. Absent fields are left out of the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_complete: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intermediate_artifact: Option<Value>,
}

impl ProgressUpdate {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            log_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_percent(mut self, percent: u8) -> Self {
        self.percent_complete = Some(percent.min(100));
        self
    }
}

/// Body of `POST /agent/jobs/{id}/progress`.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport<'a> {
    pub agent_id: &'a str,
    #[serde(flatten)]
    pub update: &'a ProgressUpdate,
}

/// Body of `POST /agent/callbacks/tool`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallback<'a> {
    pub run_id: &'a str,
    pub tool_name: &'a str,
    pub tool_input: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<&'a Value>,
}

/// A single named metric value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric<'a> {
    pub name: &'a str,
    pub value: f64,
    pub job_id: &'a str,
}

/// Body of `POST /agent/telemetry`.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryReport<'a> {
    pub agent_id: &'a str,
    pub metrics: Vec<Metric<'a>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_id_prefers_job_id_and_accepts_numbers() {
        let batch: JobBatch = serde_json::from_value(json!({
            "jobs": [
                { "job_id": 42, "id": 7, "job_type": "repository_analysis", "payload": null },
                { "id": "abc", "job_type": "code_generation" },
                { "job_type": "direct_tool_call" }
            ]
        }))
        .unwrap();

        assert_eq!(batch.jobs[0].id().as_deref(), Some("42"));
        assert!(batch.jobs[0].payload.is_empty());
        assert_eq!(batch.jobs[1].id().as_deref(), Some("abc"));
        assert_eq!(batch.jobs[1].kind(), JobType::CodeGeneration);
        assert_eq!(batch.jobs[2].id(), None);
    }

    #[test]
    fn direct_tool_call_classification() {
        let direct = Job::new("1", "direct_tool_call", json!({}));
        assert!(direct.is_direct_tool_call());

        let analysis_with_tool = Job::new(
            "2",
            "repository_analysis",
            json!({ "tool_name": "get_diff" }),
        );
        assert!(analysis_with_tool.is_direct_tool_call());

        let analysis = Job::new("3", "repository_analysis", json!({ "tool_name": "  " }));
        assert!(!analysis.is_direct_tool_call());

        let codegen = Job::new("4", "code_generation", json!({ "tool_name": "get_diff" }));
        assert!(!codegen.is_direct_tool_call());
    }

    #[test]
    fn task_description_priority() {
        let job = Job::new(
            "1",
            "repository_analysis",
            json!({ "prompt": "from prompt", "title": "from title", "description": "" }),
        );
        assert_eq!(job.task_description(), "from prompt");

        let bare = Job::new("2", "repository_analysis", json!({}));
        assert_eq!(bare.task_description(), "repository_analysis");
    }

    #[test]
    fn tool_args_default_to_empty_object() {
        let job = Job::new("1", "direct_tool_call", json!({ "tool_args": null }));
        assert_eq!(job.tool_args(), json!({}));
        let job = Job::new("1", "direct_tool_call", json!({ "tool_args": { "commit_hash": "abc" } }));
        assert_eq!(job.tool_args(), json!({ "commit_hash": "abc" }));
    }

    #[test]
    fn project_path_from_payload_or_job() {
        let job: Job = serde_json::from_value(json!({
            "job_id": "1",
            "job_type": "repository_analysis",
            "payload": { "metadata": { "result_url": "http://x/r" } },
            "project": { "local_path": "/srv/repo" }
        }))
        .unwrap();
        assert_eq!(job.project_local_path().as_deref(), Some("/srv/repo"));
        assert_eq!(job.result_url().as_deref(), Some("http://x/r"));

        let job = Job::new(
            "2",
            "repository_analysis",
            json!({ "project": { "local_path": "/from/payload" } }),
        );
        assert_eq!(job.project_local_path().as_deref(), Some("/from/payload"));
    }

    #[test]
    fn progress_report_omits_absent_fields() {
        let update = ProgressUpdate::message("Calling tool 'get_diff'");
        let body = serde_json::to_value(ProgressReport {
            agent_id: "a",
            update: &update,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({ "agent_id": "a", "log_message": "Calling tool 'get_diff'" })
        );

        let update = ProgressUpdate::message("done").with_percent(150);
        assert_eq!(update.percent_complete, Some(100));
    }
}
