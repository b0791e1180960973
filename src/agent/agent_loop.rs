//! Core agent loop implementation.
//!
//! One pass of the loop: heartbeat `idle`, request jobs, then for each job
//! report `start`, run it (directly or through LLM turns), report
//! `complete`, flush telemetry and go back to `idle`. Jobs never overlap.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::jobs::{
    AgentStatus, Job, JobOutcome, JobPoll, JobServerClient, JobServerError, ProgressUpdate,
};
use crate::llm::{ChatMessage, LlmClient, OpenAiCompatClient};
use crate::tools::{is_analyzable, render_output, reported_error, BoundTools, ToolRegistry};

use super::parser::{parse_model_reply, ModelReply, ParsedToolCall};
use super::prompt::{build_analysis_prompt, build_job_prompt};
use super::state::{AgentMessage, AgentState, JobMetrics};

/// What one poll of the job server produced.
#[derive(Debug)]
pub enum PollOutcome {
    /// Nothing to do (`204`, an empty batch, or only jobs without ids).
    NoJob,
    /// This many jobs were processed, successfully or not.
    Processed(usize),
    /// The job request itself failed.
    Unavailable(JobServerError),
}

impl PollOutcome {
    /// How long to wait before the next poll.
    pub fn backoff(&self, config: &Config) -> Option<Duration> {
        match self {
            PollOutcome::NoJob => Some(config.idle_backoff),
            PollOutcome::Processed(_) => None,
            PollOutcome::Unavailable(JobServerError::Transport(_)) => Some(config.error_backoff),
            PollOutcome::Unavailable(_) => Some(config.idle_backoff),
        }
    }
}

/// The job-polling agent.
pub struct Agent {
    config: Config,
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    server: JobServerClient,
}

impl Agent {
    /// Create an agent with the repository tools and an OpenAI-compatible LLM.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let llm = Arc::new(OpenAiCompatClient::from_config(&config)?);
        Self::with_parts(config, llm, ToolRegistry::with_repository_tools())
    }

    /// Create an agent from explicit collaborators.
    pub fn with_parts(
        config: Config,
        llm: Arc<dyn LlmClient>,
        tools: ToolRegistry,
    ) -> anyhow::Result<Self> {
        let server = JobServerClient::from_config(&config)?;
        Ok(Self {
            config,
            llm,
            tools,
            server,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Poll and process jobs until `shutdown` is cancelled.
    ///
    /// Shutdown is observed between polls and during backoff sleeps; a job
    /// already in progress runs to completion.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            agent_id = %self.config.agent_id,
            version = %self.config.agent_version,
            api = %self.config.api_base_url,
            llm = %self.config.llm_base_url,
            repo = %self.config.repo_path.display(),
            "Starting agent"
        );

        while !shutdown.is_cancelled() {
            let outcome = self.poll_once().await;
            let Some(delay) = outcome.backoff(&self.config) else {
                continue;
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Agent stopped");
    }

    /// Send an idle heartbeat, request jobs, and process whatever arrives.
    pub async fn poll_once(&self) -> PollOutcome {
        self.server.heartbeat(AgentStatus::Idle, None).await;

        let jobs = match self
            .server
            .request_jobs(self.tools.names(), self.config.max_jobs)
            .await
        {
            Ok(JobPoll::Jobs(jobs)) => jobs,
            Ok(JobPoll::NoJob) => {
                tracing::debug!("No job available, waiting");
                return PollOutcome::NoJob;
            }
            Err(e @ JobServerError::Transport(_)) => {
                tracing::error!(
                    "Could not connect to job server: {}. Retrying in {}s",
                    e,
                    self.config.error_backoff.as_secs()
                );
                return PollOutcome::Unavailable(e);
            }
            Err(e) => {
                tracing::warn!("Job request failed: {}", e);
                return PollOutcome::Unavailable(e);
            }
        };

        let mut processed = 0;
        for job in &jobs {
            let Some(job_id) = job.id() else {
                tracing::warn!(job_type = %job.job_type, "Received job without an id, skipping");
                continue;
            };
            self.process_job(&job_id, job).await;
            processed += 1;
        }

        if processed == 0 {
            PollOutcome::NoJob
        } else {
            PollOutcome::Processed(processed)
        }
    }

    /// Run one job to completion and report its outcome. Never fails: any
    /// error (or panic) is reported to the server as a failed job.
    pub async fn process_job(&self, job_id: &str, job: &Job) -> JobOutcome {
        tracing::info!(job_id, job_type = %job.job_type, "Received job");
        let mut metrics = JobMetrics::start();

        let result = AssertUnwindSafe(self.try_process_job(job_id, job, &mut metrics))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(anyhow::anyhow!("{}", panic_message(&*panic))));

        let outcome = match result {
            Ok(outcome) => {
                tracing::info!(job_id, "Job completed");
                outcome
            }
            Err(e) => {
                tracing::error!(job_id, "Job failed: {:?}", e);
                self.server
                    .progress(job_id, &ProgressUpdate::message(format!("Job failed: {}", e)))
                    .await;
                JobOutcome::failed(format!("An unexpected error occurred: {}", e), e.to_string())
            }
        };

        self.server.job_completed(job_id, &outcome).await;

        tracing::info!(
            job_id,
            duration_ms = metrics.duration_ms() as u64,
            tool_calls = metrics.tool_calls(),
            "Job metrics"
        );
        self.server.telemetry(job_id, &metrics).await;
        self.server.heartbeat(AgentStatus::Idle, None).await;

        outcome
    }

    async fn try_process_job(
        &self,
        job_id: &str,
        job: &Job,
        metrics: &mut JobMetrics,
    ) -> anyhow::Result<JobOutcome> {
        let direct = job.is_direct_tool_call();

        if direct {
            self.server
                .heartbeat(AgentStatus::Processing, Some(job_id))
                .await;
            self.server.job_started(job_id).await;
        } else {
            self.server
                .heartbeat(AgentStatus::Assigned, Some(job_id))
                .await;
            self.server.job_started(job_id).await;
            self.server
                .progress(
                    job_id,
                    &ProgressUpdate::message("Job accepted by agent.").with_percent(0),
                )
                .await;
        }

        let repo = self.resolve_repo_path(job);
        let tools = self.tools.bind(&repo)?;
        tracing::info!(job_id, repo = %repo.display(), direct, "Processing job");

        if direct {
            self.run_direct_tool_call(job_id, job, &tools, metrics).await
        } else {
            self.server
                .heartbeat(AgentStatus::Processing, Some(job_id))
                .await;
            self.run_llm_directed(job_id, job, &tools, metrics).await
        }
    }

    /// The job's own project path when it exists locally, otherwise the
    /// configured repository.
    fn resolve_repo_path(&self, job: &Job) -> PathBuf {
        if !self.config.force_repo_path {
            if let Some(path) = job.project_local_path() {
                let path = PathBuf::from(path);
                if path.is_dir() {
                    return path;
                }
                tracing::warn!(
                    project_path = %path.display(),
                    "Project path not found locally, using the configured repository"
                );
            }
        }
        self.config.repo_path.clone()
    }

    /// Invoke the named tool without asking the LLM which tool to use.
    async fn run_direct_tool_call(
        &self,
        job_id: &str,
        job: &Job,
        tools: &BoundTools<'_>,
        metrics: &mut JobMetrics,
    ) -> anyhow::Result<JobOutcome> {
        let tool_name = job
            .tool_name()
            .ok_or_else(|| anyhow::anyhow!("Payload does not specify 'tool_name'"))?;
        if !self.tools.contains(tool_name) {
            anyhow::bail!("No tool named '{}'", tool_name);
        }
        let args = job.tool_args();

        tracing::info!(job_id, tool = tool_name, args = %args, "Directly invoking tool");
        self.server
            .progress(
                job_id,
                &ProgressUpdate::message(format!("Directly invoking tool: {}", tool_name))
                    .with_percent(30),
            )
            .await;
        self.server
            .tool_callback(job_id, tool_name, &args, None)
            .await;

        metrics.record_tool_calls(1);
        let output = tools.execute(tool_name, args.clone()).await?;

        self.server
            .tool_callback(job_id, tool_name, &args, Some(&output))
            .await;

        if let Some(error) = reported_error(&output) {
            anyhow::bail!("Tool '{}' failed: {}", tool_name, error);
        }

        let rendered = render_output(&output);
        let summary = if is_analyzable(tool_name) {
            self.server
                .progress(
                    job_id,
                    &ProgressUpdate::message(format!(
                        "Analyzing tool output from {}...",
                        tool_name
                    ))
                    .with_percent(70),
                )
                .await;
            match self.analyze(tool_name, &rendered).await {
                Ok(Some(analysis)) => analysis,
                Ok(None) => rendered,
                Err(e) => {
                    tracing::error!(job_id, tool = tool_name, "Analysis failed: {:?}", e);
                    rendered
                }
            }
        } else {
            rendered
        };

        self.server
            .progress(
                job_id,
                &ProgressUpdate::message("Tool execution and analysis finished.").with_percent(100),
            )
            .await;

        Ok(JobOutcome::success(summary, job.result_url()))
    }

    /// Let the LLM pick tools turn by turn until it gives a plain answer.
    async fn run_llm_directed(
        &self,
        job_id: &str,
        job: &Job,
        tools: &BoundTools<'_>,
        metrics: &mut JobMetrics,
    ) -> anyhow::Result<JobOutcome> {
        let prompt = build_job_prompt(job, &self.tools);
        let mut state = AgentState::new(job_id.to_string(), prompt, job.payload.clone());

        self.run_turns(&mut state, tools, metrics).await?;

        let last_tool = state
            .last_tool_result()
            .filter(|(name, _)| is_analyzable(name))
            .map(|(name, output)| (name.to_string(), output.to_string()));
        if let Some((tool_name, output)) = last_tool {
            match self.analyze(&tool_name, &output).await {
                Ok(Some(analysis)) => state.push(AgentMessage::Assistant {
                    content: analysis,
                    tool_calls: Vec::new(),
                }),
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(job_id, tool = %tool_name, "Analysis failed: {:?}", e);
                }
            }
        }

        let summary = state
            .last_message()
            .map(|message| message.content().to_string())
            .unwrap_or_default();
        tracing::info!(job_id, summary_len = summary.len(), "Job execution finished");

        self.server
            .progress(
                job_id,
                &ProgressUpdate::message("Job execution finished.").with_percent(100),
            )
            .await;

        Ok(JobOutcome::success(summary, job.result_url()))
    }

    async fn run_turns(
        &self,
        state: &mut AgentState,
        tools: &BoundTools<'_>,
        metrics: &mut JobMetrics,
    ) -> anyhow::Result<()> {
        for turn in 0..self.config.max_turns {
            tracing::debug!(job_id = %state.job_id, "Agent turn {}", turn + 1);

            let reply = self.llm.complete(&state.chat_messages()).await?;

            match parse_model_reply(&reply) {
                ModelReply::PlainAnswer(answer) => {
                    state.push(AgentMessage::Assistant {
                        content: answer,
                        tool_calls: Vec::new(),
                    });
                    return Ok(());
                }
                ModelReply::ToolCalls(calls) => {
                    state.push(AgentMessage::Assistant {
                        content: reply,
                        tool_calls: calls.clone(),
                    });
                    self.execute_tool_calls(state, tools, &calls, metrics)
                        .await;
                }
            }
        }

        Err(anyhow::anyhow!(
            "Max turns ({}) reached without a final answer",
            self.config.max_turns
        ))
    }

    /// Execute the model's tool calls in order. Tool errors become the tool's
    /// output so the model can react to them.
    async fn execute_tool_calls(
        &self,
        state: &mut AgentState,
        tools: &BoundTools<'_>,
        calls: &[ParsedToolCall],
        metrics: &mut JobMetrics,
    ) {
        let job_id = state.job_id.clone();
        metrics.record_tool_calls(calls.len());

        for call in calls {
            tracing::info!(job_id = %job_id, tool = %call.name, args = %call.arguments, "Calling tool");
            self.server
                .progress(
                    &job_id,
                    &ProgressUpdate::message(format!("Calling tool '{}'", call.name)),
                )
                .await;
            self.server
                .tool_callback(&job_id, &call.name, &call.arguments, None)
                .await;

            let output = match tools.execute(&call.name, call.arguments.clone()).await {
                Ok(output) => output,
                Err(e) => {
                    tracing::warn!(job_id = %job_id, tool = %call.name, "Tool failed: {}", e);
                    Value::String(format!("Error: {}", e))
                }
            };

            self.server
                .tool_callback(&job_id, &call.name, &call.arguments, Some(&output))
                .await;

            state.push(AgentMessage::ToolResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content: render_output(&output),
            });
        }
    }

    /// Second LLM pass interpreting an analyzable tool's output.
    async fn analyze(&self, tool_name: &str, output: &str) -> anyhow::Result<Option<String>> {
        let Some(prompt) = build_analysis_prompt(tool_name, output) else {
            return Ok(None);
        };
        tracing::info!(tool = tool_name, "Analyzing tool output");
        let analysis = self.llm.complete(&[ChatMessage::user(prompt)]).await?;
        Ok(Some(analysis))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic while processing job".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn backoff_per_outcome() {
        let mut config = Config::new(
            "http://127.0.0.1:1".into(),
            "http://127.0.0.1:1".into(),
            PathBuf::from("."),
        );
        config.idle_backoff = Duration::from_secs(10);
        config.error_backoff = Duration::from_secs(30);

        assert_eq!(
            PollOutcome::NoJob.backoff(&config),
            Some(Duration::from_secs(10))
        );
        assert_eq!(PollOutcome::Processed(1).backoff(&config), None);
        let malformed = PollOutcome::Unavailable(JobServerError::MalformedBody("x".into()));
        assert_eq!(malformed.backoff(&config), Some(Duration::from_secs(10)));

        let transport_error = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        let unreachable = PollOutcome::Unavailable(JobServerError::Transport(transport_error));
        assert_eq!(unreachable.backoff(&config), Some(Duration::from_secs(30)));
    }

    #[test]
    fn repo_path_prefers_existing_project_path() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().to_string_lossy().to_string();
        let config = Config::new(
            "http://127.0.0.1:1".into(),
            "http://127.0.0.1:1".into(),
            PathBuf::from("/configured/repo"),
        );
        let agent = Agent::new(config.clone()).unwrap();

        let job = Job::new(
            "1",
            "repository_analysis",
            serde_json::json!({ "project": { "local_path": project } }),
        );
        assert_eq!(agent.resolve_repo_path(&job), dir.path());

        let missing = Job::new(
            "2",
            "repository_analysis",
            serde_json::json!({ "project": { "local_path": "/no/such/dir" } }),
        );
        assert_eq!(
            agent.resolve_repo_path(&missing),
            Path::new("/configured/repo")
        );

        let mut forced = config;
        forced.force_repo_path = true;
        let agent = Agent::new(forced).unwrap();
        assert_eq!(agent.resolve_repo_path(&job), Path::new("/configured/repo"));
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "panic: boom");
    }
}
