//! Shared fixtures: an in-process job server, a scripted LLM, and Git repos.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use repo_agent::llm::{ChatMessage, LlmClient};
use repo_agent::Config;

/// One request the mock job server received.
#[derive(Debug, Clone)]
pub struct Recorded {
    /// Path relative to the API base, e.g. `/agent/heartbeat`.
    pub path: String,
    pub body: Value,
}

#[derive(Default)]
struct ServerState {
    batches: VecDeque<Value>,
    requests: Vec<Recorded>,
}

/// Job server that hands out queued batches, answers `204` once they run
/// out, and records every request it sees.
#[derive(Clone)]
pub struct MockJobServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
}

impl MockJobServer {
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(ServerState::default()));
        let app = Router::new()
            .fallback(handle)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock job server");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock job server");
        });

        Self { addr, state }
    }

    pub fn api_base_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    /// Queue a `{"jobs": [...]}` response for the next job request.
    pub fn push_jobs(&self, jobs: Vec<Value>) {
        self.state
            .lock()
            .unwrap()
            .batches
            .push_back(json!({ "jobs": jobs }));
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    /// Bodies posted to `path`, in order.
    pub fn bodies(&self, path: &str) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .map(|r| r.body)
            .collect()
    }

    /// Progress log messages for a job, in order.
    pub fn progress_messages(&self, job_id: &str) -> Vec<String> {
        self.bodies(&format!("/agent/jobs/{}/progress", job_id))
            .into_iter()
            .filter_map(|b| b["log_message"].as_str().map(str::to_string))
            .collect()
    }

    /// The single completion report for a job.
    pub fn completion(&self, job_id: &str) -> Value {
        let mut bodies = self.bodies(&format!("/agent/jobs/{}/complete", job_id));
        assert_eq!(bodies.len(), 1, "expected one completion for {}", job_id);
        bodies.remove(0)
    }
}

async fn handle(
    State(state): State<Arc<Mutex<ServerState>>>,
    uri: Uri,
    body: String,
) -> Response {
    let path = uri
        .path()
        .strip_prefix("/api/v1")
        .unwrap_or(uri.path())
        .to_string();
    let body = serde_json::from_str(&body).unwrap_or(Value::Null);

    let mut state = state.lock().unwrap();
    state.requests.push(Recorded {
        path: path.clone(),
        body,
    });

    if path == "/agent/jobs/request" {
        return match state.batches.pop_front() {
            Some(batch) => Json(batch).into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        };
    }
    Json(json!({ "ok": true })).into_response()
}

/// LLM that replays canned replies and records what it was sent.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted LLM has no replies left"))
    }
}

/// Agent configuration pointed at the mock server and `repo`.
pub fn test_config(server: &MockJobServer, repo: &Path) -> Config {
    let mut config = Config::new(
        server.api_base_url(),
        "http://127.0.0.1:9/v1".to_string(),
        repo.to_path_buf(),
    );
    config.idle_backoff = Duration::from_millis(50);
    config.error_backoff = Duration::from_millis(50);
    config.report_timeout = Duration::from_secs(5);
    config
}

pub fn git(repo: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .expect("git must be installed to run these tests");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// A repository with one commit: a Rust source and a Python source.
pub fn committed_repo() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let repo = dir.path().to_path_buf();

    git(&repo, &["init", "-q"]);
    git(&repo, &["config", "user.name", "Test User"]);
    git(&repo, &["config", "user.email", "test@test.com"]);
    git(&repo, &["config", "commit.gpgsign", "false"]);

    std::fs::create_dir_all(repo.join("src")).unwrap();
    std::fs::write(repo.join("src/main.rs"), "fn main() {\n\n    run();\n}\n").unwrap();
    std::fs::write(repo.join("tool.py"), "print('hi')\n").unwrap();
    std::fs::write(repo.join("README.md"), "# Demo\n").unwrap();

    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-q", "-m", "Initial commit"]);

    (dir, repo)
}
