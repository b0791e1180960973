//! Tool registry and the repository tools the agent can run.
//!
//! Tools are stateless; the repository they act on is supplied at call time
//! through [`BoundTools`], so one registry serves every job even when jobs
//! target different local checkouts.

mod git;
mod inspect;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use git::{CreateCommit, GetDiff};
pub(crate) use git::{git_output, run_git_command};
pub use inspect::{CalculateLocPerLanguage, FileNode, ScanFileTree};

/// Tools whose raw output gets a second, natural-language LLM pass.
pub const ANALYZABLE_TOOLS: &[&str] = &["calculate_loc_per_language", "get_diff"];

/// Whether a tool's output should be interpreted by the LLM before reporting.
pub fn is_analyzable(tool_name: &str) -> bool {
    ANALYZABLE_TOOLS.contains(&tool_name)
}

/// A locally executed operation the LLM (or a direct job) can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the keyword arguments.
    fn parameters_schema(&self) -> Value;

    /// Run the tool against `repo`. Expected domain failures (git errors,
    /// missing files) come back inside the returned payload; `Err` is kept for
    /// unusable arguments and I/O the tool cannot describe.
    async fn execute(&self, args: Value, repo: &Path) -> anyhow::Result<Value>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Repository path '{0}' is not a directory")]
    NotADirectory(PathBuf),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// Name and description of a registered tool, as shown to the LLM.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    /// Argument names declared by the schema, sorted by name.
    pub fn argument_names(&self) -> Vec<String> {
        self.parameters["properties"]
            .as_object()
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Registry of available tools, keyed by unique name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the repository inspection and mutation tools.
    pub fn with_repository_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ScanFileTree));
        registry.register(Arc::new(CalculateLocPerLanguage));
        registry.register(Arc::new(CreateCommit));
        registry.register(Arc::new(GetDiff));
        registry
    }

    /// Add a tool; a tool with the same name replaces the earlier one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    /// Tool names in registration order (the agent's declared capabilities).
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Bind the registry to a repository directory for one job.
    pub fn bind(&self, repo: impl Into<PathBuf>) -> Result<BoundTools<'_>, RegistryError> {
        let repo = repo.into();
        if !repo.is_dir() {
            return Err(RegistryError::NotADirectory(repo));
        }
        Ok(BoundTools {
            registry: self,
            repo,
        })
    }
}

/// A registry view whose tools all operate on one repository.
pub struct BoundTools<'a> {
    registry: &'a ToolRegistry,
    repo: PathBuf,
}

impl BoundTools<'_> {
    /// Execute a tool by name with keyword arguments.
    pub async fn execute(&self, name: &str, args: Value) -> anyhow::Result<Value> {
        let tool = self
            .registry
            .tools
            .get(name)
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))?;

        // A null argument set means "no arguments".
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };

        tracing::debug!(tool = name, repo = %self.repo.display(), "Executing tool");
        tool.execute(args, &self.repo).await
    }
}

/// Render a tool output the way it is shown to the LLM and in summaries:
/// strings verbatim, everything else as compact JSON.
pub fn render_output(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The error a tool reported in its own output, if it failed.
///
/// Tools signal failure with `{"error": "..."}`, optionally alongside
/// `"success": false`. An output with `"success": true` never counts.
pub fn reported_error(output: &Value) -> Option<&str> {
    let object = output.as_object()?;
    if object.get("success").and_then(Value::as_bool) == Some(true) {
        return None;
    }
    object.get("error").and_then(Value::as_str)
}
