//! Git mutation tools: committing and diffing.

use std::path::Path;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use super::Tool;

/// Diffs longer than this many characters are truncated before they reach the LLM.
const MAX_DIFF_CHARS: usize = 10_000;

const NO_COMMITS_MESSAGE: &str =
    "The repository has no commits yet. Modify some files and create a commit first.";

/// Stage the given files and create a commit.
pub struct CreateCommit;

#[async_trait]
impl Tool for CreateCommit {
    fn name(&self) -> &str {
        "create_commit"
    }

    fn description(&self) -> &str {
        "Stage the given files and create a new commit with the given message."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The commit message"
                },
                "files_to_add": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Files to stage, relative to the repository root. Missing files are skipped."
                }
            },
            "required": ["message", "files_to_add"]
        })
    }

    async fn execute(&self, args: Value, repo: &Path) -> anyhow::Result<Value> {
        let message = args["message"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Missing 'message' argument"))?;

        let files: Vec<&str> = args["files_to_add"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        tracing::info!(repo = %repo.display(), message, "Creating commit");

        match create_commit(message, &files, repo).await {
            Ok(hash) => {
                tracing::info!(commit = %hash, "Commit created");
                Ok(json!({ "success": true, "commit_hash": hash }))
            }
            Err(e) => {
                tracing::warn!("Commit not created: {}", e);
                Ok(json!({ "success": false, "error": e.to_string() }))
            }
        }
    }
}

async fn create_commit(message: &str, files: &[&str], repo: &Path) -> anyhow::Result<String> {
    let mut valid_files = Vec::new();
    for file in files {
        if tokio::fs::try_exists(repo.join(file)).await.unwrap_or(false) {
            valid_files.push(*file);
        } else {
            tracing::warn!(file, "File not found, cannot add to commit");
        }
    }

    if valid_files.is_empty() {
        anyhow::bail!("No valid files to commit.");
    }

    let mut add_args = vec!["add", "--"];
    add_args.extend(valid_files);
    run_git_command(&add_args, repo).await?;

    // Exit status 0 means the index matches HEAD (or is empty on an unborn branch).
    let staged = git_output(&["diff", "--cached", "--quiet"], repo).await?;
    match staged.status.code() {
        Some(0) => anyhow::bail!("No changes to commit."),
        Some(1) => {}
        _ => return Err(git_failure(&staged)),
    }

    run_git_command(&["commit", "-m", message], repo).await?;
    let hash = run_git_command(&["rev-parse", "HEAD"], repo).await?;
    Ok(hash.trim().to_string())
}

/// Show the diff of a commit, or of the working tree against `HEAD`.
pub struct GetDiff;

#[async_trait]
impl Tool for GetDiff {
    fn name(&self) -> &str {
        "get_diff"
    }

    fn description(&self) -> &str {
        "Return the changes (diff) of a specific commit, or of the working tree against HEAD."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "commit_hash": {
                    "type": "string",
                    "description": "Commit to show. \"HEAD\" (default) diffs the working tree against the last commit."
                }
            }
        })
    }

    async fn execute(&self, args: Value, repo: &Path) -> anyhow::Result<Value> {
        let commit_hash = args["commit_hash"].as_str().unwrap_or("HEAD");
        tracing::info!(commit = commit_hash, "Getting diff");

        let diff = match get_diff(commit_hash, repo).await {
            Ok(diff) => diff,
            Err(e) => {
                tracing::warn!("Git diff failed: {}", e);
                format!("Error getting diff: {}", e)
            }
        };

        Ok(Value::String(diff))
    }
}

async fn get_diff(commit_hash: &str, repo: &Path) -> anyhow::Result<String> {
    let result = if commit_hash.eq_ignore_ascii_case("HEAD") {
        if !has_commits(repo).await? {
            tracing::info!("No commits in repository yet");
            return Ok(NO_COMMITS_MESSAGE.to_string());
        }
        run_git_command(&["diff", "HEAD"], repo).await?
    } else {
        if commit_hash.starts_with('-') {
            anyhow::bail!("Invalid commit identifier: {}", commit_hash);
        }
        run_git_command(&["show", commit_hash], repo).await?
    };

    if result.is_empty() {
        Ok("No differences found.".to_string())
    } else {
        Ok(truncate_diff(result))
    }
}

async fn has_commits(repo: &Path) -> anyhow::Result<bool> {
    let output = git_output(&["rev-parse", "--verify", "--quiet", "HEAD"], repo).await?;
    Ok(output.status.success())
}

fn truncate_diff(mut diff: String) -> String {
    let Some((cut, _)) = diff.char_indices().nth(MAX_DIFF_CHARS) else {
        return diff;
    };
    diff.truncate(cut);
    diff.push_str(&format!(
        "... [diff truncated, showing first {} chars]",
        MAX_DIFF_CHARS
    ));
    diff
}

/// Run git and hand back the raw output, whatever the exit status.
pub(crate) async fn git_output(args: &[&str], repo: &Path) -> anyhow::Result<Output> {
    Command::new("git")
        .args(args)
        .current_dir(repo)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run git: {}", e))
}

/// Run a git command and return its stdout, failing on a non-zero exit.
pub(crate) async fn run_git_command(args: &[&str], repo: &Path) -> anyhow::Result<String> {
    let output = git_output(args, repo).await?;
    if !output.status.success() {
        return Err(git_failure(&output));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn git_failure(output: &Output) -> anyhow::Error {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.trim().is_empty() {
        anyhow::anyhow!("Git command failed: {}", stdout.trim())
    } else {
        anyhow::anyhow!("Git error: {}", stderr.trim())
    }
}
