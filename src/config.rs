//! Configuration management for the repository agent.
//!
//! Configuration is read from environment variables, each with a default:
//! - `API_BASE_URL` - Job server base URL. Defaults to `http://127.0.0.1:8000/api/v1`.
//! - `LOCAL_LLM_URL` - OpenAI-compatible LLM base URL. Defaults to `http://127.0.0.1:8001/v1`.
//! - `LLM_MODEL` - Model name sent with chat completions. Defaults to `gpt-3.5-turbo`.
//! - `LLM_API_KEY` - Bearer key for the LLM endpoint. Defaults to `dummy_key`.
//! - `REPO_PATH` - Local repository the tools operate on. Defaults to `./test_repo`.
//! - `AGENT_ID` - Agent identifier. Defaults to `agent-rs-<uuid>`.
//! - `AGENT_VERSION` - Reported agent version. Defaults to the crate version.
//! - `MAX_TURNS` - Maximum agent turns per LLM-directed job. Defaults to `10`.
//! - `MAX_JOBS` - Jobs requested per poll. Defaults to `1`.
//! - `IDLE_BACKOFF_SECS` - Sleep after an empty poll. Defaults to `10`.
//! - `ERROR_BACKOFF_SECS` - Sleep after the job server is unreachable. Defaults to `30`.
//! - `REPORT_TIMEOUT_SECS` - Timeout for job server calls. Defaults to `10`.
//! - `LLM_TIMEOUT_SECS` - Timeout for LLM calls. Defaults to `120`.
//! - `FORCE_REPO_PATH` - Ignore per-job project paths and always use `REPO_PATH`. Defaults to `false`.
//! - `BOOTSTRAP_REPO` - Create a sample repository when `REPO_PATH` is missing. Defaults to `true`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Job server base URL (no trailing slash)
    pub api_base_url: String,

    /// OpenAI-compatible LLM base URL (no trailing slash)
    pub llm_base_url: String,

    /// Model identifier sent to the LLM endpoint
    pub llm_model: String,

    /// Bearer key for the LLM endpoint
    pub llm_api_key: String,

    /// Default repository for tool execution
    pub repo_path: PathBuf,

    pub agent_id: String,

    pub agent_version: String,

    /// Upper bound on LLM turns for one job
    pub max_turns: usize,

    /// Jobs requested per poll
    pub max_jobs: u32,

    pub idle_backoff: Duration,

    pub error_backoff: Duration,

    pub report_timeout: Duration,

    pub llm_timeout: Duration,

    /// Always use `repo_path`, even when a job names its own project path
    pub force_repo_path: bool,

    /// Create a sample repository at `repo_path` when it does not exist
    pub bootstrap_repo: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric or boolean variable
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base_url = trim_url(
            std::env::var("API_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000/api/v1".to_string()),
        );

        let llm_base_url = trim_url(
            std::env::var("LOCAL_LLM_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8001/v1".to_string()),
        );

        let llm_model =
            std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string());

        let llm_api_key = std::env::var("LLM_API_KEY").unwrap_or_else(|_| "dummy_key".to_string());

        let repo_path = std::env::var("REPO_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./test_repo"));

        let agent_id = std::env::var("AGENT_ID")
            .unwrap_or_else(|_| format!("agent-rs-{}", uuid::Uuid::new_v4()));

        let agent_version = std::env::var("AGENT_VERSION")
            .unwrap_or_else(|_| format!("v{}", env!("CARGO_PKG_VERSION")));

        let max_turns = positive_var("MAX_TURNS", 10usize)?;
        let max_jobs = positive_var("MAX_JOBS", 1u32)?;

        let idle_backoff = Duration::from_secs(parse_var("IDLE_BACKOFF_SECS", 10u64)?);
        let error_backoff = Duration::from_secs(parse_var("ERROR_BACKOFF_SECS", 30u64)?);
        let report_timeout = Duration::from_secs(parse_var("REPORT_TIMEOUT_SECS", 10u64)?);
        let llm_timeout = Duration::from_secs(parse_var("LLM_TIMEOUT_SECS", 120u64)?);

        let force_repo_path = bool_var("FORCE_REPO_PATH", false)?;
        let bootstrap_repo = bool_var("BOOTSTRAP_REPO", true)?;

        Ok(Self {
            api_base_url,
            llm_base_url,
            llm_model,
            llm_api_key,
            repo_path,
            agent_id,
            agent_version,
            max_turns,
            max_jobs,
            idle_backoff,
            error_backoff,
            report_timeout,
            llm_timeout,
            force_repo_path,
            bootstrap_repo,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_base_url: String, llm_base_url: String, repo_path: PathBuf) -> Self {
        Self {
            api_base_url: trim_url(api_base_url),
            llm_base_url: trim_url(llm_base_url),
            llm_model: "gpt-3.5-turbo".to_string(),
            llm_api_key: "dummy_key".to_string(),
            repo_path,
            agent_id: "agent-test".to_string(),
            agent_version: format!("v{}", env!("CARGO_PKG_VERSION")),
            max_turns: 10,
            max_jobs: 1,
            idle_backoff: Duration::from_secs(10),
            error_backoff: Duration::from_secs(30),
            report_timeout: Duration::from_secs(10),
            llm_timeout: Duration::from_secs(120),
            force_repo_path: false,
            bootstrap_repo: false,
        }
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

/// Like `parse_var`, but zero is rejected.
fn positive_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let value = parse_var(name, default)?;
    if value == T::default() {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

fn bool_var(name: &str, default: bool) -> Result<bool, ConfigError> {
    std::env::var(name)
        .ok()
        .map(|v| parse_bool(&v).map_err(|e| ConfigError::InvalidValue(name.to_string(), e)))
        .transpose()
        .map(|v| v.unwrap_or(default))
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("YES"), Ok(true));
        assert_eq!(parse_bool(" off "), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn zero_counts_are_rejected() {
        std::env::set_var("REPO_AGENT_TEST_ZERO_TURNS", "0");
        let err = positive_var("REPO_AGENT_TEST_ZERO_TURNS", 10usize).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name, _) if name == "REPO_AGENT_TEST_ZERO_TURNS"));

        std::env::set_var("REPO_AGENT_TEST_THREE_TURNS", " 3 ");
        assert_eq!(positive_var("REPO_AGENT_TEST_THREE_TURNS", 10usize).unwrap(), 3);
        assert_eq!(positive_var("REPO_AGENT_TEST_UNSET_TURNS", 10usize).unwrap(), 10);
    }

    #[test]
    fn new_trims_trailing_slashes() {
        let config = Config::new(
            "http://localhost:8000/api/v1/".to_string(),
            "http://localhost:8001/v1//".to_string(),
            PathBuf::from("/tmp/repo"),
        );
        assert_eq!(config.api_base_url, "http://localhost:8000/api/v1");
        assert_eq!(config.llm_base_url, "http://localhost:8001/v1");
        assert_eq!(config.max_turns, 10);
    }
}
