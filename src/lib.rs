//! # Repo Agent
//!
//! A job-polling worker that runs repository tools on behalf of a job server.
//!
//! This library provides:
//! - A client for the job server's agent endpoints (poll, report, telemetry)
//! - A tool-based agent loop driven by an OpenAI-compatible LLM
//! - Repository tools: file tree, lines of code per language, commit, diff
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Poll the job server for work
//! 2. Build context with the job instructions and available tools
//! 3. Call LLM, parse response, execute any tool calls
//! 4. Feed results back to LLM, repeat until it answers in plain text
//!
//! Jobs that name a tool explicitly skip step 2-3 and run the tool directly.
//!
//! ## Example
//!
//! ```rust,ignore
//! use repo_agent::{agent::Agent, Config};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = Config::from_env()?;
//! let agent = Agent::new(config)?;
//! agent.run(CancellationToken::new()).await;
//! ```

pub mod agent;
pub mod config;
pub mod jobs;
pub mod llm;
pub mod tools;
pub mod workspace;

pub use config::Config;
