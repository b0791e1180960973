//! Agent module - the job-processing state machine.
//!
//! For every job the agent either runs the named tool directly, or lets the
//! LLM choose tools in a loop:
//! 1. Build the instruction prompt from the job payload and available tools
//! 2. Call the LLM and parse its reply for a JSON tool call
//! 3. If it asked for a tool, execute it and feed the result back
//! 4. Repeat until the LLM gives a plain answer or the turn budget runs out

mod agent_loop;
mod parser;
mod prompt;
mod state;

pub use agent_loop::{Agent, PollOutcome};
pub use parser::{parse_model_reply, ModelReply, ParsedToolCall};
pub use prompt::{build_analysis_prompt, build_job_prompt};
pub use state::{AgentMessage, AgentState, JobMetrics};
