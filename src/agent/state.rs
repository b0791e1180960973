//! Transient per-job state: the conversation with the model and job metrics.

use std::time::Instant;

use serde_json::{Map, Value};

use super::parser::ParsedToolCall;
use crate::llm::ChatMessage;

use super::prompt::tool_result_message;

/// One entry of a job's conversation history.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    /// Instruction for the model (the job prompt, or an analysis prompt).
    Human(String),
    /// Model reply; `tool_calls` is empty for a final answer.
    Assistant {
        content: String,
        tool_calls: Vec<ParsedToolCall>,
    },
    /// Output of a tool the model asked for.
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
    },
}

impl AgentMessage {
    pub fn content(&self) -> &str {
        match self {
            AgentMessage::Human(content)
            | AgentMessage::Assistant { content, .. }
            | AgentMessage::ToolResult { content, .. } => content,
        }
    }

    fn to_chat_message(&self) -> ChatMessage {
        match self {
            AgentMessage::Human(content) => ChatMessage::user(content.clone()),
            AgentMessage::Assistant { content, .. } => ChatMessage::assistant(content.clone()),
            AgentMessage::ToolResult {
                tool_name, content, ..
            } => ChatMessage::user(tool_result_message(tool_name, content)),
        }
    }
}

/// Conversation state for the job currently being processed.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub job_id: String,
    /// The instruction prompt the conversation started from.
    pub job_description: String,
    pub job_payload: Map<String, Value>,
    messages: Vec<AgentMessage>,
}

impl AgentState {
    pub fn new(job_id: String, job_description: String, job_payload: Map<String, Value>) -> Self {
        let messages = vec![AgentMessage::Human(job_description.clone())];
        Self {
            job_id,
            job_description,
            job_payload,
            messages,
        }
    }

    pub fn push(&mut self, message: AgentMessage) {
        self.messages.push(message);
    }

    pub fn last_message(&self) -> Option<&AgentMessage> {
        self.messages.last()
    }

    /// The history in chat-completion form.
    pub fn chat_messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(AgentMessage::to_chat_message).collect()
    }

    /// Name and output of the most recent tool result, if any tool ran.
    pub fn last_tool_result(&self) -> Option<(&str, &str)> {
        self.messages.iter().rev().find_map(|message| match message {
            AgentMessage::ToolResult {
                tool_name, content, ..
            } => Some((tool_name.as_str(), content.as_str())),
            _ => None,
        })
    }
}

/// Counters for one job, flushed as telemetry when the job ends.
#[derive(Debug, Clone)]
pub struct JobMetrics {
    started_at: Instant,
    tool_calls: u64,
}

impl JobMetrics {
    pub fn start() -> Self {
        Self {
            started_at: Instant::now(),
            tool_calls: 0,
        }
    }

    pub fn record_tool_calls(&mut self, count: usize) {
        self.tool_calls += count as u64;
    }

    pub fn tool_calls(&self) -> u64 {
        self.tool_calls
    }

    pub fn duration_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }
}
