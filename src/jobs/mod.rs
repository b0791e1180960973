//! Job server boundary: wire types and the HTTP client.

mod client;
mod types;

pub use client::{utc_now_iso, JobPoll, JobServerClient, JobServerError};
pub use types::{
    AgentStatus, CompletionStatus, Job, JobBatch, JobOutcome, JobRequest, JobType,
    ProgressUpdate,
};
