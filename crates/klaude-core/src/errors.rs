use crate::ids::{TaskId, ToolCallId};

/// An `append` that would break an ordering or referential invariant of the log.
/// The log rejects the event before admission, so it stays consistent.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidEventError {
    #[error("parent task {0} was never started")]
    UnknownParent(TaskId),
    #[error("parent task {0} has already ended")]
    ParentEnded(TaskId),
    #[error("tool call {0} was already started")]
    DuplicateToolStart(ToolCallId),
    #[error("tool call {0} completed without a matching start")]
    CompletionWithoutStart(ToolCallId),
    #[error("tool call {0} was already completed")]
    DuplicateCompletion(ToolCallId),
    #[error("completion of tool call {0} names a different parent than its start")]
    CompletionParentMismatch(ToolCallId),
    #[error("task {0} was already started")]
    DuplicateTaskStart(TaskId),
    #[error("task {0} ended without a matching start")]
    TaskEndWithoutStart(TaskId),
    #[error("task {0} has already ended")]
    DuplicateTaskEnd(TaskId),
    #[error("end of task {0} names a different parent than its start")]
    TaskEndParentMismatch(TaskId),
}

impl InvalidEventError {
    /// Short classification string for logging and API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownParent(_) => "unknown_parent",
            Self::ParentEnded(_) => "parent_ended",
            Self::DuplicateToolStart(_) => "duplicate_tool_start",
            Self::CompletionWithoutStart(_) => "completion_without_start",
            Self::DuplicateCompletion(_) => "duplicate_completion",
            Self::CompletionParentMismatch(_) => "completion_parent_mismatch",
            Self::DuplicateTaskStart(_) => "duplicate_task_start",
            Self::TaskEndWithoutStart(_) => "task_end_without_start",
            Self::DuplicateTaskEnd(_) => "duplicate_task_end",
            Self::TaskEndParentMismatch(_) => "task_end_parent_mismatch",
        }
    }
}

/// Errors from the language-model client.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ModelError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited")]
    RateLimited,
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("no scripted reply left for call {0}")]
    ScriptExhausted(usize),
}

impl ModelError {
    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            429 => Self::RateLimited,
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}
