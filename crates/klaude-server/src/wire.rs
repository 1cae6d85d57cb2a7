//! JSON wire format shared by the websocket feed and the HTTP producer endpoint.
//!
//! Every message is an envelope `{"type": ..., "data": {...}}`. Outbound events
//! also carry `seq` (the event id) and `timestamp`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use klaude_core::{Event, EventKind, NewEvent, SessionId, TaskId, ToolCallId, ToolOutcome};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireStatus {
    Running,
    Completed,
    Error,
}

/// Typed payload of one wire message.
///
/// Inbound messages with fields outside their type's shape are rejected.
/// `status` is accepted inbound but derived from the event when encoding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case", deny_unknown_fields)]
pub enum WireMessage {
    UserMessage {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_task_id: Option<TaskId>,
    },
    AssistantMessage {
        content: String,
        #[serde(default)]
        parent_task_id: Option<TaskId>,
    },
    ToolCall {
        id: ToolCallId,
        tool_name: String,
        #[serde(default)]
        tool_args: Value,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        parent_task_id: Option<TaskId>,
        #[serde(default)]
        status: Option<WireStatus>,
    },
    ToolResult {
        id: ToolCallId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default)]
        parent_task_id: Option<TaskId>,
        #[serde(default)]
        status: Option<WireStatus>,
    },
    TaskStart {
        id: TaskId,
        description: String,
        #[serde(default)]
        parent_task_id: Option<TaskId>,
    },
    TaskEnd {
        id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_task_id: Option<TaskId>,
    },
}

/// A finalized event as observers receive it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WireEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub message: WireMessage,
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("tool result {0} carries both a result and an error")]
    AmbiguousOutcome(ToolCallId),
    #[error("tool result {0} carries neither a result nor an error")]
    MissingOutcome(ToolCallId),
}

impl WireError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::AmbiguousOutcome(_) => "ambiguous_outcome",
            Self::MissingOutcome(_) => "missing_outcome",
        }
    }
}

impl WireMessage {
    pub fn from_event(event: &Event) -> Self {
        let parent_task_id = event.parent_task_id.clone();
        match &event.kind {
            EventKind::UserMessage { content } => Self::UserMessage {
                content: content.clone(),
                parent_task_id,
            },
            EventKind::AssistantMessage { content } => Self::AssistantMessage {
                content: content.clone(),
                parent_task_id,
            },
            EventKind::ToolCallStarted {
                tool_id,
                tool_name,
                args,
                description,
            } => Self::ToolCall {
                id: tool_id.clone(),
                tool_name: tool_name.clone(),
                tool_args: args.clone(),
                description: description.clone(),
                parent_task_id,
                status: Some(WireStatus::Running),
            },
            EventKind::ToolCallCompleted { tool_id, outcome } => {
                let (result, error, status) = match outcome {
                    ToolOutcome::Result(text) => (Some(text.clone()), None, WireStatus::Completed),
                    ToolOutcome::Error(text) => (None, Some(text.clone()), WireStatus::Error),
                };
                Self::ToolResult {
                    id: tool_id.clone(),
                    result,
                    error,
                    parent_task_id,
                    status: Some(status),
                }
            }
            EventKind::TaskStarted {
                task_id,
                description,
            } => Self::TaskStart {
                id: task_id.clone(),
                description: description.clone(),
                parent_task_id,
            },
            EventKind::TaskEnded { task_id } => Self::TaskEnd {
                id: task_id.clone(),
                parent_task_id,
            },
        }
    }

    /// Convert an inbound message into an event the log can validate.
    pub fn into_new_event(self) -> Result<NewEvent, WireError> {
        let event = match self {
            Self::UserMessage {
                content,
                parent_task_id,
            } => NewEvent::user_message(content).with_parent(parent_task_id),
            Self::AssistantMessage {
                content,
                parent_task_id,
            } => NewEvent::assistant_message(content).with_parent(parent_task_id),
            Self::ToolCall {
                id,
                tool_name,
                tool_args,
                description,
                parent_task_id,
                ..
            } => NewEvent::tool_started(id, tool_name, tool_args, description)
                .with_parent(parent_task_id),
            Self::ToolResult {
                id,
                result,
                error,
                parent_task_id,
                ..
            } => {
                let outcome = match (result, error) {
                    (Some(_), Some(_)) => return Err(WireError::AmbiguousOutcome(id)),
                    (None, None) => return Err(WireError::MissingOutcome(id)),
                    (Some(result), None) => ToolOutcome::Result(result),
                    (None, Some(error)) => ToolOutcome::Error(error),
                };
                NewEvent::tool_completed(id, outcome).with_parent(parent_task_id)
            }
            Self::TaskStart {
                id,
                description,
                parent_task_id,
            } => NewEvent::task_started(id, description).with_parent(parent_task_id),
            Self::TaskEnd { id, parent_task_id } => {
                NewEvent::task_ended(id).with_parent(parent_task_id)
            }
        };
        Ok(event)
    }
}

impl From<&Event> for WireEvent {
    fn from(event: &Event) -> Self {
        Self {
            seq: event.id.get(),
            timestamp: event.timestamp,
            message: WireMessage::from_event(event),
        }
    }
}

/// Parse one inbound wire message.
pub fn decode(text: &str) -> Result<NewEvent, WireError> {
    let message: WireMessage =
        serde_json::from_str(text).map_err(|e| WireError::Malformed(e.to_string()))?;
    message.into_new_event()
}

pub fn encode(event: &Event) -> Result<String, serde_json::Error> {
    serde_json::to_string(&WireEvent::from(event))
}

/// `init` payload: the session id plus every event so far.
pub fn init_message(session_id: &SessionId, history: &[Arc<Event>]) -> Value {
    let history: Vec<WireEvent> = history.iter().map(|e| WireEvent::from(e.as_ref())).collect();
    serde_json::json!({
        "type": "init",
        "data": {
            "session_id": session_id,
            "history": history,
        }
    })
}
