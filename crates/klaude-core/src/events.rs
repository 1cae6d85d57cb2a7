use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EventId, SessionId, TaskId, ToolCallId};

/// One immutable fact recorded in a session log.
///
/// `id` defines the total order of a session; `timestamp` is informational only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<TaskId>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    UserMessage {
        content: String,
    },
    AssistantMessage {
        content: String,
    },
    ToolCallStarted {
        tool_id: ToolCallId,
        tool_name: String,
        args: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    ToolCallCompleted {
        tool_id: ToolCallId,
        outcome: ToolOutcome,
    },
    TaskStarted {
        task_id: TaskId,
        description: String,
    },
    TaskEnded {
        task_id: TaskId,
    },
}

impl EventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::UserMessage { .. } => "user_message",
            Self::AssistantMessage { .. } => "assistant_message",
            Self::ToolCallStarted { .. } => "tool_call_started",
            Self::ToolCallCompleted { .. } => "tool_call_completed",
            Self::TaskStarted { .. } => "task_started",
            Self::TaskEnded { .. } => "task_ended",
        }
    }
}

/// Result of a tool call. A failing tool is ordinary domain data, not a log error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Result(String),
    Error(String),
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Result(s) | Self::Error(s) => s,
        }
    }
}

/// An event as submitted by a producer, before the log assigns `id`,
/// `session_id` and `timestamp`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<TaskId>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl NewEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            parent_task_id: None,
            kind,
        }
    }

    pub fn user_message(content: impl Into<String>) -> Self {
        Self::new(EventKind::UserMessage {
            content: content.into(),
        })
    }

    pub fn assistant_message(content: impl Into<String>) -> Self {
        Self::new(EventKind::AssistantMessage {
            content: content.into(),
        })
    }

    pub fn tool_started(
        tool_id: ToolCallId,
        tool_name: impl Into<String>,
        args: serde_json::Value,
        description: Option<String>,
    ) -> Self {
        Self::new(EventKind::ToolCallStarted {
            tool_id,
            tool_name: tool_name.into(),
            args,
            description,
        })
    }

    pub fn tool_completed(tool_id: ToolCallId, outcome: ToolOutcome) -> Self {
        Self::new(EventKind::ToolCallCompleted { tool_id, outcome })
    }

    pub fn task_started(task_id: TaskId, description: impl Into<String>) -> Self {
        Self::new(EventKind::TaskStarted {
            task_id,
            description: description.into(),
        })
    }

    pub fn task_ended(task_id: TaskId) -> Self {
        Self::new(EventKind::TaskEnded { task_id })
    }

    /// Nest this event under an enclosing task.
    pub fn with_parent(mut self, parent: Option<TaskId>) -> Self {
        self.parent_task_id = parent;
        self
    }

    /// Finalize with the identity the log assigns.
    pub fn into_event(self, id: EventId, session_id: SessionId, timestamp: DateTime<Utc>) -> Event {
        Event {
            id,
            session_id,
            timestamp,
            parent_task_id: self.parent_task_id,
            kind: self.kind,
        }
    }
}
