//! Parent/child and status lookup derived from the event sequence.
//!
//! The index is flat: maps from id to parent, children, and status. Nesting is
//! reconstructed by following `parent_task_id` links, never by owning pointers.

use std::collections::HashMap;
use std::fmt;

use klaude_core::{Event, EventKind, InvalidEventError, NewEvent, TaskId, ToolCallId};
use serde::{Deserialize, Serialize};

/// A node of the task tree: either a tool call or a task.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum NodeId {
    Tool(ToolCallId),
    Task(TaskId),
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool(id) => write!(f, "tool:{id}"),
            Self::Task(id) => write!(f, "task:{id}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Running,
    Completed,
    Errored,
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct NodeEntry {
    parent: Option<TaskId>,
    status: NodeStatus,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskTreeIndex {
    nodes: HashMap<NodeId, NodeEntry>,
    children: HashMap<TaskId, Vec<NodeId>>,
}

impl TaskTreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive an index from scratch by replaying events in order.
    ///
    /// This is the authoritative definition of the index: it must equal the
    /// incrementally maintained one for the same sequence.
    pub fn rebuild<'a, I>(events: I) -> Result<Self, InvalidEventError>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut index = Self::new();
        for event in events {
            index.check(&event.parent_task_id, &event.kind)?;
            index.apply(&event.parent_task_id, &event.kind);
        }
        Ok(index)
    }

    /// Validate a candidate event without mutating the index.
    pub fn validate(&self, event: &NewEvent) -> Result<(), InvalidEventError> {
        self.check(&event.parent_task_id, &event.kind)
    }

    /// Record an admitted event. Callers must have validated it first.
    pub fn record(&mut self, event: &Event) {
        self.apply(&event.parent_task_id, &event.kind);
    }

    fn check(&self, parent: &Option<TaskId>, kind: &EventKind) -> Result<(), InvalidEventError> {
        if let Some(parent) = parent {
            match self.task_status(parent) {
                NodeStatus::Running => {}
                NodeStatus::Unknown => return Err(InvalidEventError::UnknownParent(parent.clone())),
                NodeStatus::Completed | NodeStatus::Errored => {
                    return Err(InvalidEventError::ParentEnded(parent.clone()))
                }
            }
        }

        match kind {
            EventKind::UserMessage { .. } | EventKind::AssistantMessage { .. } => Ok(()),
            EventKind::ToolCallStarted { tool_id, .. } => match self.tool_status(tool_id) {
                NodeStatus::Unknown => Ok(()),
                _ => Err(InvalidEventError::DuplicateToolStart(tool_id.clone())),
            },
            EventKind::ToolCallCompleted { tool_id, .. } => match self.tool_status(tool_id) {
                NodeStatus::Running if self.parent_of(&NodeId::Tool(tool_id.clone())) != parent.as_ref() => {
                    Err(InvalidEventError::CompletionParentMismatch(tool_id.clone()))
                }
                NodeStatus::Running => Ok(()),
                NodeStatus::Unknown => Err(InvalidEventError::CompletionWithoutStart(tool_id.clone())),
                NodeStatus::Completed | NodeStatus::Errored => {
                    Err(InvalidEventError::DuplicateCompletion(tool_id.clone()))
                }
            },
            EventKind::TaskStarted { task_id, .. } => match self.task_status(task_id) {
                NodeStatus::Unknown => Ok(()),
                _ => Err(InvalidEventError::DuplicateTaskStart(task_id.clone())),
            },
            EventKind::TaskEnded { task_id } => match self.task_status(task_id) {
                NodeStatus::Running if self.parent_of(&NodeId::Task(task_id.clone())) != parent.as_ref() => {
                    Err(InvalidEventError::TaskEndParentMismatch(task_id.clone()))
                }
                NodeStatus::Running => Ok(()),
                NodeStatus::Unknown => Err(InvalidEventError::TaskEndWithoutStart(task_id.clone())),
                NodeStatus::Completed | NodeStatus::Errored => {
                    Err(InvalidEventError::DuplicateTaskEnd(task_id.clone()))
                }
            },
        }
    }

    fn apply(&mut self, parent: &Option<TaskId>, kind: &EventKind) {
        match kind {
            EventKind::UserMessage { .. } | EventKind::AssistantMessage { .. } => {}
            EventKind::ToolCallStarted { tool_id, .. } => {
                self.insert_child(parent, NodeId::Tool(tool_id.clone()));
            }
            EventKind::ToolCallCompleted { tool_id, outcome } => {
                let status = if outcome.is_error() {
                    NodeStatus::Errored
                } else {
                    NodeStatus::Completed
                };
                if let Some(entry) = self.nodes.get_mut(&NodeId::Tool(tool_id.clone())) {
                    entry.status = status;
                }
            }
            EventKind::TaskStarted { task_id, .. } => {
                self.insert_child(parent, NodeId::Task(task_id.clone()));
            }
            EventKind::TaskEnded { task_id } => {
                if let Some(entry) = self.nodes.get_mut(&NodeId::Task(task_id.clone())) {
                    entry.status = NodeStatus::Completed;
                }
            }
        }
    }

    fn insert_child(&mut self, parent: &Option<TaskId>, node: NodeId) {
        if let Some(parent) = parent {
            self.children.entry(parent.clone()).or_default().push(node.clone());
        }
        self.nodes.insert(
            node,
            NodeEntry {
                parent: parent.clone(),
                status: NodeStatus::Running,
            },
        );
    }

    /// Direct children of a task in arrival order. Empty for unknown or childless tasks.
    pub fn children_of(&self, task_id: &TaskId) -> &[NodeId] {
        self.children.get(task_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn status_of(&self, node: &NodeId) -> NodeStatus {
        self.nodes.get(node).map_or(NodeStatus::Unknown, |e| e.status)
    }

    pub fn task_status(&self, task_id: &TaskId) -> NodeStatus {
        self.status_of(&NodeId::Task(task_id.clone()))
    }

    pub fn tool_status(&self, tool_id: &ToolCallId) -> NodeStatus {
        self.status_of(&NodeId::Tool(tool_id.clone()))
    }

    /// Enclosing task of a node, `None` for top-level or unknown nodes.
    pub fn parent_of(&self, node: &NodeId) -> Option<&TaskId> {
        self.nodes.get(node).and_then(|e| e.parent.as_ref())
    }

    /// Number of enclosing tasks. Top-level nodes have depth 0.
    pub fn depth_of(&self, node: &NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.parent_of(node);
        while let Some(task) = current {
            depth += 1;
            current = self.parent_of(&NodeId::Task(task.clone()));
        }
        depth
    }

    /// Tasks that have started but not ended.
    pub fn open_tasks(&self) -> Vec<TaskId> {
        let mut open: Vec<TaskId> = self
            .nodes
            .iter()
            .filter_map(|(node, entry)| match node {
                NodeId::Task(id) if entry.status == NodeStatus::Running => Some(id.clone()),
                _ => None,
            })
            .collect();
        open.sort();
        open
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
