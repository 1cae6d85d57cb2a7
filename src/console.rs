//! Terminal observer: renders the session log on stdout, indented by task depth.

use std::sync::Arc;

use klaude_core::{Event, EventKind, ToolOutcome};
use klaude_session::{NodeId, ObserverDeliveryFailure, SessionLog, TaskTreeIndex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const PREVIEW_CHARS: usize = 200;

/// Tracks what the console has rendered so far.
pub struct ConsoleHandle {
    rendered: watch::Receiver<u64>,
    task: JoinHandle<()>,
}

impl ConsoleHandle {
    /// Wait until every event up to `seq` has been printed.
    pub async fn caught_up(&mut self, seq: u64) {
        if let Err(e) = self.rendered.wait_for(|rendered| *rendered >= seq).await {
            debug!(error = %e, "console observer already stopped");
        }
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

/// Attach a console observer to the log and render events as they arrive.
pub fn spawn(log: Arc<SessionLog>) -> ConsoleHandle {
    let (tx, rx) = watch::channel(0u64);
    let task = tokio::spawn(async move {
        let mut index = TaskTreeIndex::new();
        let mut last_seq = 0u64;
        loop {
            let (replay, mut channel) = log.attach();
            let since = last_seq;
            for event in replay.iter().filter(|e| e.id.get() > since) {
                last_seq = render(&mut index, event);
            }
            let _ = tx.send(last_seq);

            while let Some(event) = channel.recv().await {
                last_seq = render(&mut index, &event);
                let _ = tx.send(last_seq);
            }

            match channel.failure() {
                Some(ObserverDeliveryFailure::Overflow) => {
                    warn!(last_seq, "console fell behind, re-attaching");
                }
                _ => break,
            }
        }
    });
    ConsoleHandle { rendered: rx, task }
}

fn render(index: &mut TaskTreeIndex, event: &Event) -> u64 {
    index.record(event);
    let depth = match &event.parent_task_id {
        Some(parent) => index.depth_of(&NodeId::Task(parent.clone())) + 1,
        None => 0,
    };
    if let Some(line) = format_event(event) {
        let indent = "  ".repeat(depth);
        for part in line.lines() {
            println!("{indent}{part}");
        }
    }
    event.id.get()
}

/// Human rendering of one event. `None` for events the console skips.
pub fn format_event(event: &Event) -> Option<String> {
    let text = match &event.kind {
        // The user just typed it.
        EventKind::UserMessage { .. } => return None,
        EventKind::AssistantMessage { content } => format!("Klaude: {content}"),
        EventKind::ToolCallStarted {
            tool_name,
            args,
            description,
            ..
        } => {
            let detail = match (tool_name.as_str(), args.get("command").and_then(|c| c.as_str())) {
                ("Bash", Some(command)) => format!("$ {command}"),
                _ => description.clone().unwrap_or_else(|| args.to_string()),
            };
            format!("-> {tool_name}: {detail}")
        }
        EventKind::ToolCallCompleted { outcome, .. } => match outcome {
            ToolOutcome::Result(text) => format!("   ok: {}", preview(text)),
            ToolOutcome::Error(text) => format!("   error: {}", preview(text)),
        },
        EventKind::TaskStarted { description, .. } => format!("Task: {description}"),
        EventKind::TaskEnded { .. } => "Task finished".to_string(),
    };
    Some(text)
}

fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    let mut out: String = first_line.chars().take(PREVIEW_CHARS).collect();
    if out.len() < text.trim_end().len() {
        out.push_str(" ...");
    }
    out
}
