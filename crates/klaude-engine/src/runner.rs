use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use klaude_core::model::{ChatMessage, ModelClient, ToolCallRequest};
use klaude_core::tools::{SubagentRequest, SubagentSpawner, ToolContext, ToolError};
use klaude_core::{Event, InvalidEventError, NewEvent, TaskId, ToolCallId, ToolOutcome};
use klaude_session::SessionLog;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::registry::{ToolFilter, ToolRegistry};
use crate::tools::task::TASK_TOOL_NAME;
use crate::truncate::truncate_output;

/// Where a conversation's events land in the task tree.
#[derive(Clone, Debug)]
struct Scope {
    task_id: Option<TaskId>,
    depth: u32,
}

struct Inner {
    log: Arc<SessionLog>,
    model: Arc<dyn ModelClient>,
    tools: ToolRegistry,
    config: EngineConfig,
    working_directory: PathBuf,
    cancel: CancellationToken,
    history: Mutex<Vec<ChatMessage>>,
}

/// Drives the model/tool loop and records everything it does in the session log.
///
/// Cheap to clone; clones share the log, the model and the top-level history.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        log: Arc<SessionLog>,
        model: Arc<dyn ModelClient>,
        tools: ToolRegistry,
        config: EngineConfig,
        working_directory: PathBuf,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                log,
                model,
                tools,
                config,
                working_directory,
                cancel: CancellationToken::new(),
                history: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn log(&self) -> &Arc<SessionLog> {
        &self.inner.log
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Stop in-flight and future runs. Running tools see their abort signal fire.
    pub fn abort(&self) {
        self.inner.cancel.cancel();
    }

    /// Top-level conversation so far, system prompt included.
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.inner.history.lock().await.clone()
    }

    /// Handle one user prompt. Returns the model's final text.
    ///
    /// History persists across calls; concurrent calls are serialized.
    #[instrument(skip_all, fields(session_id = %self.inner.log.session_id()))]
    pub async fn run(&self, prompt: &str) -> Result<String, EngineError> {
        let mut history = self.inner.history.lock().await;
        if history.is_empty() {
            history.push(ChatMessage::System {
                content: self.inner.config.system_prompt.clone(),
            });
        }

        self.inner.log.append(NewEvent::user_message(prompt))?;
        history.push(ChatMessage::User {
            content: prompt.to_string(),
        });

        let scope = Scope {
            task_id: None,
            depth: 0,
        };
        self.conversation_loop(&mut history, &scope, &self.inner.tools).await
    }

    async fn conversation_loop(
        &self,
        messages: &mut Vec<ChatMessage>,
        scope: &Scope,
        tools: &ToolRegistry,
    ) -> Result<String, EngineError> {
        let definitions = tools.definitions();
        let max_turns = self.inner.config.max_turns;
        let mut last_text = String::new();

        for turn in 1..=max_turns {
            if self.inner.cancel.is_cancelled() {
                return Err(EngineError::Aborted);
            }
            debug!(turn, depth = scope.depth, "requesting completion");
            let reply = self.inner.model.complete(messages, &definitions).await?;
            messages.push(reply.to_message());

            if let Some(text) = reply.content.as_deref().filter(|t| !t.is_empty()) {
                self.inner
                    .log
                    .append(NewEvent::assistant_message(text).with_parent(scope.task_id.clone()))?;
                last_text = text.to_string();
            }

            if !reply.wants_tools() {
                return Ok(last_text);
            }

            info!(turn, calls = reply.tool_calls.len(), depth = scope.depth, "running tool calls");
            let results = join_all(
                reply
                    .tool_calls
                    .iter()
                    .map(|call| self.execute_tool_call(call, scope, tools)),
            )
            .await;

            // Every call gets a reply in history, even when one of them failed.
            let mut first_error = None;
            for (call, result) in reply.tool_calls.iter().zip(results) {
                let content = match result {
                    Ok(text) => text,
                    Err(e) => {
                        let text = format!("[error] {e}");
                        first_error.get_or_insert(e);
                        text
                    }
                };
                messages.push(ChatMessage::Tool {
                    tool_call_id: call.id.clone(),
                    content,
                });
            }
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        warn!(max_turns, depth = scope.depth, "turn limit reached");
        Err(EngineError::MaxTurnsExceeded(max_turns))
    }

    /// Record start, execute, record completion. Returns the text fed back to the model.
    async fn execute_tool_call(
        &self,
        call: &ToolCallRequest,
        scope: &Scope,
        tools: &ToolRegistry,
    ) -> Result<String, EngineError> {
        let log = &self.inner.log;
        let description = call
            .arguments
            .get("description")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        log.append(
            NewEvent::tool_started(call.id.clone(), &call.name, call.arguments.clone(), description)
                .with_parent(scope.task_id.clone()),
        )?;
        let pending = PendingCompletion::new(log, call.id.clone(), scope.task_id.clone());

        let outcome = match tools.get(&call.name) {
            None => {
                warn!(tool = %call.name, "model requested unknown tool");
                ToolOutcome::Error(format!("unknown tool: {}", call.name))
            }
            Some(tool) => {
                let ctx = ToolContext {
                    tool_call_id: call.id.clone(),
                    working_directory: self.inner.working_directory.clone(),
                    parent_task_id: scope.task_id.clone(),
                    depth: scope.depth,
                    subagents: Arc::new(self.clone()),
                    abort_signal: self.inner.cancel.child_token(),
                };
                let run = std::panic::AssertUnwindSafe(tool.execute(call.arguments.clone(), &ctx))
                    .catch_unwind();

                // Sub-agents are bounded by their own turn limit.
                let result = if call.name == TASK_TOOL_NAME {
                    Ok(run.await)
                } else {
                    tokio::time::timeout(self.inner.config.tool_timeout(), run).await
                };

                match result {
                    Ok(Ok(Ok(output))) => ToolOutcome::Result(output),
                    Ok(Ok(Err(e))) => ToolOutcome::Error(e.to_string()),
                    Ok(Err(panic)) => {
                        error!(tool = %call.name, panic = %panic_message(&panic), "tool panicked");
                        ToolOutcome::Error("internal error: tool crashed".into())
                    }
                    Err(_) => {
                        let secs = self.inner.config.tool_timeout_secs;
                        warn!(tool = %call.name, timeout_secs = secs, "tool timed out");
                        ToolOutcome::Error(format!("tool timed out after {secs}s"))
                    }
                }
            }
        };

        let max = self.inner.config.max_tool_output_bytes;
        let outcome = match outcome {
            ToolOutcome::Result(text) => ToolOutcome::Result(truncate_output(&text, max)),
            ToolOutcome::Error(text) => ToolOutcome::Error(truncate_output(&text, max)),
        };
        let for_model = match &outcome {
            ToolOutcome::Result(text) => text.clone(),
            ToolOutcome::Error(text) => format!("[error] {text}"),
        };
        pending.complete(outcome)?;
        Ok(for_model)
    }

    fn subagent_tools(&self, depth: u32) -> ToolRegistry {
        if depth >= self.inner.config.max_subagent_depth {
            let no_nesting = HashSet::from([TASK_TOOL_NAME.to_string()]);
            self.inner.tools.clone_for_subagent(&ToolFilter::InheritExcept(no_nesting))
        } else {
            self.inner.tools.clone_for_subagent(&ToolFilter::InheritAll)
        }
    }
}

#[async_trait]
impl SubagentSpawner for Orchestrator {
    #[instrument(skip_all, fields(depth = request.depth, description = %request.description))]
    async fn spawn(&self, request: SubagentRequest) -> Result<String, ToolError> {
        let max_depth = self.inner.config.max_subagent_depth;
        if request.depth > max_depth {
            return Err(ToolError::ExecutionFailed(
                EngineError::DepthExceeded(max_depth).to_string(),
            ));
        }

        let log = &self.inner.log;
        let task_id = TaskId::new();
        log.append(
            NewEvent::task_started(task_id.clone(), &request.description)
                .with_parent(request.parent_task_id.clone()),
        )
        .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        let open_task = OpenTask::new(log, task_id.clone(), request.parent_task_id.clone());
        info!(task_id = %task_id, "sub-agent started");

        let mut system_prompt = self.inner.config.system_prompt.clone();
        if let Some(kind) = &request.subagent_type {
            system_prompt.push_str(&format!("\n\nYou are running as a {kind} sub-agent."));
        }
        let mut messages = vec![
            ChatMessage::System {
                content: system_prompt,
            },
            ChatMessage::User {
                content: request.prompt,
            },
        ];
        let scope = Scope {
            task_id: Some(task_id.clone()),
            depth: request.depth,
        };
        let tools = self.subagent_tools(request.depth);
        let result = self.conversation_loop(&mut messages, &scope, &tools).await;

        open_task
            .end()
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        info!(task_id = %task_id, ok = result.is_ok(), "sub-agent finished");
        result.map_err(|e| ToolError::ExecutionFailed(e.to_string()))
    }
}

/// A started tool call that still owes a completion event.
///
/// Dropping it without [`PendingCompletion::complete`] (the run was cancelled
/// mid-call) records an error completion so the call does not stay open.
struct PendingCompletion<'a> {
    log: &'a SessionLog,
    tool_id: ToolCallId,
    parent: Option<TaskId>,
    done: bool,
}

impl<'a> PendingCompletion<'a> {
    fn new(log: &'a SessionLog, tool_id: ToolCallId, parent: Option<TaskId>) -> Self {
        Self {
            log,
            tool_id,
            parent,
            done: false,
        }
    }

    fn complete(mut self, outcome: ToolOutcome) -> Result<Arc<Event>, InvalidEventError> {
        self.done = true;
        self.log.append(
            NewEvent::tool_completed(self.tool_id.clone(), outcome).with_parent(self.parent.clone()),
        )
    }
}

impl Drop for PendingCompletion<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let event = NewEvent::tool_completed(self.tool_id.clone(), ToolOutcome::Error("cancelled".into()))
            .with_parent(self.parent.take());
        if let Err(e) = self.log.append(event) {
            warn!(tool_id = %self.tool_id, error = %e, "could not record cancelled tool call");
        }
    }
}

/// A started task that still owes its end event. Ends the task on drop.
struct OpenTask<'a> {
    log: &'a SessionLog,
    task_id: Option<TaskId>,
    parent: Option<TaskId>,
}

impl<'a> OpenTask<'a> {
    fn new(log: &'a SessionLog, task_id: TaskId, parent: Option<TaskId>) -> Self {
        Self {
            log,
            task_id: Some(task_id),
            parent,
        }
    }

    fn end(mut self) -> Result<(), InvalidEventError> {
        if let Some(id) = self.task_id.take() {
            self.log
                .append(NewEvent::task_ended(id).with_parent(self.parent.take()))?;
        }
        Ok(())
    }
}

impl Drop for OpenTask<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.task_id.take() {
            if let Err(e) = self.log.append(NewEvent::task_ended(id).with_parent(self.parent.take())) {
                warn!(error = %e, "could not end cancelled task");
            }
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockResponse, ScriptedModel};
    use crate::tools::task::TaskTool;
    use klaude_core::tools::Tool;
    use klaude_core::EventKind;
    use klaude_session::{NodeId, NodeStatus};
    use serde_json::json;
    use std::time::Duration;

    /// Echoes `text` after sleeping `delay_ms`.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "Echo"
        }
        fn description(&self) -> &str {
            "Echo text back"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(&self, args: serde_json::Value, _ctx: &ToolContext) -> Result<String, ToolError> {
            if let Some(ms) = args["delay_ms"].as_u64() {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str {
            "Panic"
        }
        fn description(&self) -> &str {
            "A tool that panics"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: serde_json::Value, _ctx: &ToolContext) -> Result<String, ToolError> {
            panic!("tool exploded!");
        }
    }

    fn registry() -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(EchoTool));
        tools.register(Arc::new(PanicTool));
        tools.register(Arc::new(TaskTool));
        tools
    }

    fn orchestrator(model: ScriptedModel, config: EngineConfig) -> Orchestrator {
        Orchestrator::new(
            Arc::new(SessionLog::default()),
            Arc::new(model),
            registry(),
            config,
            std::env::temp_dir(),
        )
    }

    fn kinds(log: &SessionLog) -> Vec<String> {
        log.snapshot()
            .iter()
            .map(|e| match &e.kind {
                EventKind::ToolCallStarted { tool_id, .. } => format!("call:{tool_id}"),
                EventKind::ToolCallCompleted { tool_id, outcome } => {
                    let tag = if outcome.is_error() { "error" } else { "result" };
                    format!("{tag}:{tool_id}")
                }
                EventKind::AssistantMessage { content } => format!("assistant:{content}"),
                other => other.event_type().to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn text_reply_records_user_and_assistant() {
        let orch = orchestrator(
            ScriptedModel::new(vec![MockResponse::text("hello"), MockResponse::text("again")]),
            EngineConfig::default(),
        );
        assert_eq!(orch.run("hi").await.unwrap(), "hello");
        assert_eq!(kinds(orch.log()), vec!["user_message", "assistant:hello"]);

        orch.run("more").await.unwrap();
        let history = orch.history().await;
        assert!(matches!(history[0], ChatMessage::System { .. }));
        assert_eq!(history.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn tool_calls_run_concurrently_and_complete_in_finish_order() {
        let orch = orchestrator(
            ScriptedModel::new(vec![
                MockResponse::tools(vec![
                    ("A", "Echo", json!({"text": "slow", "delay_ms": 50})),
                    ("B", "Echo", json!({"text": "fast", "delay_ms": 10})),
                ]),
                MockResponse::text("done"),
            ]),
            EngineConfig::default(),
        );
        orch.run("go").await.unwrap();
        assert_eq!(
            kinds(orch.log()),
            vec!["user_message", "call:A", "call:B", "result:B", "result:A", "assistant:done"]
        );

        let history = orch.history().await;
        let tool_results: Vec<&str> = history
            .iter()
            .filter_map(|m| match m {
                ChatMessage::Tool { content, .. } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(tool_results, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn unknown_tool_and_panic_become_error_outcomes() {
        let orch = orchestrator(
            ScriptedModel::new(vec![
                MockResponse::tools(vec![("A", "Nope", json!({})), ("B", "Panic", json!({}))]),
                MockResponse::text("recovered"),
            ]),
            EngineConfig::default(),
        );
        assert_eq!(orch.run("go").await.unwrap(), "recovered");
        assert_eq!(
            kinds(orch.log()),
            vec!["user_message", "call:A", "call:B", "error:A", "error:B", "assistant:recovered"]
        );
        let snapshot = orch.log().snapshot();
        match &snapshot[3].kind {
            EventKind::ToolCallCompleted { outcome, .. } => {
                assert_eq!(outcome.text(), "unknown tool: Nope");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out() {
        let config = EngineConfig {
            tool_timeout_secs: 1,
            ..Default::default()
        };
        let orch = orchestrator(
            ScriptedModel::new(vec![
                MockResponse::tools(vec![("A", "Echo", json!({"text": "x", "delay_ms": 10_000}))]),
                MockResponse::text("after timeout"),
            ]),
            config,
        );
        orch.run("go").await.unwrap();
        let snapshot = orch.log().snapshot();
        match &snapshot[2].kind {
            EventKind::ToolCallCompleted { outcome, .. } => {
                assert_eq!(outcome, &ToolOutcome::Error("tool timed out after 1s".into()));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn task_tool_nests_events_under_the_task() {
        let model = ScriptedModel::new(vec![
            MockResponse::tools(vec![(
                "outer",
                "Task",
                json!({"description": "explore", "prompt": "find rs"}),
            )]),
            MockResponse::text("all done"),
        ])
        .with_script(
            "find rs",
            vec![
                MockResponse::tools(vec![("inner", "Echo", json!({"text": "a.rs"}))]),
                MockResponse::text("found a.rs"),
            ],
        );
        let orch = orchestrator(model, EngineConfig::default());
        assert_eq!(orch.run("look around").await.unwrap(), "all done");

        let log = orch.log();
        assert_eq!(
            kinds(log),
            vec![
                "user_message",
                "call:outer",
                "task_started",
                "call:inner",
                "result:inner",
                "assistant:found a.rs",
                "task_ended",
                "result:outer",
                "assistant:all done",
            ]
        );

        let snapshot = log.snapshot();
        let task_id = match &snapshot[2].kind {
            EventKind::TaskStarted { task_id, description } => {
                assert_eq!(description, "explore");
                task_id.clone()
            }
            other => panic!("unexpected event: {other:?}"),
        };
        assert_eq!(snapshot[2].parent_task_id, None);
        for event in &snapshot[3..6] {
            assert_eq!(event.parent_task_id.as_ref(), Some(&task_id));
        }
        match &snapshot[7].kind {
            EventKind::ToolCallCompleted { outcome, .. } => assert_eq!(outcome.text(), "found a.rs"),
            other => panic!("unexpected event: {other:?}"),
        }

        assert_eq!(
            log.children_of(&task_id),
            vec![NodeId::Tool(ToolCallId::from_raw("inner"))]
        );
        assert_eq!(log.status_of(&NodeId::Task(task_id)), NodeStatus::Completed);
        assert_eq!(log.rebuild_index().unwrap(), log.index());
    }

    #[tokio::test]
    async fn nested_task_end_carries_the_enclosing_task() {
        let model = ScriptedModel::new(vec![
            MockResponse::tools(vec![(
                "outer",
                "Task",
                json!({"description": "d1", "prompt": "level one"}),
            )]),
            MockResponse::text("top done"),
        ])
        .with_script(
            "level one",
            vec![
                MockResponse::tools(vec![(
                    "nested",
                    "Task",
                    json!({"description": "d2", "prompt": "level two"}),
                )]),
                MockResponse::text("one done"),
            ],
        )
        .with_script("level two", vec![MockResponse::text("two done")]);
        let orch = orchestrator(model, EngineConfig::default());
        orch.run("go").await.unwrap();

        let snapshot = orch.log().snapshot();
        let mut starts = Vec::new();
        let mut ends = Vec::new();
        for event in &snapshot {
            match &event.kind {
                EventKind::TaskStarted { task_id, .. } => {
                    starts.push((task_id.clone(), event.parent_task_id.clone()))
                }
                EventKind::TaskEnded { task_id } => {
                    ends.push((task_id.clone(), event.parent_task_id.clone()))
                }
                _ => {}
            }
        }
        assert_eq!(starts.len(), 2);
        let (outer, _) = &starts[0];
        let (inner, inner_parent) = &starts[1];
        assert_eq!(inner_parent.as_ref(), Some(outer));
        assert_eq!(ends, vec![(inner.clone(), Some(outer.clone())), (outer.clone(), None)]);
        assert_eq!(
            orch.log().index().depth_of(&NodeId::Task(inner.clone())),
            1
        );
    }

    #[tokio::test]
    async fn failing_subagent_still_ends_its_task() {
        // The sub-agent's script is empty, so its first completion fails.
        let model = ScriptedModel::new(vec![
            MockResponse::tools(vec![(
                "outer",
                "Task",
                json!({"description": "doomed", "prompt": "nothing scripted"}),
            )]),
            MockResponse::text("handled"),
        ])
        .with_script("nothing scripted", vec![]);
        let orch = orchestrator(model, EngineConfig::default());
        assert_eq!(orch.run("go").await.unwrap(), "handled");
        assert_eq!(
            kinds(orch.log()),
            vec![
                "user_message",
                "call:outer",
                "task_started",
                "task_ended",
                "error:outer",
                "assistant:handled"
            ]
        );
        assert!(orch.log().index().open_tasks().is_empty());
    }

    #[tokio::test]
    async fn task_tool_is_withheld_at_max_depth() {
        let config = EngineConfig {
            max_subagent_depth: 1,
            ..Default::default()
        };
        let model = ScriptedModel::new(vec![
            MockResponse::tools(vec![(
                "outer",
                "Task",
                json!({"description": "d1", "prompt": "level one"}),
            )]),
            MockResponse::text("top done"),
        ])
        .with_script(
            "level one",
            vec![
                MockResponse::tools(vec![(
                    "nested",
                    "Task",
                    json!({"description": "d2", "prompt": "level two"}),
                )]),
                MockResponse::text("one done"),
            ],
        );
        let orch = orchestrator(model, config);
        orch.run("go").await.unwrap();

        let snapshot = orch.log().snapshot();
        let nested = snapshot
            .iter()
            .find_map(|e| match &e.kind {
                EventKind::ToolCallCompleted { tool_id, outcome } if tool_id.as_str() == "nested" => {
                    Some(outcome.clone())
                }
                _ => None,
            })
            .unwrap();
        assert_eq!(nested, ToolOutcome::Error("unknown tool: Task".into()));
    }

    #[tokio::test]
    async fn spawn_rejects_requests_past_the_depth_limit() {
        let orch = orchestrator(ScriptedModel::new(vec![]), EngineConfig::default());
        let err = orch
            .spawn(SubagentRequest {
                description: "deep".into(),
                prompt: "p".into(),
                subagent_type: None,
                parent_task_id: None,
                depth: 4,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("depth limit"));
        assert!(orch.log().is_empty());
    }

    #[tokio::test]
    async fn max_turns_exceeded() {
        let config = EngineConfig {
            max_turns: 2,
            ..Default::default()
        };
        let orch = orchestrator(
            ScriptedModel::new(vec![
                MockResponse::tools(vec![("A", "Echo", json!({"text": "1"}))]),
                MockResponse::tools(vec![("B", "Echo", json!({"text": "2"}))]),
            ]),
            config,
        );
        let err = orch.run("loop").await.unwrap_err();
        assert!(matches!(err, EngineError::MaxTurnsExceeded(2)));
        assert_eq!(orch.log().len(), 5);
    }

    #[tokio::test]
    async fn model_error_propagates() {
        let orch = orchestrator(
            ScriptedModel::new(vec![MockResponse::Error(klaude_core::ModelError::RateLimited)]),
            EngineConfig::default(),
        );
        let err = orch.run("hi").await.unwrap_err();
        assert!(matches!(err, EngineError::Model(_)));
        assert_eq!(kinds(orch.log()), vec!["user_message"]);
    }

    #[tokio::test]
    async fn duplicate_call_id_from_model_is_a_log_error() {
        let orch = orchestrator(
            ScriptedModel::new(vec![
                MockResponse::tools(vec![("A", "Echo", json!({"text": "1"}))]),
                MockResponse::tools(vec![
                    ("A", "Echo", json!({"text": "2"})),
                    ("C", "Echo", json!({"text": "3"})),
                ]),
            ]),
            EngineConfig::default(),
        );
        let err = orch.run("go").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Log(InvalidEventError::DuplicateToolStart(_))
        ));

        // The failed turn still leaves every requested call answered.
        let history = orch.history().await;
        let requested: Vec<String> = match &history[history.len() - 3] {
            ChatMessage::Assistant { tool_calls, .. } => {
                tool_calls.iter().map(|c| c.id.to_string()).collect()
            }
            other => panic!("unexpected message: {other:?}"),
        };
        let answered: Vec<String> = history[history.len() - 2..]
            .iter()
            .map(|m| match m {
                ChatMessage::Tool { tool_call_id, .. } => tool_call_id.to_string(),
                other => panic!("unexpected message: {other:?}"),
            })
            .collect();
        assert_eq!(requested, vec!["A", "C"]);
        assert_eq!(answered, requested);
        match &history[history.len() - 1] {
            ChatMessage::Tool { content, .. } => assert_eq!(content, "3"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn aborted_orchestrator_refuses_to_run() {
        let orch = orchestrator(ScriptedModel::new(vec![MockResponse::text("x")]), EngineConfig::default());
        orch.abort();
        assert!(matches!(orch.run("hi").await, Err(EngineError::Aborted)));
    }

    #[tokio::test]
    async fn dropped_call_is_recorded_as_cancelled() {
        let log = SessionLog::default();
        log.append(NewEvent::tool_started(ToolCallId::from_raw("A"), "Echo", json!({}), None))
            .unwrap();
        drop(PendingCompletion::new(&log, ToolCallId::from_raw("A"), None));
        assert_eq!(
            log.status_of(&NodeId::Tool(ToolCallId::from_raw("A"))),
            NodeStatus::Errored
        );
    }
}
