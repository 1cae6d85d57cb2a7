use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use klaude_core::tools::{Tool, ToolDefinition};

/// Filter for selecting tools when building a sub-agent registry.
#[derive(Clone, Debug)]
pub enum ToolFilter {
    InheritAll,
    /// Parent tools minus these.
    InheritExcept(HashSet<String>),
    /// Only these tools.
    Explicit(HashSet<String>),
}

/// Name-keyed set of tools the model may call.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(Arc::clone)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tool definitions for the model, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn clone_for_subagent(&self, filter: &ToolFilter) -> Self {
        let tools = self
            .tools
            .iter()
            .filter(|(name, _)| match filter {
                ToolFilter::InheritAll => true,
                ToolFilter::InheritExcept(excluded) => !excluded.contains(*name),
                ToolFilter::Explicit(included) => included.contains(*name),
            })
            .map(|(name, tool)| (name.clone(), Arc::clone(tool)))
            .collect();
        Self { tools }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use klaude_core::tools::{ToolContext, ToolError};

    struct DummyTool(&'static str);

    #[async_trait]
    impl Tool for DummyTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "A dummy tool for testing"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(
            &self,
            _args: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<String, ToolError> {
            Ok("ok".into())
        }
    }

    fn registry(names: &[&'static str]) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for name in names {
            registry.register(Arc::new(DummyTool(name)));
        }
        registry
    }

    #[test]
    fn register_and_get() {
        let registry = registry(&["Read"]);
        assert!(registry.contains("Read"));
        assert!(!registry.contains("Write"));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("Read").is_some());
        assert!(registry.get("Write").is_none());
    }

    #[test]
    fn names_and_definitions_sorted() {
        let registry = registry(&["Task", "Bash", "Read"]);
        assert_eq!(registry.names(), vec!["Bash", "Read", "Task"]);
        let defs = registry.definitions();
        assert_eq!(defs[0].name, "Bash");
        assert_eq!(defs[2].name, "Task");
    }

    #[test]
    fn clone_for_subagent_filters() {
        let registry = registry(&["Read", "Bash", "Task"]);
        assert_eq!(registry.clone_for_subagent(&ToolFilter::InheritAll).len(), 3);

        let sub = registry.clone_for_subagent(&ToolFilter::InheritExcept(HashSet::from([
            "Task".to_string(),
        ])));
        assert_eq!(sub.names(), vec!["Bash", "Read"]);

        let sub = registry
            .clone_for_subagent(&ToolFilter::Explicit(HashSet::from(["Read".to_string()])));
        assert_eq!(sub.names(), vec!["Read"]);
    }
}
