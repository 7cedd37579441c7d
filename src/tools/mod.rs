//! Tools the model may call during an agent turn.
//!
//! Every tool is advertised to the completion endpoint through its
//! [`ToolSchema`]; the tool-resolution loop dispatches requested calls
//! through the [`ToolRegistry`].

pub mod search;
mod web;

pub use search::{SearchClient, SearchError, SearchHit, SearchSummary, TavilyClient};
pub use web::{InternetSearch, INTERNET_SEARCH};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::llm::ToolSchema;

/// A callable capability exposed to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Parameter schema in the completion API's declaration dialect.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: &Map<String, Value>) -> anyhow::Result<String>;
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
}

/// Name and description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// Ordered set of tools available to agents.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// An empty registry: nothing is advertised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry advertising only `internet_search` backed by `client`.
    pub fn with_search(client: Arc<dyn SearchClient>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(InternetSearch::new(client)));
        registry
    }

    /// Add a tool, replacing any tool registered under the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    pub fn get_tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Run the named tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when nothing is registered under
    /// `name`, or whatever the tool itself reports.
    pub async fn execute(&self, name: &str, args: &Map<String, Value>) -> anyhow::Result<String> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        tool.execute(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the text argument"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "OBJECT", "properties": {"text": {"type": "STRING"}}})
        }

        async fn execute(&self, args: &Map<String, Value>) -> anyhow::Result<String> {
            Ok(args.get("text").and_then(Value::as_str).unwrap_or_default().to_string())
        }
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));

        let args = json!({"text": "ping"}).as_object().cloned().unwrap();
        assert_eq!(registry.execute("echo", &args).await.unwrap(), "ping");
        assert_eq!(registry.get_tool_schemas()[0].name, "echo");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_typed_error() {
        let registry = ToolRegistry::new();
        let err = registry.execute("teleport", &Map::new()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ToolError>(),
            Some(ToolError::UnknownTool(name)) if name == "teleport"
        ));
    }

    #[test]
    fn register_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        registry.register(Arc::new(Echo));
        assert_eq!(registry.list_tools().len(), 1);
    }
}
