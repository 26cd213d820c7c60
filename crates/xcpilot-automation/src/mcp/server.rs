use crate::{AutomationError, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

#[async_trait]
pub trait Tool: Send + Sync {
    async fn execute(&self, params: Value) -> Result<Value>;
    fn schema(&self) -> &ToolSchema;
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub parameters: Value,
}

/// Registry of tools exposed over MCP.
#[derive(Default)]
pub struct McpServer {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl McpServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.schema().name.clone();
        tracing::debug!(%name, "Registered tool");
        self.tools.insert(name, tool);
    }

    pub fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|tool| tool.schema().clone()).collect()
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AutomationError::Mcp(format!("Tool not found: {}", name)))?;
        tool.execute(arguments).await
    }
}
