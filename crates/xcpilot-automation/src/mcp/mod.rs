//! MCP tool surface: the `ui_automation` tool and the stdio JSON-RPC loop
//! that serves it.

pub mod automation_tool;
pub mod server;
pub mod stdio;

pub use automation_tool::UiAutomationKit;
pub use server::{McpServer, Tool, ToolSchema};
