//! UI automation core for xcpilot.
//!
//! A caller hands the [`Dispatcher`] an [`ExecutionContext`] naming an
//! [`Action`] and an optional [`Backend`]; the dispatcher validates the pairing
//! and routes it to the runner, native-accessibility or shared-capability
//! strategy. Every strategy answers with an [`Envelope`].

pub mod action;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod envelope;
pub mod error_codes;
pub mod json_output;
pub mod locator;
pub mod mcp;
pub mod native;
pub mod process;
pub mod runner;
pub mod shared;

pub use action::{Action, Backend};
pub use config::AutomationConfig;
pub use context::ExecutionContext;
pub use dispatcher::Dispatcher;
pub use envelope::{Envelope, ErrorEntry};
pub use error_codes::ErrorCode;
pub use locator::Locator;
pub use process::{ProcessOutput, ProcessRequest, ProcessRunner, SystemProcessRunner};

pub use tokio_util::sync::CancellationToken;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{program} did not finish within {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("{tool} not found on this host")]
    ToolNotFound { tool: String, hint: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

pub type Result<T> = std::result::Result<T, AutomationError>;
