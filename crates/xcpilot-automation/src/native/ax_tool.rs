//! Client for the accessibility query/act CLI.
//!
//! The tool reads one JSON command on stdin and prints
//! `{command_id, status: "success" | "error", data?, error?}`. A `status` of
//! `error` is a failure regardless of the process exit code.

use crate::envelope::ErrorEntry;
use crate::error_codes::ErrorCode;
use crate::json_output::extract_json_object;
use crate::locator::Locator;
use crate::process::{ProcessRequest, ProcessRunner};
use crate::AutomationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AxCommandKind {
    Query,
    PerformAction,
    CollectAll,
    ExtractText,
    GetAttributes,
}

#[derive(Debug, Clone, Serialize)]
pub struct AxCommand {
    pub command_id: String,
    pub command: AxCommandKind,
    pub application: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_value: Option<Value>,
}

impl AxCommand {
    pub fn new(command: AxCommandKind, application: &str) -> Self {
        Self {
            command_id: uuid::Uuid::new_v4().to_string(),
            command,
            application: application.to_string(),
            locator: None,
            attributes: None,
            max_depth: None,
            action_name: None,
            action_value: None,
        }
    }

    pub fn locator(mut self, locator: Option<&Locator>) -> Self {
        self.locator = locator.map(Locator::to_ax_locator);
        self
    }

    pub fn attributes(mut self, attributes: &[&str]) -> Self {
        self.attributes = Some(attributes.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn action(mut self, name: &str, value: Option<Value>) -> Self {
        self.action_name = Some(name.to_string());
        self.action_value = value;
        self
    }
}

/// Why a native operation did not succeed.
#[derive(Debug)]
pub enum NativeError {
    /// The subprocess could not run, timed out or was cancelled.
    Process(AutomationError),
    /// The tool answered with something that is not a reply object.
    InvalidOutput { detail: String, stdout: String },
    /// The tool (or script) ran and reported failure.
    Rejected(String),
}

const ACTION_REJECTION_MARKERS: [&str; 5] = [
    "not supported",
    "unsupported",
    "does not support",
    "not settable",
    "is not available",
];

const NOT_FOUND_MARKERS: [&str; 3] = ["not found", "no element", "no matching"];

/// "Action not found: AXPress", "Action AXPress not found on element".
static ACTION_NOT_FOUND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\baction\b.*\bnot found\b").expect("valid action pattern"));

/// Checked ahead of the not-found markers, which a missing action also matches.
fn rejects_action(message: &str) -> bool {
    ACTION_REJECTION_MARKERS.iter().any(|m| message.contains(m)) || ACTION_NOT_FOUND.is_match(message)
}

impl NativeError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, NativeError::Process(AutomationError::Cancelled))
    }

    /// The platform refused the action verb itself (the element does not
    /// advertise it), as opposed to not finding the element.
    pub fn is_action_rejection(&self) -> bool {
        match self {
            NativeError::Rejected(message) => rejects_action(&message.to_ascii_lowercase()),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            NativeError::Rejected(message) => {
                let message = message.to_ascii_lowercase();
                !rejects_action(&message) && NOT_FOUND_MARKERS.iter().any(|m| message.contains(m))
            }
            _ => false,
        }
    }

    pub fn into_entry(self) -> ErrorEntry {
        let rejection = self.is_action_rejection();
        let not_found = self.is_not_found();
        match self {
            NativeError::Process(e) => e.into(),
            NativeError::InvalidOutput { detail, .. } => {
                ErrorEntry::new(ErrorCode::AX_TOOL_INVALID_OUTPUT, detail)
            }
            NativeError::Rejected(message) if rejection => {
                ErrorEntry::new(ErrorCode::ACTION_NOT_SUPPORTED, message)
            }
            NativeError::Rejected(message) if not_found => {
                ErrorEntry::new(ErrorCode::ELEMENT_NOT_FOUND, message)
                    .with_hint("Check the locator against describe_ui output.")
            }
            NativeError::Rejected(message) => ErrorEntry::new(ErrorCode::ACTION_FAILED, message),
        }
    }
}

impl std::fmt::Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NativeError::Process(e) => write!(f, "{}", e),
            NativeError::InvalidOutput { detail, .. } => write!(f, "{}", detail),
            NativeError::Rejected(message) => write!(f, "{}", message),
        }
    }
}

impl From<AutomationError> for NativeError {
    fn from(error: AutomationError) -> Self {
        NativeError::Process(error)
    }
}

/// Parse the tool's stdout into `Ok(data)` or the reported failure.
pub fn parse_reply(stdout: &str) -> Result<Value, NativeError> {
    let Some(reply) = extract_json_object(stdout) else {
        return Err(NativeError::InvalidOutput {
            detail: "Accessibility tool printed no JSON reply".to_string(),
            stdout: stdout.to_string(),
        });
    };

    match reply.get("status").and_then(Value::as_str) {
        Some("success") => Ok(reply.get("data").cloned().unwrap_or(Value::Null)),
        Some("error") => {
            let message = match reply.get("error") {
                Some(Value::String(message)) => message.clone(),
                Some(Value::Object(error)) => error
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| Value::Object(error.clone()).to_string()),
                _ => "Accessibility tool reported an error".to_string(),
            };
            Err(NativeError::Rejected(message))
        }
        other => Err(NativeError::InvalidOutput {
            detail: format!("Accessibility tool reply has unexpected status {:?}", other),
            stdout: stdout.to_string(),
        }),
    }
}

pub struct AxClient<'a> {
    processes: &'a dyn ProcessRunner,
    program: &'a str,
}

impl<'a> AxClient<'a> {
    pub fn new(processes: &'a dyn ProcessRunner, program: &'a str) -> Self {
        Self { processes, program }
    }

    pub async fn send(
        &self,
        command: &AxCommand,
        cancel: &CancellationToken,
    ) -> Result<Value, NativeError> {
        let input = serde_json::to_string(command).map_err(AutomationError::from)?;
        tracing::debug!(
            command = ?command.command,
            command_id = %command.command_id,
            application = %command.application,
            "Sending accessibility command"
        );

        let output = self
            .processes
            .run(
                ProcessRequest::new(self.program).arg("--stdin").stdin(input),
                cancel,
            )
            .await?;

        parse_reply(&output.stdout).map_err(|e| match e {
            NativeError::InvalidOutput { detail, stdout } if !output.stderr.trim().is_empty() => {
                NativeError::InvalidOutput {
                    detail: format!("{}: {}", detail, output.stderr.trim()),
                    stdout,
                }
            }
            other => other,
        })
    }
}
