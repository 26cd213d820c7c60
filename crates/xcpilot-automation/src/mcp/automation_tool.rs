use super::server::{Tool, ToolSchema};
use crate::action::{Action, Backend};
use crate::config::AutomationConfig;
use crate::context::ExecutionContext;
use crate::dispatcher::Dispatcher;
use crate::envelope::{Envelope, ErrorEntry};
use crate::error_codes::ErrorCode;
use crate::{AutomationError, Result};
use async_trait::async_trait;
use jsonschema::Validator;
use jsonschema::error::ValidationErrorKind;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const TOOL_NAME: &str = "ui_automation";

fn parameters_schema() -> Value {
    let actions: Vec<&str> = Action::ALL.iter().map(Action::as_str).collect();
    json!({
        "type": "object",
        "properties": {
            "action": {
                "type": "string",
                "description": format!("Automation action: {}", actions.join(", "))
            },
            "backend": {
                "type": "string",
                "description": "xcuitest (default), idb, macos_ax, or auto"
            },
            "deviceId": {
                "type": "string",
                "description": "Simulator or device identifier. Shared capabilities default to the booted simulator."
            },
            "application": {
                "type": "string",
                "description": "Application name or bundle id (macos_ax backend)"
            },
            "scheme": {
                "type": "string",
                "description": "Scheme whose configured runner command should be used"
            },
            "runnerCommand": {
                "type": "string",
                "description": "Explicit runner command, overriding the configured one"
            },
            "params": {
                "type": "object",
                "description": "Action parameters: locator fields (identifier, title, label, role, description, placeholder, value, match), text, timeout, timeoutMs, expectedValue, pid, path, filter, maxDepth, ..."
            }
        },
        "required": ["action"]
    })
}

/// The `ui_automation` MCP tool.
pub struct UiAutomationKit {
    schema: ToolSchema,
    validator: Validator,
    dispatcher: Arc<Dispatcher>,
    config: Arc<AutomationConfig>,
    shutdown: CancellationToken,
}

impl UiAutomationKit {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        config: Arc<AutomationConfig>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let parameters = parameters_schema();
        let validator = jsonschema::validator_for(&parameters)
            .map_err(|e| AutomationError::Mcp(format!("Invalid tool schema: {}", e)))?;

        Ok(Self {
            schema: ToolSchema {
                name: TOOL_NAME.to_string(),
                description: "Drive iOS simulator and macOS app UIs: tap, type, query, wait, \
                              assert, screenshot, video/log capture, crash reports and report \
                              export, through the xcuitest runner, idb or the macOS \
                              accessibility API."
                    .to_string(),
                parameters,
            },
            validator,
            dispatcher,
            config,
            shutdown,
        })
    }

    /// Validate tool arguments and build the call context, or the envelope
    /// explaining why no call is made.
    pub fn parse_call(&self, arguments: &Value) -> std::result::Result<ExecutionContext, Envelope> {
        let requested_backend = arguments
            .get("backend")
            .and_then(Value::as_str)
            .and_then(|b| Backend::parse_choice(Some(b)).ok().flatten());
        let fallback_backend = Backend::resolve(requested_backend);

        let violations: Vec<_> = self.validator.iter_errors(arguments).collect();
        if !violations.is_empty() {
            let missing = violations
                .iter()
                .any(|e| matches!(e.kind, ValidationErrorKind::Required { .. }));
            let message = violations
                .iter()
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{}: {}", path, e)
                    }
                })
                .collect::<Vec<_>>()
                .join("; ");
            let code = if missing {
                ErrorCode::MISSING_PARAMS
            } else {
                ErrorCode::INVALID_PARAMS
            };
            return Err(Envelope::failure(fallback_backend, ErrorEntry::new(code, message)));
        }

        let text = |key: &str| arguments.get(key).and_then(Value::as_str);

        let action: Action = text("action")
            .unwrap_or_default()
            .parse()
            .map_err(|e: String| {
                Envelope::failure(
                    fallback_backend,
                    ErrorEntry::new(ErrorCode::UNKNOWN_ACTION, e).with_hint(format!(
                        "Known actions: {}",
                        Action::ALL
                            .iter()
                            .map(Action::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    )),
                )
            })?;

        let backend = Backend::parse_choice(text("backend")).map_err(|e| {
            Envelope::failure(
                Backend::DEFAULT,
                ErrorEntry::new(ErrorCode::UNKNOWN_BACKEND, e)
                    .with_hint("Use xcuitest, idb, macos_ax or auto."),
            )
        })?;

        let mut ctx = ExecutionContext::new(action)
            .with_params(arguments.get("params").cloned().unwrap_or(Value::Null))
            .with_cancellation(self.shutdown.child_token());
        if let Some(backend) = backend {
            ctx = ctx.with_backend(backend);
        }
        if let Some(device) = text("deviceId") {
            ctx = ctx.with_device(device);
        }
        if let Some(application) = text("application") {
            ctx = ctx.with_application(application);
        }
        if let Some(command) = self
            .config
            .resolve_runner_command(text("runnerCommand"), text("scheme"))
        {
            ctx = ctx.with_runner_command(command);
        }
        Ok(ctx)
    }
}

#[async_trait]
impl Tool for UiAutomationKit {
    async fn execute(&self, params: Value) -> Result<Value> {
        let envelope = match self.parse_call(&params) {
            Ok(ctx) => self.dispatcher.execute(&ctx).await,
            Err(envelope) => {
                tracing::debug!(code = ?envelope.first_error_code(), "Rejected tool arguments");
                envelope
            }
        };
        Ok(serde_json::to_value(envelope)?)
    }

    fn schema(&self) -> &ToolSchema {
        &self.schema
    }
}
