//! Runner strategy: hands interactive and query actions to a caller-configured
//! command bridging to an on-device UI test harness.
//!
//! The command receives `{action, backend, deviceId, params}` as a single
//! shell-quoted JSON argument and must print one JSON object shaped
//! `{ok, data?, artifacts?, warnings?, errors?}`. Once that object parses, the
//! exit code is advisory only.

use crate::action::Backend;
use crate::config::AutomationConfig;
use crate::context::ExecutionContext;
use crate::envelope::{Envelope, ErrorEntry};
use crate::error_codes::ErrorCode;
use crate::json_output::extract_json_object;
use crate::process::{ProcessOutput, ProcessRequest, ProcessRunner, shell_quote};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const IDB_INSTALL_HINT: &str = "Install idb: `brew tap facebook/fb && brew install idb-companion` \
     followed by `pip3 install fb-idb`, then make sure `idb` is on PATH.";

const MISSING_RUNNER_HINT: &str = "Configure a runner command for this scheme (runnerCommands in \
     the xcpilot config) or pass runnerCommand explicitly.";

pub struct RunnerStrategy {
    processes: Arc<dyn ProcessRunner>,
    config: Arc<AutomationConfig>,
}

impl RunnerStrategy {
    pub fn new(processes: Arc<dyn ProcessRunner>, config: Arc<AutomationConfig>) -> Self {
        Self { processes, config }
    }

    pub async fn execute(&self, ctx: &ExecutionContext, backend: Backend) -> Envelope {
        let Some(command) = ctx
            .runner_command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        else {
            return Envelope::failure(
                backend,
                ErrorEntry::new(
                    ErrorCode::MISSING_RUNNER,
                    format!("No runner command configured for '{}'", ctx.action),
                )
                .with_hint(MISSING_RUNNER_HINT),
            );
        };

        if backend.requires_idb() && self.processes.locate(&self.config.tools.idb).await.is_none() {
            return Envelope::failure(
                backend,
                ErrorEntry::new(
                    ErrorCode::IDB_NOT_FOUND,
                    format!("'{}' was not found on this host", self.config.tools.idb),
                )
                .with_hint(IDB_INSTALL_HINT),
            );
        }

        let payload = build_payload(ctx, backend);
        let script = format!("{} {}", command, shell_quote(&payload.to_string()));
        let request = ProcessRequest::new(&self.config.tools.shell)
            .args(["-c".to_string(), script])
            .timeout(self.config.runner_timeout_secs.map(Duration::from_secs));

        tracing::info!(action = %ctx.action, backend = %backend, "Invoking runner command");

        match self.processes.run(request, &ctx.cancel).await {
            Ok(output) => interpret_runner_output(backend, &output),
            Err(e) => {
                tracing::warn!(error = %e, "Runner invocation failed");
                Envelope::from_error(backend, e)
            }
        }
    }
}

pub fn build_payload(ctx: &ExecutionContext, backend: Backend) -> Value {
    json!({
        "action": ctx.action,
        "backend": backend,
        "deviceId": ctx.device(),
        "params": Value::Object(ctx.params.clone()),
    })
}

/// Turn a finished runner process into an envelope.
pub fn interpret_runner_output(backend: Backend, output: &ProcessOutput) -> Envelope {
    match extract_json_object(&output.stdout) {
        Some(object) => {
            if !output.success() {
                tracing::debug!(status = ?output.status, "Runner exited non-zero with a JSON result");
            }
            normalize_runner_result(backend, object)
        }
        None if !output.success() => Envelope::failure(
            backend,
            ErrorEntry::new(
                ErrorCode::RUNNER_FAILED,
                format!(
                    "Runner command exited with status {} without a JSON result",
                    output
                        .status
                        .map(|code| code.to_string())
                        .unwrap_or_else(|| "signal".to_string())
                ),
            ),
        )
        .with_data(json!({
            "exitCode": output.status,
            "stdout": output.stdout,
            "stderr": output.stderr,
        })),
        None => Envelope::failure(
            backend,
            ErrorEntry::new(
                ErrorCode::RUNNER_INVALID_OUTPUT,
                "Runner command printed no JSON object",
            )
            .with_hint("The runner must print exactly one JSON object such as {\"ok\": true} on stdout."),
        )
        .with_data(json!({
            "stdout": output.stdout,
            "stderr": output.stderr,
        })),
    }
}

/// Validate and map the runner's JSON object onto an envelope.
pub fn normalize_runner_result(backend: Backend, object: Map<String, Value>) -> Envelope {
    let Some(ok) = object.get("ok").and_then(Value::as_bool) else {
        return Envelope::failure(
            backend,
            ErrorEntry::new(
                ErrorCode::RUNNER_INVALID_JSON,
                "Runner JSON is missing a boolean 'ok' field",
            ),
        )
        .with_data(json!({ "raw": Value::Object(object) }));
    };

    let data = object.get("data").filter(|v| !v.is_null()).cloned();
    let artifacts = object
        .get("artifacts")
        .map(coerce_artifacts)
        .unwrap_or_default();
    let warnings = object
        .get("warnings")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let errors = object.get("errors").map(coerce_errors).unwrap_or_default();

    let mut envelope = Envelope {
        ok,
        backend,
        data,
        artifacts,
        warnings,
        errors,
    };

    if !envelope.ok && envelope.errors.is_empty() {
        envelope.errors.push(ErrorEntry::new(
            ErrorCode::RUNNER_ERROR,
            "Runner reported failure without error details",
        ));
    }
    envelope
}

fn coerce_artifacts(value: &Value) -> BTreeMap<String, String> {
    let Some(map) = value.as_object() else {
        return BTreeMap::new();
    };
    map.iter()
        .filter_map(|(name, path)| {
            let path = match path {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((name.clone(), path))
        })
        .collect()
}

fn coerce_errors(value: &Value) -> Vec<ErrorEntry> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        single => vec![single],
    };

    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(message) => Some(ErrorEntry::message_only(message.clone())),
            Value::Object(entry) => {
                let text = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
                Some(ErrorEntry {
                    message: text("message").unwrap_or_else(|| item.to_string()),
                    code: text("code"),
                    hint: text("hint"),
                })
            }
            Value::Null => None,
            other => Some(ErrorEntry::message_only(other.to_string())),
        })
        .collect()
}
