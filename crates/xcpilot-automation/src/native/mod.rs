//! Native accessibility strategy: drives a running macOS application through
//! its accessibility tree, without an on-device harness.

pub mod ax_tool;
pub mod elements;
pub mod fallback;
pub mod scripting;

use crate::action::{Action, Backend};
use crate::config::AutomationConfig;
use crate::context::ExecutionContext;
use crate::envelope::{Envelope, ErrorEntry};
use crate::error_codes::ErrorCode;
use crate::locator::{Locator, LocatorField};
use crate::process::{ProcessRequest, ProcessRunner};
use crate::AutomationError;
use ax_tool::{AxClient, AxCommand, AxCommandKind};
use elements::{DESCRIBE_ATTRIBUTES, FRAME_ATTRIBUTES};
use fallback::{
    ChainOutcome, TAP_TIERS, TYPE_TIERS, TapTier, Tier, TierOutcome, TypeTier, fallback_warnings,
    run_tiers,
};
use scripting::HostScripting;
use serde::Serialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const BACKEND: Backend = Backend::MacosAx;

pub const DEFAULT_MAX_DEPTH: u32 = 5;
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Pause between tapping a field and typing into it.
pub const FOCUS_SETTLE: Duration = Duration::from_millis(300);

pub const AX_TOOL_INSTALL_HINT: &str = "Install the axorc accessibility CLI and put it on PATH \
     (or set tools.axTool in the xcpilot config), then grant Accessibility access to the \
     calling terminal in System Settings > Privacy & Security > Accessibility.";

/// A validated native call, built before any process is spawned.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeRequest {
    DescribeUi { max_depth: u32 },
    Tap { locator: Locator },
    Type { text: String, locator: Option<Locator> },
    ClearText { locator: Locator },
    QueryText { locator: Option<Locator> },
    WaitFor { locator: Locator, timeout: Duration },
    Assert { locator: Locator, expected: Option<String> },
    Screenshot { path: Option<PathBuf> },
}

impl NativeRequest {
    pub fn from_context(ctx: &ExecutionContext) -> Result<Self, ErrorEntry> {
        let locator = Locator::from_params(&ctx.params).map_err(ErrorEntry::from)?;
        let require_locator = |locator: Option<Locator>| {
            locator.ok_or_else(|| {
                ErrorEntry::new(
                    ErrorCode::MISSING_PARAMS,
                    format!("{} requires a locator", ctx.action),
                )
                .with_hint(
                    "Provide at least one of identifier, title, label, role, description, \
                     placeholder or value.",
                )
            })
        };

        match ctx.action {
            Action::DescribeUi => Ok(NativeRequest::DescribeUi {
                max_depth: ctx
                    .param_u64("maxDepth")
                    .map(|d| d.min(u32::MAX as u64) as u32)
                    .unwrap_or(DEFAULT_MAX_DEPTH),
            }),
            Action::Tap => Ok(NativeRequest::Tap {
                locator: require_locator(locator)?,
            }),
            Action::Type => {
                let text = ctx
                    .params
                    .get("text")
                    .and_then(Value::as_str)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        ErrorEntry::new(ErrorCode::MISSING_PARAMS, "type requires a 'text' parameter")
                    })?;
                Ok(NativeRequest::Type {
                    text: text.to_string(),
                    locator,
                })
            }
            Action::ClearText => Ok(NativeRequest::ClearText {
                locator: require_locator(locator)?,
            }),
            Action::QueryText => Ok(NativeRequest::QueryText { locator }),
            Action::WaitFor => Ok(NativeRequest::WaitFor {
                locator: require_locator(locator)?,
                timeout: wait_timeout(ctx)?,
            }),
            Action::Assert => Ok(NativeRequest::Assert {
                locator: require_locator(locator)?,
                expected: ctx
                    .params
                    .get("expectedValue")
                    .or_else(|| ctx.params.get("expected"))
                    .and_then(|v| match v {
                        Value::Null => None,
                        Value::String(s) => Some(s.clone()),
                        other => Some(other.to_string()),
                    }),
            }),
            Action::Screenshot => Ok(NativeRequest::Screenshot {
                path: ctx.param_str("path").map(PathBuf::from),
            }),
            Action::Swipe
            | Action::Scroll
            | Action::QueryControls
            | Action::VideoStart
            | Action::VideoStop
            | Action::LogsStart
            | Action::LogsStop
            | Action::CrashList
            | Action::CrashExport
            | Action::ExportReport => Err(ErrorEntry::new(
                ErrorCode::UNSUPPORTED_ACTION,
                format!("{} is not supported by the {} backend", ctx.action, BACKEND),
            )),
        }
    }
}

fn wait_timeout(ctx: &ExecutionContext) -> Result<Duration, ErrorEntry> {
    if let Some(ms) = ctx.param_u64("timeoutMs") {
        return Ok(Duration::from_millis(ms));
    }
    match ctx.param_f64("timeout") {
        Some(seconds) if seconds.is_nan() || seconds.is_infinite() => Err(invalid_timeout(seconds)),
        Some(seconds) if seconds >= 0.0 => {
            Duration::try_from_secs_f64(seconds).map_err(|_| invalid_timeout(seconds))
        }
        _ => Ok(DEFAULT_WAIT_TIMEOUT),
    }
}

fn invalid_timeout(seconds: f64) -> ErrorEntry {
    ErrorEntry::new(
        ErrorCode::INVALID_PARAMS,
        format!("timeout {} is not a representable number of seconds", seconds),
    )
    .with_hint("Pass a finite timeout in seconds, or timeoutMs.")
}

/// Number of polls made within `timeout` at [`POLL_INTERVAL`], at least one.
pub fn poll_attempts(timeout: Duration) -> u32 {
    let interval = POLL_INTERVAL.as_millis();
    let attempts = timeout.as_millis().div_ceil(interval);
    attempts.clamp(1, u32::MAX as u128) as u32
}

pub struct NativeStrategy {
    processes: Arc<dyn ProcessRunner>,
    config: Arc<AutomationConfig>,
}

impl NativeStrategy {
    pub fn new(processes: Arc<dyn ProcessRunner>, config: Arc<AutomationConfig>) -> Self {
        Self { processes, config }
    }

    pub async fn execute(&self, ctx: &ExecutionContext) -> Envelope {
        let request = match NativeRequest::from_context(ctx) {
            Ok(request) => request,
            Err(entry) => return Envelope::failure(BACKEND, entry),
        };

        // Screen capture needs neither the accessibility tool nor a target app.
        if let NativeRequest::Screenshot { path } = request {
            return self.screenshot(path, &ctx.cancel).await;
        }

        let Some(ax_tool) = self.processes.locate(&self.config.tools.ax_tool).await else {
            return Envelope::failure(
                BACKEND,
                ErrorEntry::new(
                    ErrorCode::AX_TOOL_NOT_FOUND,
                    format!("'{}' was not found on this host", self.config.tools.ax_tool),
                )
                .with_hint(AX_TOOL_INSTALL_HINT),
            );
        };

        let Some(app) = ctx.app() else {
            return Envelope::failure(
                BACKEND,
                ErrorEntry::new(
                    ErrorCode::MISSING_APPLICATION,
                    format!("{} on the {} backend needs a target application", ctx.action, BACKEND),
                )
                .with_hint("Pass application as a name (\"TextEdit\") or bundle id (\"com.apple.TextEdit\")."),
            );
        };

        let mut warnings = Vec::new();
        let application = self.resolve_application(app, &ctx.cancel, &mut warnings).await;
        tracing::info!(action = %ctx.action, %application, "Running native accessibility action");

        let session = Session {
            processes: self.processes.as_ref(),
            ax_tool: ax_tool.display().to_string(),
            osascript: &self.config.tools.osascript,
            application,
            cancel: &ctx.cancel,
        };

        let mut envelope = match &request {
            NativeRequest::DescribeUi { max_depth } => session.describe_ui(*max_depth).await,
            NativeRequest::Tap { locator } => session.tap(locator).await,
            NativeRequest::Type { text, locator } => session.type_text(text, locator.as_ref()).await,
            NativeRequest::ClearText { locator } => session.clear_text(locator).await,
            NativeRequest::QueryText { locator } => session.query_text(locator.as_ref()).await,
            NativeRequest::WaitFor { locator, timeout } => session.wait_for(locator, *timeout).await,
            NativeRequest::Assert { locator, expected } => {
                session.assert(locator, expected.as_deref()).await
            }
            NativeRequest::Screenshot { path } => self.screenshot(path.clone(), &ctx.cancel).await,
        };

        warnings.append(&mut envelope.warnings);
        envelope.warnings = warnings;
        envelope
    }

    /// Qualified identifiers pass through; plain names go through a
    /// best-effort bundle id lookup and fall back to the literal name.
    async fn resolve_application(
        &self,
        app: &str,
        cancel: &CancellationToken,
        warnings: &mut Vec<String>,
    ) -> String {
        if app.contains('.') {
            return app.to_string();
        }

        let scripting = HostScripting::new(self.processes.as_ref(), &self.config.tools.osascript);
        match scripting.run(&scripting::bundle_id_script(app), cancel).await {
            Ok(bundle_id) if bundle_id.contains('.') => {
                tracing::debug!(name = %app, %bundle_id, "Resolved application");
                bundle_id
            }
            Ok(_) | Err(_) => {
                tracing::debug!(name = %app, "Bundle id lookup failed, using name as given");
                warnings.push(format!(
                    "Could not resolve '{}' to a bundle identifier; using the name as given",
                    app
                ));
                app.to_string()
            }
        }
    }

    async fn screenshot(&self, path: Option<PathBuf>, cancel: &CancellationToken) -> Envelope {
        let path = path.unwrap_or_else(|| self.config.artifact_path("screenshot", "png"));
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Envelope::from_error(BACKEND, e.into());
            }
        }

        let path_text = path.display().to_string();
        let request = ProcessRequest::new(&self.config.tools.screencapture)
            .args(["-x".to_string(), path_text.clone()]);

        match self.processes.run(request, cancel).await {
            Ok(output) if output.success() => {
                Envelope::success(BACKEND, json!({ "path": path_text }))
                    .with_artifact("screenshot", path_text)
            }
            Ok(output) => Envelope::failure(
                BACKEND,
                ErrorEntry::new(
                    ErrorCode::CAPTURE_FAILED,
                    format!("screencapture failed: {}", output.stderr.trim()),
                )
                .with_hint("Grant Screen Recording permission to the calling terminal."),
            ),
            Err(e) => Envelope::from_error(BACKEND, e),
        }
    }
}

struct Session<'a> {
    processes: &'a dyn ProcessRunner,
    ax_tool: String,
    osascript: &'a str,
    application: String,
    cancel: &'a CancellationToken,
}

impl Session<'_> {
    fn ax(&self) -> AxClient<'_> {
        AxClient::new(self.processes, &self.ax_tool)
    }

    fn scripting(&self) -> HostScripting<'_> {
        HostScripting::new(self.processes, self.osascript)
    }

    fn command(&self, kind: AxCommandKind) -> AxCommand {
        AxCommand::new(kind, &self.application)
    }

    async fn describe_ui(&self, max_depth: u32) -> Envelope {
        let command = self
            .command(AxCommandKind::CollectAll)
            .max_depth(max_depth)
            .attributes(&DESCRIBE_ATTRIBUTES);

        match self.ax().send(&command, self.cancel).await {
            Ok(data) => {
                let elements = elements::collect_elements(&data);
                Envelope::success(
                    BACKEND,
                    json!({
                        "application": self.application,
                        "maxDepth": max_depth,
                        "elementCount": elements.len(),
                        "elements": elements,
                    }),
                )
            }
            Err(e) => Envelope::failure(BACKEND, e.into_entry()),
        }
    }

    async fn tap(&self, locator: &Locator) -> Envelope {
        let outcome = self.tap_chain(locator).await;
        chain_envelope(outcome, ErrorCode::TAP_FALLBACK_EXHAUSTED, "tap", locator.describe())
    }

    async fn tap_chain(&self, locator: &Locator) -> ChainOutcome<TapTier> {
        run_tiers(&TAP_TIERS, move |tier| self.attempt_tap(tier, locator)).await
    }

    async fn attempt_tap(&self, tier: TapTier, locator: &Locator) -> TierOutcome {
        match tier {
            TapTier::ValidatedPress => {
                let command = self
                    .command(AxCommandKind::PerformAction)
                    .locator(Some(locator))
                    .action("AXPress", None);
                match self.ax().send(&command, self.cancel).await {
                    Ok(_) => TierOutcome::Completed(json!({})),
                    Err(e) if e.is_action_rejection() => TierOutcome::Rejected(e.to_string()),
                    Err(e) => TierOutcome::Failed(e.into_entry()),
                }
            }
            TapTier::DirectPress => {
                let target = locator
                    .get(LocatorField::Identifier)
                    .map(|v| ("AXIdentifier", v))
                    .or_else(|| locator.get(LocatorField::Title).map(|v| ("AXTitle", v)));
                let Some((attribute, value)) = target else {
                    return TierOutcome::Rejected(
                        "locator has no identifier or title for a direct lookup".to_string(),
                    );
                };
                let script = scripting::direct_press_script(&self.application, attribute, value);
                match self.scripting().run(&script, self.cancel).await {
                    Ok(_) => TierOutcome::Completed(json!({})),
                    Err(e) if e.is_cancelled() => TierOutcome::Failed(e.into_entry()),
                    Err(e) => TierOutcome::Rejected(e.to_string()),
                }
            }
            TapTier::CoordinateClick => {
                let command = self
                    .command(AxCommandKind::GetAttributes)
                    .locator(Some(locator))
                    .attributes(&FRAME_ATTRIBUTES);
                let frame = match self.ax().send(&command, self.cancel).await {
                    Ok(data) => match elements::element_frame(&data) {
                        Some(frame) => frame,
                        None => {
                            return TierOutcome::Rejected(
                                "element reported no usable position and size".to_string(),
                            );
                        }
                    },
                    Err(e) if e.is_cancelled() => return TierOutcome::Failed(e.into_entry()),
                    Err(e) => {
                        return TierOutcome::Rejected(format!("could not read element frame: {}", e));
                    }
                };

                let (x, y) = frame.center();
                match self.scripting().run(&scripting::click_script(x, y), self.cancel).await {
                    Ok(_) => TierOutcome::Completed(json!({ "x": x, "y": y })),
                    Err(e) if e.is_cancelled() => TierOutcome::Failed(e.into_entry()),
                    Err(e) => TierOutcome::Rejected(e.to_string()),
                }
            }
        }
    }

    async fn type_text(&self, text: &str, locator: Option<&Locator>) -> Envelope {
        let outcome = run_tiers(&TYPE_TIERS, move |tier| self.attempt_type(tier, text, locator)).await;
        let target = locator
            .map(Locator::describe)
            .unwrap_or_else(|| "focused element".to_string());
        let mut envelope = chain_envelope(outcome, ErrorCode::TYPE_FALLBACK_EXHAUSTED, "text entry", target);
        if let Some(Value::Object(data)) = envelope.data.as_mut() {
            if envelope.ok {
                data.insert("textLength".to_string(), json!(text.chars().count()));
            }
        }
        envelope
    }

    async fn attempt_type(&self, tier: TypeTier, text: &str, locator: Option<&Locator>) -> TierOutcome {
        match tier {
            TypeTier::SetValue => {
                let command = self
                    .command(AxCommandKind::PerformAction)
                    .locator(locator)
                    .action("AXSetValue", Some(json!(text)));
                match self.ax().send(&command, self.cancel).await {
                    Ok(_) => TierOutcome::Completed(json!({})),
                    Err(e) if e.is_action_rejection() => TierOutcome::Rejected(e.to_string()),
                    Err(e) => TierOutcome::Failed(e.into_entry()),
                }
            }
            TypeTier::FocusAndKeystroke => {
                if let Some(locator) = locator {
                    match self.tap_chain(locator).await {
                        ChainOutcome::Completed { .. } => {}
                        ChainOutcome::Failed { error, .. } if error.has_code(ErrorCode::ABORTED) => {
                            return TierOutcome::Failed(error);
                        }
                        ChainOutcome::Failed { error, .. } => {
                            return TierOutcome::Rejected(format!(
                                "could not focus element: {}",
                                error.message
                            ));
                        }
                        ChainOutcome::Exhausted { .. } => {
                            return TierOutcome::Rejected(
                                "could not focus element: every tap strategy failed".to_string(),
                            );
                        }
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(FOCUS_SETTLE) => {}
                        _ = self.cancel.cancelled() => {
                            return TierOutcome::Failed(AutomationError::Cancelled.into());
                        }
                    }
                }

                match self
                    .scripting()
                    .run(&scripting::keystroke_script(text), self.cancel)
                    .await
                {
                    Ok(_) => TierOutcome::Completed(json!({ "focusedByTap": locator.is_some() })),
                    Err(e) if e.is_cancelled() => TierOutcome::Failed(e.into_entry()),
                    Err(e) => TierOutcome::Rejected(e.to_string()),
                }
            }
        }
    }

    /// No keystroke fallback: a rejected AXSetValue is reported as-is.
    async fn clear_text(&self, locator: &Locator) -> Envelope {
        let command = self
            .command(AxCommandKind::PerformAction)
            .locator(Some(locator))
            .action("AXSetValue", Some(json!("")));

        match self.ax().send(&command, self.cancel).await {
            Ok(_) => Envelope::success(
                BACKEND,
                json!({ "cleared": true, "method": "AXSetValue", "target": locator.describe() }),
            ),
            Err(e) => Envelope::failure(BACKEND, e.into_entry()),
        }
    }

    async fn query_text(&self, locator: Option<&Locator>) -> Envelope {
        let command = self.command(AxCommandKind::ExtractText).locator(locator);

        match self.ax().send(&command, self.cancel).await {
            Ok(data) => {
                let text = match &data {
                    Value::String(text) => text.clone(),
                    other => other
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                };
                let matches: Vec<&str> = if text.is_empty() {
                    Vec::new()
                } else {
                    vec![text.as_str()]
                };
                Envelope::success(BACKEND, json!({ "text": text, "matches": matches }))
            }
            Err(e) => Envelope::failure(BACKEND, e.into_entry()),
        }
    }

    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Envelope {
        let max_attempts = poll_attempts(timeout);
        let aborted = |attempts: u32| {
            Envelope::failure(
                BACKEND,
                ErrorEntry::new(ErrorCode::ABORTED, "wait_for cancelled"),
            )
            .with_data(json!({ "found": false, "attempts": attempts }))
        };

        if self.cancel.is_cancelled() {
            return aborted(0);
        }

        let command = self.command(AxCommandKind::Query).locator(Some(locator));
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.ax().send(&command, self.cancel).await {
                Ok(_) => {
                    tracing::debug!(attempt, "Element appeared");
                    return Envelope::success(BACKEND, json!({ "found": true, "attempts": attempt }));
                }
                Err(e) if e.is_cancelled() => return aborted(attempt),
                Err(e) => last_error = Some(e.to_string()),
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    _ = self.cancel.cancelled() => return aborted(attempt),
                }
            }
        }

        let mut message = format!(
            "{} did not appear within {}ms",
            locator.describe(),
            timeout.as_millis()
        );
        if let Some(last_error) = last_error {
            message.push_str(&format!(" (last error: {})", last_error));
        }
        Envelope::failure(BACKEND, ErrorEntry::new(ErrorCode::TIMEOUT, message)).with_data(json!({
            "found": false,
            "attempts": max_attempts,
            "timeoutMs": timeout.as_millis() as u64,
        }))
    }

    async fn assert(&self, locator: &Locator, expected: Option<&str>) -> Envelope {
        let command = self
            .command(AxCommandKind::GetAttributes)
            .locator(Some(locator))
            .attributes(&DESCRIBE_ATTRIBUTES);

        let data = match self.ax().send(&command, self.cancel).await {
            Ok(data) => data,
            Err(e) => return Envelope::failure(BACKEND, e.into_entry()),
        };

        let element = elements::normalize_element(&data);
        match expected {
            Some(expected) if element.value.as_deref() != Some(expected) => Envelope::failure(
                BACKEND,
                ErrorEntry::new(
                    ErrorCode::ASSERT_VALUE_MISMATCH,
                    format!(
                        "Expected value '{}' but found {}",
                        expected,
                        element
                            .value
                            .as_deref()
                            .map(|v| format!("'{}'", v))
                            .unwrap_or_else(|| "no value".to_string())
                    ),
                ),
            )
            .with_data(json!({ "expected": expected, "actual": element.value })),
            _ => Envelope::success(BACKEND, json!({ "matched": true, "element": element })),
        }
    }
}

fn chain_envelope<T: Tier + Serialize>(
    outcome: ChainOutcome<T>,
    exhausted: ErrorCode,
    label: &str,
    target: String,
) -> Envelope {
    match outcome {
        ChainOutcome::Completed {
            tier,
            data,
            rejected,
        } => {
            let mut payload = json!({ "method": tier.method(), "tier": tier, "target": target });
            if let (Some(payload), Value::Object(extra)) = (payload.as_object_mut(), data) {
                payload.extend(extra);
            }
            Envelope::success(BACKEND, payload).with_warnings(fallback_warnings(&rejected))
        }
        ChainOutcome::Failed {
            error, rejected, ..
        } => Envelope::failure(BACKEND, error).with_warnings(fallback_warnings(&rejected)),
        ChainOutcome::Exhausted { rejected } => {
            let reasons = rejected
                .iter()
                .map(|r| format!("{}: {}", r.tier.method(), r.reason))
                .collect::<Vec<_>>()
                .join("; ");
            let attempts: Vec<Value> = rejected
                .iter()
                .map(|r| json!({ "method": r.tier.method(), "reason": r.reason }))
                .collect();
            Envelope::failure(
                BACKEND,
                ErrorEntry::new(
                    exhausted,
                    format!("Every {} strategy failed for {}: {}", label, target, reasons),
                ),
            )
            .with_data(json!({ "target": target, "attempts": attempts }))
        }
    }
}
