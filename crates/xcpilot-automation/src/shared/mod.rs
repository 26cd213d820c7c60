//! Device and session level capabilities that behave the same whichever UI
//! backend was chosen: screenshots, video and log capture, crash reports and
//! report export.

pub mod capture;
pub mod crash;
pub mod report;

use crate::action::{Action, Backend};
use crate::config::AutomationConfig;
use crate::context::ExecutionContext;
use crate::envelope::{Envelope, ErrorEntry};
use crate::error_codes::ErrorCode;
use crate::process::{ProcessRequest, ProcessRunner};
use capture::{CaptureKind, CaptureSession};
use report::TestReport;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// `simctl` alias for the currently booted simulator.
pub const BOOTED_DEVICE: &str = "booted";

pub struct SharedStrategy {
    processes: Arc<dyn ProcessRunner>,
    config: Arc<AutomationConfig>,
}

impl SharedStrategy {
    pub fn new(processes: Arc<dyn ProcessRunner>, config: Arc<AutomationConfig>) -> Self {
        Self { processes, config }
    }

    pub async fn execute(&self, ctx: &ExecutionContext, backend: Backend) -> Envelope {
        match ctx.action {
            Action::Screenshot => self.screenshot(ctx, backend).await,
            Action::VideoStart => self.start_capture(ctx, backend, CaptureKind::Video).await,
            Action::LogsStart => self.start_capture(ctx, backend, CaptureKind::Logs).await,
            Action::VideoStop => self.stop_capture(ctx, backend, CaptureKind::Video).await,
            Action::LogsStop => self.stop_capture(ctx, backend, CaptureKind::Logs).await,
            Action::CrashList => self.crash_list(ctx, backend).await,
            Action::CrashExport => self.crash_export(ctx, backend).await,
            Action::ExportReport => self.export_report(ctx, backend).await,
            Action::DescribeUi
            | Action::Tap
            | Action::Type
            | Action::ClearText
            | Action::Swipe
            | Action::Scroll
            | Action::QueryText
            | Action::QueryControls
            | Action::WaitFor
            | Action::Assert => Envelope::failure(
                backend,
                ErrorEntry::new(
                    ErrorCode::UNSUPPORTED_ACTION,
                    format!("{} is not a shared capability", ctx.action),
                ),
            ),
        }
    }

    /// Target device, defaulting to the booted simulator.
    fn device<'a>(&self, ctx: &'a ExecutionContext, warnings: &mut Vec<String>) -> &'a str {
        match ctx.device() {
            Some(device) => device,
            None => {
                warnings.push(format!(
                    "No deviceId given; using the '{}' simulator",
                    BOOTED_DEVICE
                ));
                BOOTED_DEVICE
            }
        }
    }

    fn output_path(&self, ctx: &ExecutionContext, kind: &str, extension: &str) -> PathBuf {
        ctx.param_str("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.config.artifact_path(kind, extension))
    }

    async fn screenshot(&self, ctx: &ExecutionContext, backend: Backend) -> Envelope {
        let mut warnings = Vec::new();
        let device = self.device(ctx, &mut warnings);
        let path = self.output_path(ctx, "screenshot", "png");
        if let Err(e) = ensure_parent(&path).await {
            return Envelope::from_error(backend, e.into()).with_warnings(warnings);
        }

        let path_text = path.display().to_string();
        let request = ProcessRequest::new(&self.config.tools.xcrun).args([
            "simctl",
            "io",
            device,
            "screenshot",
            path_text.as_str(),
        ]);

        let envelope = match self.processes.run(request, &ctx.cancel).await {
            Ok(output) if output.success() => {
                Envelope::success(backend, json!({ "path": path_text, "deviceId": device }))
                    .with_artifact("screenshot", path_text)
            }
            Ok(output) => Envelope::failure(
                backend,
                ErrorEntry::new(
                    ErrorCode::CAPTURE_FAILED,
                    format!("simctl screenshot failed: {}", output.stderr.trim()),
                )
                .with_hint("Make sure the simulator is booted."),
            ),
            Err(e) => Envelope::from_error(backend, e),
        };
        envelope.with_warnings(warnings)
    }

    async fn start_capture(
        &self,
        ctx: &ExecutionContext,
        backend: Backend,
        kind: CaptureKind,
    ) -> Envelope {
        let mut warnings = Vec::new();
        let device = self.device(ctx, &mut warnings).to_string();
        let (artifact, extension) = kind.artifact();
        let path = self.output_path(ctx, artifact, extension);
        if let Err(e) = ensure_parent(&path).await {
            return Envelope::from_error(backend, e.into()).with_warnings(warnings);
        }
        let path_text = path.display().to_string();

        let request = match kind {
            CaptureKind::Video => ProcessRequest::new(&self.config.tools.xcrun).args([
                "simctl",
                "io",
                device.as_str(),
                "recordVideo",
                "--force",
                path_text.as_str(),
            ]),
            CaptureKind::Logs => {
                let mut request = ProcessRequest::new(&self.config.tools.xcrun)
                    .args(["simctl", "spawn", device.as_str(), "log", "stream", "--style", "compact"]);
                if let Some(predicate) =
                    capture::log_predicate(ctx.param_str("predicate"), ctx.param_str("processName"))
                {
                    request = request.arg("--predicate").arg(predicate);
                }
                request.stdout_to(&path)
            }
        };

        match self.processes.spawn_detached(request).await {
            Ok(pid) => {
                let session = CaptureSession {
                    kind,
                    pid,
                    path: Some(path_text.clone()),
                };
                tracing::info!(kind = kind.as_str(), pid, path = %path_text, "Capture started");
                Envelope::success(backend, session.to_data())
                    .with_artifact(kind.as_str(), path_text)
                    .with_warnings(warnings)
            }
            Err(e) => {
                tracing::warn!(kind = kind.as_str(), error = %e, "Capture failed to start");
                Envelope::failure(
                    backend,
                    ErrorEntry::new(
                        ErrorCode::CAPTURE_FAILED,
                        format!("Could not start {} capture: {}", kind.as_str(), e),
                    ),
                )
                .with_warnings(warnings)
            }
        }
    }

    async fn stop_capture(
        &self,
        ctx: &ExecutionContext,
        backend: Backend,
        kind: CaptureKind,
    ) -> Envelope {
        let Some(session) = CaptureSession::from_params(kind, &ctx.params) else {
            return Envelope::failure(
                backend,
                ErrorEntry::new(
                    ErrorCode::MISSING_PID,
                    format!("{}_stop requires the pid returned by {}_start", kind.as_str(), kind.as_str()),
                )
                .with_hint("Pass params.pid from the start result."),
            );
        };

        let request = ProcessRequest::new(&self.config.tools.kill)
            .args(["-INT".to_string(), session.pid.to_string()]);

        match self.processes.run(request, &ctx.cancel).await {
            Ok(output) if output.success() => {
                tracing::info!(kind = kind.as_str(), pid = session.pid, "Capture stopped");
                let mut data = session.to_data();
                data["stopped"] = json!(true);
                let envelope = Envelope::success(backend, data);
                match session.path {
                    Some(path) => envelope.with_artifact(kind.as_str(), path),
                    None => envelope,
                }
            }
            Ok(output) => Envelope::failure(
                backend,
                ErrorEntry::new(
                    ErrorCode::PROCESS_FAILED,
                    format!(
                        "Could not signal capture process {}: {}",
                        session.pid,
                        output.stderr.trim()
                    ),
                ),
            ),
            Err(e) => Envelope::from_error(backend, e),
        }
    }

    async fn crash_list(&self, ctx: &ExecutionContext, backend: Backend) -> Envelope {
        let dir = self.config.crash_report_dir();
        let is_dir = tokio::fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir {
            return Envelope::success(backend, json!({ "directory": dir.display().to_string(), "reports": [] }))
                .with_warning(format!("Crash report directory {} does not exist", dir.display()));
        }

        let filter = ctx.param_str("filter").map(str::to_string);
        match crash::scan_crash_reports(dir.clone(), filter).await {
            Ok(reports) => Envelope::success(
                backend,
                json!({
                    "directory": dir.display().to_string(),
                    "count": reports.len(),
                    "reports": reports,
                }),
            ),
            Err(e) => Envelope::from_error(backend, e),
        }
    }

    async fn crash_export(&self, ctx: &ExecutionContext, backend: Backend) -> Envelope {
        let Some(reference) = ctx.param_str("path").or_else(|| ctx.param_str("source")) else {
            return Envelope::failure(
                backend,
                ErrorEntry::new(ErrorCode::MISSING_PARAMS, "crash_export requires 'path'")
                    .with_hint("Use a name or path from crash_list."),
            );
        };

        let source = crash::resolve_crash_path(reference, &self.config.crash_report_dir());
        if !source.is_file() {
            return Envelope::failure(
                backend,
                ErrorEntry::new(
                    ErrorCode::CRASH_NOT_FOUND,
                    format!("No crash report at {}", source.display()),
                ),
            );
        }

        let destination = match ctx.param_str("destination") {
            Some(destination) => PathBuf::from(destination),
            None => {
                let name = source.file_name().map(PathBuf::from).unwrap_or_default();
                self.config.artifact_dir().join("crashes").join(name)
            }
        };

        let copied = async {
            ensure_parent(&destination).await?;
            tokio::fs::copy(&source, &destination).await
        };
        match copied.await {
            Ok(bytes) => {
                let destination = destination.display().to_string();
                Envelope::success(
                    backend,
                    json!({
                        "source": source.display().to_string(),
                        "destination": destination,
                        "bytes": bytes,
                    }),
                )
                .with_artifact("crash", destination)
            }
            Err(e) => Envelope::from_error(backend, e.into()),
        }
    }

    async fn export_report(&self, ctx: &ExecutionContext, backend: Backend) -> Envelope {
        let report = match TestReport::from_params(&ctx.params) {
            Ok(report) => report,
            Err(e) => return Envelope::from_error(backend, e),
        };
        let path = self.output_path(ctx, "report", "json");

        match report.write_to(&path).await {
            Ok(()) => {
                let path = path.display().to_string();
                tracing::info!(%path, "Report exported");
                Envelope::success(
                    backend,
                    json!({
                        "path": path,
                        "generatedAt": report.generated_at,
                        "stepCount": report.steps.len(),
                    }),
                )
                .with_artifact("report", path)
            }
            Err(e) => Envelope::from_error(backend, e),
        }
    }
}

async fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}
