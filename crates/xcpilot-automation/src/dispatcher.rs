use crate::action::{Action, Backend};
use crate::config::AutomationConfig;
use crate::context::ExecutionContext;
use crate::envelope::{Envelope, ErrorEntry};
use crate::error_codes::ErrorCode;
use crate::native::NativeStrategy;
use crate::process::ProcessRunner;
use crate::runner::RunnerStrategy;
use crate::shared::SharedStrategy;
use std::sync::Arc;
use tracing::Instrument;

/// Where a validated call is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Native,
    Shared,
    Runner,
}

/// Pure routing decision for a supported pairing.
pub fn route(backend: Backend, action: Action) -> Route {
    if backend.is_native() {
        Route::Native
    } else if action.is_shared_capability() {
        Route::Shared
    } else {
        Route::Runner
    }
}

pub struct Dispatcher {
    runner: RunnerStrategy,
    native: NativeStrategy,
    shared: SharedStrategy,
}

impl Dispatcher {
    pub fn new(processes: Arc<dyn ProcessRunner>, config: Arc<AutomationConfig>) -> Self {
        Self {
            runner: RunnerStrategy::new(processes.clone(), config.clone()),
            native: NativeStrategy::new(processes.clone(), config.clone()),
            shared: SharedStrategy::new(processes, config),
        }
    }

    /// Support check. Never touches a process.
    pub fn supports(backend: Backend, action: Action) -> bool {
        backend.supports(action)
    }

    pub async fn execute(&self, ctx: &ExecutionContext) -> Envelope {
        let backend = ctx.resolved_backend();
        let span = tracing::info_span!("dispatch", action = %ctx.action, backend = %backend);

        async move {
            if !Self::supports(backend, ctx.action) {
                tracing::warn!("Unsupported backend/action pairing");
                return Envelope::failure(
                    backend,
                    ErrorEntry::new(
                        ErrorCode::UNSUPPORTED_ACTION,
                        format!("{} is not supported by the {} backend", ctx.action, backend),
                    )
                    .with_hint(format!(
                        "Supported actions: {}",
                        backend
                            .supported_actions()
                            .iter()
                            .map(Action::as_str)
                            .collect::<Vec<_>>()
                            .join(", ")
                    )),
                );
            }

            let route = route(backend, ctx.action);
            tracing::debug!(?route, "Routing call");

            let envelope = match route {
                Route::Native => self.native.execute(ctx).await,
                Route::Shared => self.shared.execute(ctx, backend).await,
                Route::Runner => self.runner.execute(ctx, backend).await,
            };
            let envelope = envelope.normalized();

            if envelope.ok {
                tracing::info!(warnings = envelope.warnings.len(), "Call succeeded");
            } else {
                tracing::info!(code = ?envelope.first_error_code(), "Call failed");
            }
            envelope
        }
        .instrument(span)
        .await
    }
}
