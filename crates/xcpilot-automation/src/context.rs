use crate::action::{Action, Backend};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Everything one automation call needs. Owned by the call that built it.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub action: Action,
    /// `None` means auto; the dispatcher substitutes [`Backend::DEFAULT`].
    pub backend: Option<Backend>,
    pub device_id: Option<String>,
    /// Application name or bundle identifier (native backend).
    pub application: Option<String>,
    pub runner_command: Option<String>,
    pub params: Map<String, Value>,
    pub cancel: CancellationToken,
}

impl ExecutionContext {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            backend: None,
            device_id: None,
            application: None,
            runner_command: None,
            params: Map::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = Some(application.into());
        self
    }

    pub fn with_runner_command(mut self, command: impl Into<String>) -> Self {
        self.runner_command = Some(command.into());
        self
    }

    /// Replace the parameter bag. Non-object values leave it empty.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn resolved_backend(&self) -> Backend {
        Backend::resolve(self.backend)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        match self.params.get(key)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Device identity with blank strings treated as absent.
    pub fn device(&self) -> Option<&str> {
        self.device_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn app(&self) -> Option<&str> {
        self.application
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}
