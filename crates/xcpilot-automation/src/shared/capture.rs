use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    Video,
    Logs,
}

impl CaptureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureKind::Video => "video",
            CaptureKind::Logs => "logs",
        }
    }

    pub(crate) fn artifact(&self) -> (&'static str, &'static str) {
        match self {
            CaptureKind::Video => ("video", "mov"),
            CaptureKind::Logs => ("log", "log"),
        }
    }
}

/// Handle for a background capture process. Ownership passes to the caller
/// with the start result; the caller hands the pid back to stop it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureSession {
    pub kind: CaptureKind,
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl CaptureSession {
    /// Rebuild the handle from stop parameters. `None` when no usable pid
    /// was supplied.
    pub fn from_params(kind: CaptureKind, params: &Map<String, Value>) -> Option<Self> {
        let pid = match params.get("pid")? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .filter(|pid| *pid > 0)
        .and_then(|pid| u32::try_from(pid).ok())?;

        let path = params
            .get("path")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        Some(Self { kind, pid, path })
    }

    pub fn to_data(&self) -> Value {
        json!({
            "kind": self.kind,
            "pid": self.pid,
            "path": self.path,
        })
    }
}

/// `log stream` filter: an explicit predicate, a process name, or both.
pub fn log_predicate(predicate: Option<&str>, process_name: Option<&str>) -> Option<String> {
    let process = process_name.map(|name| format!("process == \"{}\"", name.replace('"', "\\\"")));
    match (predicate, process) {
        (Some(predicate), Some(process)) => Some(format!("({}) AND {}", predicate, process)),
        (Some(predicate), None) => Some(predicate.to_string()),
        (None, process) => process,
    }
}
