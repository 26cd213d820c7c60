use crate::action::Backend;
use crate::error_codes::ErrorCode;
use crate::AutomationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One failure reported in an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorEntry {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: Some(code.as_str().to_string()),
            hint: None,
        }
    }

    /// Entry without a code, as produced by bare-string runner errors.
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.code.as_deref() == Some(code.as_str())
    }
}

impl From<AutomationError> for ErrorEntry {
    fn from(error: AutomationError) -> Self {
        match &error {
            AutomationError::Cancelled => ErrorEntry::new(ErrorCode::ABORTED, error.to_string()),
            AutomationError::Timeout { .. } => {
                ErrorEntry::new(ErrorCode::TIMEOUT, error.to_string())
            }
            AutomationError::ToolNotFound { hint, .. } => {
                let hint = hint.clone();
                ErrorEntry::new(ErrorCode::PROCESS_FAILED, error.to_string()).with_hint(hint)
            }
            AutomationError::InvalidParams(_) => {
                ErrorEntry::new(ErrorCode::INVALID_PARAMS, error.to_string())
            }
            AutomationError::Io(_) => ErrorEntry::new(ErrorCode::IO_ERROR, error.to_string()),
            _ => ErrorEntry::new(ErrorCode::PROCESS_FAILED, error.to_string()),
        }
    }
}

/// The uniform outcome of every automation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    pub backend: Backend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorEntry>,
}

impl Envelope {
    pub fn success(backend: Backend, data: Value) -> Self {
        Self {
            ok: true,
            backend,
            data: Some(data),
            artifacts: BTreeMap::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn failure(backend: Backend, error: ErrorEntry) -> Self {
        Self {
            ok: false,
            backend,
            data: None,
            artifacts: BTreeMap::new(),
            warnings: Vec::new(),
            errors: vec![error],
        }
    }

    pub fn from_error(backend: Backend, error: AutomationError) -> Self {
        Self::failure(backend, error.into())
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_artifact(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.artifacts.insert(name.into(), path.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// Repairs an `ok=false` envelope that carries no errors by adding a
    /// generic entry, so consumers can always read `errors[0]`.
    pub fn normalized(mut self) -> Self {
        if !self.ok && self.errors.is_empty() {
            self.errors.push(ErrorEntry::new(
                ErrorCode::RUNNER_ERROR,
                "Operation failed without reporting an error",
            ));
        }
        self
    }

    pub fn first_error_code(&self) -> Option<&str> {
        self.errors.first().and_then(|e| e.code.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_collections_are_omitted() {
        let envelope = Envelope::success(Backend::Xcuitest, json!({"tapped": true}));
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({"ok": true, "backend": "xcuitest", "data": {"tapped": true}})
        );
    }

    #[test]
    fn test_normalized_synthesizes_error() {
        let mut envelope = Envelope::failure(
            Backend::Idb,
            ErrorEntry::new(ErrorCode::TIMEOUT, "too slow"),
        );
        envelope.errors.clear();
        let envelope = envelope.normalized();
        assert_eq!(envelope.errors.len(), 1);
        assert_eq!(envelope.first_error_code(), Some("RUNNER_ERROR"));
    }

    #[test]
    fn test_warnings_do_not_gate_ok() {
        let envelope = Envelope::success(Backend::MacosAx, json!({}))
            .with_warning("fell back to coordinate click");
        assert!(envelope.ok);
        assert_eq!(envelope.warnings.len(), 1);
    }

    #[test]
    fn test_cancelled_maps_to_aborted() {
        let entry: ErrorEntry = AutomationError::Cancelled.into();
        assert!(entry.has_code(ErrorCode::ABORTED));
    }
}
