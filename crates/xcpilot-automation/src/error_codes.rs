use serde::{Serialize, Serializer};

/// Stable, machine-checkable error codes carried in envelope error entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    // Precondition errors
    pub const MISSING_RUNNER: Self = Self("MISSING_RUNNER");
    pub const MISSING_APPLICATION: Self = Self("MISSING_APPLICATION");
    pub const MISSING_PARAMS: Self = Self("MISSING_PARAMS");
    pub const MISSING_PID: Self = Self("MISSING_PID");
    pub const INVALID_PARAMS: Self = Self("INVALID_PARAMS");
    pub const UNKNOWN_ACTION: Self = Self("UNKNOWN_ACTION");
    pub const UNKNOWN_BACKEND: Self = Self("UNKNOWN_BACKEND");
    pub const UNSUPPORTED_ACTION: Self = Self("UNSUPPORTED_ACTION");

    // Tool availability
    pub const IDB_NOT_FOUND: Self = Self("IDB_NOT_FOUND");
    pub const AX_TOOL_NOT_FOUND: Self = Self("AX_TOOL_NOT_FOUND");

    // Protocol errors
    pub const RUNNER_FAILED: Self = Self("RUNNER_FAILED");
    pub const RUNNER_INVALID_JSON: Self = Self("RUNNER_INVALID_JSON");
    pub const RUNNER_INVALID_OUTPUT: Self = Self("RUNNER_INVALID_OUTPUT");
    pub const RUNNER_ERROR: Self = Self("RUNNER_ERROR");
    pub const AX_TOOL_INVALID_OUTPUT: Self = Self("AX_TOOL_INVALID_OUTPUT");

    // Action failures
    pub const ELEMENT_NOT_FOUND: Self = Self("ELEMENT_NOT_FOUND");
    pub const NOT_HITTABLE: Self = Self("NOT_HITTABLE");
    pub const TIMEOUT: Self = Self("TIMEOUT");
    pub const ASSERT_VALUE_MISMATCH: Self = Self("ASSERT_VALUE_MISMATCH");
    pub const ACTION_NOT_SUPPORTED: Self = Self("ACTION_NOT_SUPPORTED");
    pub const ACTION_FAILED: Self = Self("ACTION_FAILED");
    pub const TAP_FALLBACK_EXHAUSTED: Self = Self("TAP_FALLBACK_EXHAUSTED");
    pub const TYPE_FALLBACK_EXHAUSTED: Self = Self("TYPE_FALLBACK_EXHAUSTED");

    // Process and filesystem
    pub const ABORTED: Self = Self("ABORTED");
    pub const PROCESS_FAILED: Self = Self("PROCESS_FAILED");
    pub const CAPTURE_FAILED: Self = Self("CAPTURE_FAILED");
    pub const CRASH_NOT_FOUND: Self = Self("CRASH_NOT_FOUND");
    pub const IO_ERROR: Self = Self("IO_ERROR");
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Get a human-readable description of the error code
    pub fn description(&self) -> &'static str {
        match self.0 {
            "MISSING_RUNNER" => "No runner command is configured for this call",
            "MISSING_APPLICATION" => "An application name or bundle identifier is required",
            "MISSING_PARAMS" => "A required parameter is missing",
            "MISSING_PID" => "A capture process id is required to stop a capture",
            "INVALID_PARAMS" => "Parameters failed validation",
            "UNKNOWN_ACTION" => "The requested action does not exist",
            "UNKNOWN_BACKEND" => "The requested backend does not exist",
            "UNSUPPORTED_ACTION" => "The backend does not support the requested action",
            "IDB_NOT_FOUND" => "The idb CLI is not installed on this host",
            "AX_TOOL_NOT_FOUND" => "The accessibility query tool is not installed on this host",
            "RUNNER_FAILED" => "The runner command failed without producing a JSON result",
            "RUNNER_INVALID_JSON" => "The runner produced JSON without a boolean 'ok' field",
            "RUNNER_INVALID_OUTPUT" => "The runner produced no JSON object",
            "RUNNER_ERROR" => "The runner reported a failure without details",
            "AX_TOOL_INVALID_OUTPUT" => "The accessibility tool produced an unusable reply",
            "ELEMENT_NOT_FOUND" => "No element matched the locator",
            "NOT_HITTABLE" => "The element exists but cannot be interacted with",
            "TIMEOUT" => "The operation timed out",
            "ASSERT_VALUE_MISMATCH" => "The element value differs from the expected value",
            "ACTION_NOT_SUPPORTED" => "The element rejected the requested action",
            "ACTION_FAILED" => "The UI action failed",
            "TAP_FALLBACK_EXHAUSTED" => "Every tap strategy was attempted and failed",
            "TYPE_FALLBACK_EXHAUSTED" => "Every text entry strategy was attempted and failed",
            "ABORTED" => "The call was cancelled",
            "PROCESS_FAILED" => "An external process could not be run",
            "CAPTURE_FAILED" => "A capture process could not be started or stopped",
            "CRASH_NOT_FOUND" => "The crash report does not exist",
            "IO_ERROR" => "A filesystem operation failed",
            _ => "Unknown error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}
