use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Automation verbs a caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Tap,
    Type,
    ClearText,
    Swipe,
    Scroll,
    DescribeUi,
    QueryText,
    QueryControls,
    WaitFor,
    Assert,
    Screenshot,
    VideoStart,
    VideoStop,
    LogsStart,
    LogsStop,
    CrashList,
    CrashExport,
    ExportReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionCategory {
    Interaction,
    Query,
    Synchronization,
    Capture,
}

impl Action {
    pub const ALL: [Action; 18] = [
        Action::Tap,
        Action::Type,
        Action::ClearText,
        Action::Swipe,
        Action::Scroll,
        Action::DescribeUi,
        Action::QueryText,
        Action::QueryControls,
        Action::WaitFor,
        Action::Assert,
        Action::Screenshot,
        Action::VideoStart,
        Action::VideoStop,
        Action::LogsStart,
        Action::LogsStop,
        Action::CrashList,
        Action::CrashExport,
        Action::ExportReport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Tap => "tap",
            Action::Type => "type",
            Action::ClearText => "clear_text",
            Action::Swipe => "swipe",
            Action::Scroll => "scroll",
            Action::DescribeUi => "describe_ui",
            Action::QueryText => "query_text",
            Action::QueryControls => "query_controls",
            Action::WaitFor => "wait_for",
            Action::Assert => "assert",
            Action::Screenshot => "screenshot",
            Action::VideoStart => "video_start",
            Action::VideoStop => "video_stop",
            Action::LogsStart => "logs_start",
            Action::LogsStop => "logs_stop",
            Action::CrashList => "crash_list",
            Action::CrashExport => "crash_export",
            Action::ExportReport => "export_report",
        }
    }

    pub fn category(&self) -> ActionCategory {
        match self {
            Action::Tap | Action::Type | Action::ClearText | Action::Swipe | Action::Scroll => {
                ActionCategory::Interaction
            }
            Action::DescribeUi | Action::QueryText | Action::QueryControls => ActionCategory::Query,
            Action::WaitFor | Action::Assert => ActionCategory::Synchronization,
            Action::Screenshot
            | Action::VideoStart
            | Action::VideoStop
            | Action::LogsStart
            | Action::LogsStop
            | Action::CrashList
            | Action::CrashExport
            | Action::ExportReport => ActionCategory::Capture,
        }
    }

    /// Device/session-level actions that do not touch the UI tree.
    pub fn is_shared_capability(&self) -> bool {
        self.category() == ActionCategory::Capture
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .find(|action| action.as_str() == s.trim())
            .copied()
            .ok_or_else(|| format!("Unknown action '{}'", s))
    }
}

/// Execution strategies for UI automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Runner-driven on-device XCUITest harness.
    Xcuitest,
    /// Runner-driven harness that additionally needs the idb daemon CLI.
    Idb,
    /// macOS accessibility API through the accessibility query tool.
    MacosAx,
}

impl Backend {
    pub const ALL: [Backend; 3] = [Backend::Xcuitest, Backend::Idb, Backend::MacosAx];

    /// Backend used when the caller leaves the choice unset or asks for `auto`.
    pub const DEFAULT: Backend = Backend::Xcuitest;

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Xcuitest => "xcuitest",
            Backend::Idb => "idb",
            Backend::MacosAx => "macos_ax",
        }
    }

    /// Parse a caller-supplied backend name. `None`, empty and `auto` mean
    /// "let the dispatcher decide" and map to `Ok(None)`.
    pub fn parse_choice(value: Option<&str>) -> Result<Option<Backend>, String> {
        match value.map(str::trim) {
            None | Some("") | Some("auto") => Ok(None),
            Some(name) => name.parse().map(Some),
        }
    }

    pub fn resolve(choice: Option<Backend>) -> Backend {
        choice.unwrap_or(Self::DEFAULT)
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Backend::MacosAx)
    }

    /// Whether the backend needs the idb CLI on the host before the runner is invoked.
    pub fn requires_idb(&self) -> bool {
        matches!(self, Backend::Idb)
    }

    pub fn supports(&self, action: Action) -> bool {
        match self {
            Backend::Xcuitest => true,
            Backend::Idb => !matches!(
                action,
                Action::ClearText | Action::Scroll | Action::QueryControls
            ),
            Backend::MacosAx => matches!(
                action,
                Action::DescribeUi
                    | Action::Tap
                    | Action::Type
                    | Action::ClearText
                    | Action::QueryText
                    | Action::WaitFor
                    | Action::Assert
                    | Action::Screenshot
            ),
        }
    }

    pub fn supported_actions(&self) -> Vec<Action> {
        Action::ALL
            .iter()
            .copied()
            .filter(|action| self.supports(*action))
            .collect()
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xcuitest" => Ok(Backend::Xcuitest),
            "idb" => Ok(Backend::Idb),
            "macos_ax" | "native" | "ax" => Ok(Backend::MacosAx),
            other => Err(format!("Unknown backend '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trips_through_name() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert!("record".parse::<Action>().is_err());
    }

    #[test]
    fn test_auto_resolves_to_default() {
        assert_eq!(Backend::parse_choice(Some("auto")).unwrap(), None);
        assert_eq!(Backend::parse_choice(None).unwrap(), None);
        assert_eq!(Backend::resolve(None), Backend::Xcuitest);
        assert_eq!(
            Backend::parse_choice(Some("native")).unwrap(),
            Some(Backend::MacosAx)
        );
        assert!(Backend::parse_choice(Some("appium")).is_err());
    }

    #[test]
    fn test_support_table() {
        assert!(Backend::Xcuitest.supports(Action::VideoStart));
        assert!(Backend::Idb.supports(Action::Tap));
        assert!(!Backend::Idb.supports(Action::QueryControls));
        assert!(Backend::MacosAx.supports(Action::Screenshot));
        assert!(!Backend::MacosAx.supports(Action::VideoStart));
        assert!(!Backend::MacosAx.supports(Action::Swipe));
        assert_eq!(Backend::MacosAx.supported_actions().len(), 8);
    }

    #[test]
    fn test_shared_capabilities() {
        assert!(Action::CrashList.is_shared_capability());
        assert!(Action::ExportReport.is_shared_capability());
        assert!(!Action::WaitFor.is_shared_capability());
    }
}
