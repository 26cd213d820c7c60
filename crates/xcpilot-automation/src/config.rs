use crate::{AutomationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV: &str = "XCPILOT_CONFIG";

/// Program names (or absolute paths) of the host tools xcpilot drives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolPaths {
    pub xcrun: String,
    pub idb: String,
    /// Accessibility query/act CLI speaking the JSON-over-stdin protocol
    pub ax_tool: String,
    pub osascript: String,
    pub screencapture: String,
    pub kill: String,
    pub shell: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            xcrun: "xcrun".to_string(),
            idb: "idb".to_string(),
            ax_tool: "axorc".to_string(),
            osascript: "osascript".to_string(),
            screencapture: "screencapture".to_string(),
            kill: "kill".to_string(),
            shell: "/bin/sh".to_string(),
        }
    }
}

/// Caller-owned configuration, read-only to the automation core
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutomationConfig {
    /// Scheme name to runner command string
    pub runner_commands: BTreeMap<String, String>,
    pub default_scheme: Option<String>,
    pub tools: ToolPaths,
    /// Where screenshots, recordings, logs and reports are written by default
    pub artifact_dir: Option<PathBuf>,
    pub crash_report_dir: Option<PathBuf>,
    pub runner_timeout_secs: Option<u64>,
}

impl AutomationConfig {
    /// Load configuration from disk. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| {
            AutomationError::Config(format!("Invalid configuration in {}: {}", path.display(), e))
        })
    }

    /// Load from `$XCPILOT_CONFIG`, else `<config_dir>/xcpilot/config.json`.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        dirs::config_dir().map(|dir| dir.join("xcpilot").join("config.json"))
    }

    /// Pick the runner command for a call: explicit override, then the named
    /// scheme, then the default scheme. Blank strings count as absent.
    pub fn resolve_runner_command(
        &self,
        explicit: Option<&str>,
        scheme: Option<&str>,
    ) -> Option<String> {
        let non_blank = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };

        if let Some(command) = explicit.and_then(non_blank) {
            return Some(command);
        }

        scheme
            .or(self.default_scheme.as_deref())
            .and_then(|name| self.runner_commands.get(name))
            .and_then(|command| non_blank(command))
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.artifact_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("xcpilot")
                .join("artifacts")
        })
    }

    /// Timestamped default output path such as
    /// `<artifactDir>/screenshots/screenshot-20250101-120000123.png`.
    pub fn artifact_path(&self, kind: &str, extension: &str) -> PathBuf {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%3f");
        self.artifact_dir()
            .join(format!("{}s", kind))
            .join(format!("{}-{}.{}", kind, stamp, extension))
    }

    pub fn crash_report_dir(&self) -> PathBuf {
        self.crash_report_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_default()
                .join("Library")
                .join("Logs")
                .join("DiagnosticReports")
        })
    }
}
