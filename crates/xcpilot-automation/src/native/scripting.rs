use crate::process::{ProcessRequest, ProcessRunner};
use tokio_util::sync::CancellationToken;

use super::ax_tool::NativeError;

/// Escape text for embedding inside an AppleScript string literal.
pub fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn process_clause(application: &str) -> String {
    if application.contains('.') {
        format!(
            "first application process whose bundle identifier is \"{}\"",
            escape_applescript(application)
        )
    } else {
        format!("application process \"{}\"", escape_applescript(application))
    }
}

/// Bundle identifier lookup for a human-readable application name
pub fn bundle_id_script(name: &str) -> String {
    format!("id of application \"{}\"", escape_applescript(name))
}

/// Find the first element whose `attribute` equals `value` and issue AXPress
/// on it without consulting the element's advertised actions.
pub fn direct_press_script(application: &str, attribute: &str, value: &str) -> String {
    format!(
        r#"tell application "System Events"
    set targetProcess to {process}
    set targetElement to missing value
    repeat with targetWindow in windows of targetProcess
        repeat with candidate in (entire contents of targetWindow)
            try
                if value of attribute "{attribute}" of candidate is "{value}" then
                    set targetElement to contents of candidate
                    exit repeat
                end if
            end try
        end repeat
        if targetElement is not missing value then exit repeat
    end repeat
    if targetElement is missing value then error "Element not found for {attribute}"
    perform action "AXPress" of targetElement
end tell
return "pressed""#,
        process = process_clause(application),
        attribute = escape_applescript(attribute),
        value = escape_applescript(value),
    )
}

pub fn click_script(x: f64, y: f64) -> String {
    format!(
        r#"tell application "System Events"
    click at {{{}, {}}}
end tell"#,
        x.round() as i64,
        y.round() as i64
    )
}

/// Literal keystrokes to the frontmost focused control.
pub fn keystroke_script(text: &str) -> String {
    format!(
        r#"tell application "System Events"
    keystroke "{}"
end tell"#,
        escape_applescript(text)
    )
}

/// Runs AppleScript through `osascript`. Non-zero exit is a rejection
/// carrying stderr.
pub struct HostScripting<'a> {
    processes: &'a dyn ProcessRunner,
    osascript: &'a str,
}

impl<'a> HostScripting<'a> {
    pub fn new(processes: &'a dyn ProcessRunner, osascript: &'a str) -> Self {
        Self {
            processes,
            osascript,
        }
    }

    pub async fn run(&self, script: &str, cancel: &CancellationToken) -> Result<String, NativeError> {
        let output = self
            .processes
            .run(ProcessRequest::new(self.osascript).args(["-e", script]), cancel)
            .await?;

        if output.success() {
            Ok(output.stdout_trimmed().to_string())
        } else {
            let stderr = output.stderr.trim();
            tracing::debug!(%stderr, "AppleScript failed");
            Err(NativeError::Rejected(if stderr.is_empty() {
                format!("osascript exited with status {:?}", output.status)
            } else {
                stderr.to_string()
            }))
        }
    }
}
