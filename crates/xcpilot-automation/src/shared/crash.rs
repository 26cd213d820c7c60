use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const CRASH_LIST_LIMIT: usize = 20;
const CRASH_EXTENSIONS: [&str; 2] = ["ips", "crash"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrashReport {
    pub name: String,
    pub path: String,
    pub modified: String,
    #[serde(skip)]
    modified_at: SystemTime,
}

/// Crash reports in `dir`, newest first, at most [`CRASH_LIST_LIMIT`].
/// `filter` is a case-insensitive substring of the file name.
pub fn list_crash_reports(dir: &Path, filter: Option<&str>) -> Result<Vec<CrashReport>> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let filter = filter.map(str::to_lowercase);
    let mut reports = Vec::new();

    for extension in CRASH_EXTENSIONS {
        let pattern = format!("{}/*.{}", escaped, extension);
        let entries = glob::glob(&pattern)
            .map_err(|e| crate::AutomationError::InvalidParams(format!("Bad crash directory: {}", e)))?;

        for path in entries.flatten() {
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            if let Some(filter) = &filter {
                if !name.to_lowercase().contains(filter) {
                    continue;
                }
            }

            let modified_at = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            reports.push(CrashReport {
                name,
                path: path.display().to_string(),
                modified: DateTime::<Utc>::from(modified_at).to_rfc3339(),
                modified_at,
            });
        }
    }

    reports.sort_by(|a, b| b.modified_at.cmp(&a.modified_at).then_with(|| a.name.cmp(&b.name)));
    reports.truncate(CRASH_LIST_LIMIT);
    Ok(reports)
}

/// [`list_crash_reports`] on the blocking pool.
pub async fn scan_crash_reports(dir: PathBuf, filter: Option<String>) -> Result<Vec<CrashReport>> {
    tokio::task::spawn_blocking(move || list_crash_reports(&dir, filter.as_deref()))
        .await
        .map_err(|e| crate::AutomationError::Io(std::io::Error::other(format!("Task join error: {e}"))))?
}

/// Resolve a caller-supplied crash reference: absolute or existing paths are
/// used as-is, bare names are looked up in `crash_dir`.
pub fn resolve_crash_path(reference: &str, crash_dir: &Path) -> PathBuf {
    let path = PathBuf::from(reference);
    if path.is_absolute() || path.exists() {
        path
    } else {
        crash_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, FileTimes};
    use std::time::Duration;

    fn touch(dir: &Path, name: &str, age_secs: u64) {
        let file = File::create(dir.join(name)).unwrap();
        let at = SystemTime::now() - Duration::from_secs(age_secs);
        file.set_times(FileTimes::new().set_modified(at)).unwrap();
    }

    #[test]
    fn test_newest_first_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "MyApp-2025-01-01.ips", 300);
        touch(dir.path(), "MyApp-2025-01-02.crash", 10);
        touch(dir.path(), "Other-2025-01-03.ips", 100);
        touch(dir.path(), "notes.txt", 1);

        let reports = list_crash_reports(dir.path(), None).unwrap();
        let names: Vec<_> = reports.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["MyApp-2025-01-02.crash", "Other-2025-01-03.ips", "MyApp-2025-01-01.ips"]
        );

        let reports = list_crash_reports(dir.path(), Some("myapp")).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(DateTime::parse_from_rfc3339(&reports[0].modified).is_ok());
    }

    #[test]
    fn test_list_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..25 {
            touch(dir.path(), &format!("App-{:02}.ips", i), i);
        }
        let reports = list_crash_reports(dir.path(), None).unwrap();
        assert_eq!(reports.len(), CRASH_LIST_LIMIT);
        assert_eq!(reports[0].name, "App-00.ips");
    }

    #[tokio::test]
    async fn test_async_scan_filters_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "MyApp-1.ips", 1);
        touch(dir.path(), "Other-1.crash", 2);

        let reports = scan_crash_reports(dir.path().to_path_buf(), Some("MYAPP".to_string()))
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].name, "MyApp-1.ips");
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let reports = list_crash_reports(Path::new("/nonexistent/xcpilot/crashes"), None).unwrap();
        assert!(reports.is_empty());
    }

    #[test]
    fn test_resolve_bare_name() {
        let dir = Path::new("/var/reports");
        assert_eq!(
            resolve_crash_path("App.ips", dir),
            PathBuf::from("/var/reports/App.ips")
        );
        assert_eq!(resolve_crash_path("/tmp/App.ips", dir), PathBuf::from("/tmp/App.ips"));
    }
}
