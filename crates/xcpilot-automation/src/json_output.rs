//! Extraction of a single JSON object from the stdout of an external tool.
//!
//! External runners often print progress or diagnostics before their result.
//! The whole trimmed output is tried first; failing that, non-empty lines are
//! scanned from the end for the last `{...}` line that parses.

use serde_json::{Map, Value};

pub fn extract_json_object(stdout: &str) -> Option<Map<String, Value>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(trimmed) {
        return Some(object);
    }

    trimmed
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.starts_with('{') && line.ends_with('}'))
        .find_map(|line| match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(object)) => Some(object),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_output_is_parsed() {
        let object = extract_json_object("  {\"ok\": true,\n \"data\": {}}  ").unwrap();
        assert_eq!(object["ok"], Value::Bool(true));
    }

    #[test]
    fn test_trailing_line_after_logs() {
        let object = extract_json_object("INFO: starting\n{\"ok\":true,\"data\":{}}\n").unwrap();
        assert_eq!(object["ok"], Value::Bool(true));
    }

    #[test]
    fn test_last_valid_line_wins() {
        let stdout = "{\"ok\":false}\nnoise\n{\"ok\":true}\n{not json}\n";
        let object = extract_json_object(stdout).unwrap();
        assert_eq!(object["ok"], Value::Bool(true));
    }

    #[test]
    fn test_no_object_line() {
        assert!(extract_json_object("Build succeeded\nall done\n").is_none());
        assert!(extract_json_object("").is_none());
        assert!(extract_json_object("[1, 2, 3]").is_none());
    }
}
