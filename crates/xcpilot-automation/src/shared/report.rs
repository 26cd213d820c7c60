use crate::{AutomationError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Caller-supplied run summary written by `export_report`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    #[serde(default)]
    pub generated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub verdict: Option<String>,
    #[serde(default)]
    pub steps: Vec<Value>,
    #[serde(default)]
    pub artifacts: Map<String, Value>,
}

impl TestReport {
    pub fn from_params(params: &Map<String, Value>) -> Result<Self> {
        let steps = match params.get("steps") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(steps)) => steps.clone(),
            Some(_) => {
                return Err(AutomationError::InvalidParams("'steps' must be an array".to_string()));
            }
        };
        let artifacts = match params.get("artifacts") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(artifacts)) => artifacts.clone(),
            Some(_) => {
                return Err(AutomationError::InvalidParams(
                    "'artifacts' must be an object".to_string(),
                ));
            }
        };
        let text = |key: &str| {
            params
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Ok(Self {
            generated_at: Utc::now().to_rfc3339(),
            title: text("title"),
            verdict: text("verdict"),
            steps,
            artifacts,
        })
    }

    pub async fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}
