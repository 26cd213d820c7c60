use crate::{AutomationError, Result};
use serde::Serialize;
use serde_json::{Map, Value, json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorField {
    Identifier,
    Title,
    Label,
    Role,
    Description,
    Placeholder,
    Value,
}

impl LocatorField {
    pub const ALL: [LocatorField; 7] = [
        LocatorField::Identifier,
        LocatorField::Title,
        LocatorField::Label,
        LocatorField::Role,
        LocatorField::Description,
        LocatorField::Placeholder,
        LocatorField::Value,
    ];

    pub fn param_name(&self) -> &'static str {
        match self {
            LocatorField::Identifier => "identifier",
            LocatorField::Title => "title",
            LocatorField::Label => "label",
            LocatorField::Role => "role",
            LocatorField::Description => "description",
            LocatorField::Placeholder => "placeholder",
            LocatorField::Value => "value",
        }
    }

    /// macOS accessibility attribute matched for this field. Accessibility
    /// labels surface as `AXDescription` on macOS.
    pub fn ax_attribute(&self) -> &'static str {
        match self {
            LocatorField::Identifier => "AXIdentifier",
            LocatorField::Title => "AXTitle",
            LocatorField::Label => "AXDescription",
            LocatorField::Role => "AXRole",
            LocatorField::Description => "AXDescription",
            LocatorField::Placeholder => "AXPlaceholderValue",
            LocatorField::Value => "AXValue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Exact,
    Contains,
}

impl MatchMode {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exact" | "equals" => Ok(MatchMode::Exact),
            "contains" => Ok(MatchMode::Contains),
            other => Err(AutomationError::InvalidParams(format!(
                "Unknown match mode '{}', expected 'exact' or 'contains'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Criterion {
    pub field: LocatorField,
    pub value: String,
    pub mode: MatchMode,
}

/// A conjunction of match criteria describing one UI element.
///
/// Built per call from caller parameters, either from a nested `locator`
/// object or from top-level keys (`identifier`, `title`, ...). Each criterion
/// is a plain string or `{ "value": ..., "match": "exact" | "contains" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Locator {
    criteria: Vec<Criterion>,
}

impl Locator {
    pub fn new(criteria: Vec<Criterion>) -> Option<Self> {
        if criteria.is_empty() {
            None
        } else {
            Some(Self { criteria })
        }
    }

    pub fn identifier(value: impl Into<String>) -> Self {
        Self {
            criteria: vec![Criterion {
                field: LocatorField::Identifier,
                value: value.into(),
                mode: MatchMode::Exact,
            }],
        }
    }

    /// Returns `Ok(None)` when no criterion was supplied.
    pub fn from_params(params: &Map<String, Value>) -> Result<Option<Self>> {
        let source = match params.get("locator") {
            Some(Value::Object(object)) => object,
            _ => params,
        };

        let default_mode = match source
            .get("match")
            .or_else(|| params.get("matchMode"))
            .and_then(Value::as_str)
        {
            Some(mode) => MatchMode::parse(mode)?,
            None => MatchMode::Exact,
        };

        let mut criteria = Vec::new();
        for field in LocatorField::ALL {
            let Some(raw) = source.get(field.param_name()) else {
                continue;
            };
            let (value, mode) = match raw {
                Value::String(s) => (s.clone(), default_mode),
                Value::Object(entry) => {
                    let value = entry
                        .get("value")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    let mode = match entry.get("match").and_then(Value::as_str) {
                        Some(mode) => MatchMode::parse(mode)?,
                        None => default_mode,
                    };
                    (value, mode)
                }
                Value::Null => continue,
                other => (other.to_string(), default_mode),
            };
            if value.is_empty() {
                continue;
            }
            criteria.push(Criterion { field, value, mode });
        }

        Ok(Self::new(criteria))
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn get(&self, field: LocatorField) -> Option<&str> {
        self.criteria
            .iter()
            .find(|c| c.field == field)
            .map(|c| c.value.as_str())
    }

    /// Native attribute-match form understood by the accessibility tool;
    /// every criterion must hold.
    pub fn to_ax_locator(&self) -> Value {
        let criteria: Vec<Value> = self
            .criteria
            .iter()
            .map(|c| {
                json!({
                    "attribute": c.field.ax_attribute(),
                    "value": c.value,
                    "match_type": c.mode,
                })
            })
            .collect();
        json!({ "criteria": criteria, "match_all": true })
    }

    pub fn describe(&self) -> String {
        self.criteria
            .iter()
            .map(|c| match c.mode {
                MatchMode::Exact => format!("{}='{}'", c.field.param_name(), c.value),
                MatchMode::Contains => format!("{}~'{}'", c.field.param_name(), c.value),
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_top_level_criteria() {
        let locator = Locator::from_params(&params(json!({
            "identifier": "save-button",
            "role": "AXButton",
            "text": "ignored"
        })))
        .unwrap()
        .unwrap();
        assert_eq!(locator.criteria().len(), 2);
        assert_eq!(locator.get(LocatorField::Identifier), Some("save-button"));
        assert_eq!(locator.describe(), "identifier='save-button' AND role='AXButton'");
    }

    #[test]
    fn test_nested_locator_with_modes() {
        let locator = Locator::from_params(&params(json!({
            "locator": {
                "title": {"value": "Save", "match": "contains"},
                "placeholder": "Name",
                "match": "exact"
            }
        })))
        .unwrap()
        .unwrap();
        assert_eq!(locator.criteria()[0].mode, MatchMode::Contains);
        assert_eq!(locator.criteria()[1].mode, MatchMode::Exact);
    }

    #[test]
    fn test_no_criteria_is_none() {
        let locator = Locator::from_params(&params(json!({"text": "hello", "identifier": ""})));
        assert!(locator.unwrap().is_none());
    }

    #[test]
    fn test_invalid_match_mode() {
        let result = Locator::from_params(&params(json!({"title": "x", "matchMode": "regex"})));
        assert!(matches!(result, Err(AutomationError::InvalidParams(_))));
    }

    #[test]
    fn test_ax_translation() {
        let locator = Locator::from_params(&params(json!({
            "label": "Close",
            "value": {"value": "draft", "match": "contains"}
        })))
        .unwrap()
        .unwrap();
        assert_eq!(
            locator.to_ax_locator(),
            json!({
                "criteria": [
                    {"attribute": "AXDescription", "value": "Close", "match_type": "exact"},
                    {"attribute": "AXValue", "value": "draft", "match_type": "contains"}
                ],
                "match_all": true
            })
        );
    }
}
