use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

/// Attributes requested when describing or asserting on elements.
pub const DESCRIBE_ATTRIBUTES: [&str; 7] = [
    "AXRole",
    "AXTitle",
    "AXIdentifier",
    "AXValue",
    "AXDescription",
    "AXPlaceholderValue",
    "AXEnabled",
];

pub const FRAME_ATTRIBUTES: [&str; 2] = ["AXPosition", "AXSize"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedElement {
    pub role: Option<String>,
    pub title: Option<String>,
    pub identifier: Option<String>,
    pub value: Option<String>,
    pub description: Option<String>,
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Flatten the element list of a `collect_all` reply, descending into
/// `children` where the tool nests them.
pub fn collect_elements(data: &Value) -> Vec<NormalizedElement> {
    let roots: Vec<&Value> = match data {
        Value::Array(items) => items.iter().collect(),
        Value::Object(object) => ["elements", "collected_elements", "children"]
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_array))
            .map(|items| items.iter().collect())
            .unwrap_or_else(|| vec![data]),
        _ => Vec::new(),
    };

    let mut elements = Vec::new();
    for root in roots {
        flatten(root, &mut elements);
    }
    elements
}

fn flatten(raw: &Value, out: &mut Vec<NormalizedElement>) {
    if !raw.is_object() {
        return;
    }
    out.push(normalize_element(raw));
    if let Some(children) = raw.get("children").and_then(Value::as_array) {
        for child in children {
            flatten(child, out);
        }
    }
}

/// Structured attributes win; the free-text brief description only fills gaps.
pub fn normalize_element(raw: &Value) -> NormalizedElement {
    let mut element = NormalizedElement {
        role: attribute_text(raw, &["AXRole", "role"]),
        title: attribute_text(raw, &["AXTitle", "title"]),
        identifier: attribute_text(raw, &["AXIdentifier", "identifier"]),
        value: attribute_text(raw, &["AXValue", "value"]),
        description: attribute_text(raw, &["AXDescription", "description"]),
        placeholder: attribute_text(raw, &["AXPlaceholderValue", "placeholder"]),
        enabled: attribute(raw, &["AXEnabled", "enabled"]).and_then(as_bool),
        text: attribute_text(raw, &["text", "computed_name", "computedName"]),
    };

    if element.role.is_none() || element.title.is_none() || element.identifier.is_none() {
        let brief = attribute_text(raw, &["brief_description", "briefDescription"])
            .map(|text| parse_brief_description(&text))
            .unwrap_or_default();
        element.role = element.role.or(brief.role);
        element.title = element.title.or(brief.title);
        element.identifier = element.identifier.or(brief.identifier);
    }

    element
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BriefDescription {
    pub role: Option<String>,
    pub title: Option<String>,
    pub identifier: Option<String>,
}

static ROLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Role:\s*'?([A-Za-z0-9_]+)'?").expect("valid role pattern"));
static TITLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Title:\s*'([^']*)'").expect("valid title pattern"));
static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bID:\s*'([^']*)'").expect("valid identifier pattern"));

/// Best-effort scrape of `Role: AXButton, Title:'Save', ID:'save-btn'` style text.
pub fn parse_brief_description(text: &str) -> BriefDescription {
    let capture = |pattern: &Regex| {
        pattern
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|s| !s.is_empty())
    };
    BriefDescription {
        role: capture(&ROLE_PATTERN),
        title: capture(&TITLE_PATTERN),
        identifier: capture(&ID_PATTERN),
    }
}

fn attribute_map(raw: &Value) -> Option<&Map<String, Value>> {
    raw.get("attributes").and_then(Value::as_object)
}

/// Look an attribute up in the element's `attributes` map, then on the
/// element itself, unwrapping `{ "value": ... }` wrappers.
pub fn attribute<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let attrs = attribute_map(raw);
    keys.iter()
        .find_map(|key| {
            attrs
                .and_then(|a| a.get(*key))
                .or_else(|| raw.get(*key))
                .filter(|v| !v.is_null())
        })
        .map(|value| match value {
            Value::Object(wrapper) if wrapper.contains_key("value") => &wrapper["value"],
            other => other,
        })
}

pub fn attribute_text(raw: &Value, keys: &[&str]) -> Option<String> {
    attribute(raw, keys).and_then(as_text)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Frame {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

static NUMBER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("valid number pattern"));

/// Frame from `AXPosition` and `AXSize`, accepting `{x, y}` objects,
/// two-element arrays or text such as `x=10 y=20`.
pub fn element_frame(raw: &Value) -> Option<Frame> {
    let (x, y) = pair(attribute(raw, &["AXPosition", "position"])?, ("x", "y"))?;
    let (width, height) = pair(attribute(raw, &["AXSize", "size"])?, ("width", "height"))?;
    Some(Frame {
        x,
        y,
        width,
        height,
    })
}

fn pair(value: &Value, keys: (&str, &str)) -> Option<(f64, f64)> {
    match value {
        Value::Object(object) => Some((
            object.get(keys.0)?.as_f64()?,
            object.get(keys.1)?.as_f64()?,
        )),
        Value::Array(items) if items.len() == 2 => Some((items[0].as_f64()?, items[1].as_f64()?)),
        Value::String(text) => {
            let mut numbers = NUMBER_PATTERN
                .find_iter(text)
                .filter_map(|m| m.as_str().parse::<f64>().ok());
            Some((numbers.next()?, numbers.next()?))
        }
        _ => None,
    }
}
