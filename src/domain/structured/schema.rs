//! Expected-field descriptions handed to the parser

use serde_json::Value;

use super::record::{FieldValue, StructuredRecord};

/// Summary text placed in a fallback record
pub const FALLBACK_TEXT: &str = "Unable to extract a structured answer";

/// Neutral score placed in a fallback record
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Kind of an expected field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    List,
}

/// One expected field and its fallback value
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    default: FieldValue,
}

impl FieldSpec {
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text,
            default: FieldValue::Text(FALLBACK_TEXT.to_string()),
        }
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Number,
            default: FieldValue::Number(NEUTRAL_SCORE),
        }
    }

    pub fn list(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::List,
            default: FieldValue::List(Vec::new()),
        }
    }

    pub fn with_default(mut self, default: FieldValue) -> Self {
        self.default = default;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn default_value(&self) -> &FieldValue {
        &self.default
    }

    /// Coerce a JSON value into this field's kind
    pub fn coerce(&self, value: &Value) -> Option<FieldValue> {
        match self.kind {
            FieldKind::Text => coerce_text(value).map(FieldValue::Text),
            FieldKind::Number => coerce_number(value).map(FieldValue::Number),
            FieldKind::List => coerce_list(value).map(FieldValue::List),
        }
    }
}

/// Ordered set of expected fields
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSchema {
    fields: Vec<FieldSpec>,
}

impl RecordSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Deterministic record used when nothing could be extracted
    pub fn default_record(&self) -> StructuredRecord {
        let mut record = StructuredRecord::new();
        for field in &self.fields {
            record.insert(field.name.clone(), field.default.clone());
        }
        record
    }

    /// Build a record from a parsed JSON object, keeping only recognised fields
    pub fn record_from_object(&self, object: &serde_json::Map<String, Value>) -> StructuredRecord {
        let mut record = StructuredRecord::new();

        for field in &self.fields {
            let value = object.get(&field.name).or_else(|| {
                object
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(&field.name))
                    .map(|(_, value)| value)
            });

            if let Some(coerced) = value.and_then(|v| field.coerce(v)) {
                record.insert(field.name.clone(), coerced);
            }
        }

        record
    }

    /// JSON skeleton describing the expected answer, for prompts
    pub fn json_template(&self) -> String {
        let mut object = serde_json::Map::new();
        for field in &self.fields {
            let example = match field.kind {
                FieldKind::Text => Value::String("string".into()),
                FieldKind::Number => Value::String("number".into()),
                FieldKind::List => Value::Array(vec![Value::String("string".into())]),
            };
            object.insert(field.name.clone(), example);
        }
        serde_json::to_string_pretty(&Value::Object(object)).unwrap_or_default()
    }
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(coerce_text).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        Value::Object(_) => Some(value.to_string()),
        Value::Null => None,
    }
}

/// Leading numeric literal of a string such as "72", "72.5/100" or "score: 80"
pub(crate) fn leading_number(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit() || c == '-')?;
    let rest = &text[start..];
    let end = rest
        .char_indices()
        .skip(1)
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(rest.len());

    rest[..end]
        .trim_end_matches('.')
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|n| n.is_finite()),
        Value::String(s) => leading_number(s),
        _ => None,
    }
}

fn coerce_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(coerce_text)
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        Value::String(s) if s.trim().is_empty() => Some(Vec::new()),
        Value::String(s) => Some(vec![s.trim().to_string()]),
        Value::Null => None,
        other => coerce_text(other).map(|s| vec![s]),
    }
}
