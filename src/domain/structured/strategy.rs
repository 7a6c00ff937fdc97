//! Parse strategies, tried in order by the parser

use std::fmt::Debug;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::record::{FieldValue, StructuredRecord};
use super::schema::{leading_number, FieldKind, FieldSpec, RecordSchema};

/// Which stage of the chain produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStage {
    Direct,
    Corrected,
    FieldExtraction,
    Fallback,
}

impl ParseStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Corrected => "corrected",
            Self::FieldExtraction => "field_extraction",
            Self::Fallback => "fallback",
        }
    }
}

/// One link in the parse fallback chain
pub trait ParseStrategy: Send + Sync + Debug {
    fn stage(&self) -> ParseStage;

    /// Produce a record with at least one expected field, or `None` to defer to the next stage
    fn attempt(&self, raw: &str, schema: &RecordSchema) -> Option<StructuredRecord>;
}

static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());
static SINGLE_QUOTED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([{,]\s*)'([^'\n]*)'(\s*:)").unwrap());
static SINGLE_QUOTED_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([:\[,]\s*)'((?:[^'\\\n]|\\.)*)'(\s*[,}\]])"#).unwrap());
static QUOTED_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)'"#).unwrap());

/// Remove markdown code fences, keeping the fenced body when present
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();

    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };

    let after = &trimmed[start + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];

    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// First balanced `{...}` span, honouring string literals and escapes
pub fn balanced_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut scanner = StringScanner::default();

    for (offset, &byte) in text.as_bytes()[start..].iter().enumerate() {
        if scanner.step(byte) {
            continue;
        }

        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Tracks double-quoted string literals across a byte stream
#[derive(Debug, Default)]
struct StringScanner {
    in_string: bool,
    escaped: bool,
}

impl StringScanner {
    /// Feed one byte; true when it belongs to a string literal, quotes included
    fn step(&mut self, byte: u8) -> bool {
        if self.in_string {
            match byte {
                _ if self.escaped => self.escaped = false,
                b'\\' => self.escaped = true,
                b'"' => self.in_string = false,
                _ => {}
            }
            return true;
        }

        if byte == b'"' {
            self.in_string = true;
            return true;
        }
        false
    }
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Rewrite bare `True`, `False` and `None` tokens; string contents are left alone
fn replace_bare_literals(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut scanner = StringScanner::default();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if scanner.step(bytes[i]) || !bytes[i].is_ascii_alphabetic() {
            i += 1;
            continue;
        }

        let start = i;
        while i < bytes.len() && is_word_byte(bytes[i]) {
            i += 1;
        }
        if start > 0 && is_word_byte(bytes[start - 1]) {
            continue;
        }

        let literal = match &text[start..i] {
            "True" => "true",
            "False" => "false",
            "None" => "null",
            _ => continue,
        };
        out.push_str(&text[copied..start]);
        out.push_str(literal);
        copied = i;
    }

    out.push_str(&text[copied..]);
    out
}

/// Append whatever closers a truncated JSON object is missing
fn close_truncated(text: &str) -> String {
    let mut stack = Vec::new();
    let mut scanner = StringScanner::default();

    for byte in text.bytes() {
        if scanner.step(byte) {
            continue;
        }

        match byte {
            b'{' => stack.push('}'),
            b'[' => stack.push(']'),
            b'}' | b']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut closed = text.trim_end().to_string();
    if scanner.in_string {
        closed.push('"');
    }
    while closed.ends_with(',') {
        closed.pop();
    }
    while let Some(closer) = stack.pop() {
        closed.push(closer);
    }
    closed
}

fn record_from_json(candidate: &str, schema: &RecordSchema) -> Option<StructuredRecord> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    let record = schema.record_from_object(value.as_object()?);
    (!record.is_empty()).then_some(record)
}

/// Stage 1: fenced or bare JSON object, parsed as-is
#[derive(Debug, Default)]
pub struct DirectJsonStrategy;

impl ParseStrategy for DirectJsonStrategy {
    fn stage(&self) -> ParseStage {
        ParseStage::Direct
    }

    fn attempt(&self, raw: &str, schema: &RecordSchema) -> Option<StructuredRecord> {
        let span = balanced_object_span(strip_code_fences(raw))?;
        record_from_json(span, schema)
    }
}

/// Stage 2: JSON after common repairs
#[derive(Debug, Default)]
pub struct CorrectedJsonStrategy;

impl CorrectedJsonStrategy {
    fn correct(candidate: &str) -> String {
        let mut text = candidate
            .replace(['\u{201C}', '\u{201D}', '\u{201E}'], "\"")
            .replace(['\u{2018}', '\u{2019}'], "'");

        if !text.contains('"') {
            text = text.replace('\'', "\"");
        } else {
            text = SINGLE_QUOTED_KEY.replace_all(&text, "$1\"$2\"$3").into_owned();
            text = SINGLE_QUOTED_VALUE
                .replace_all(&text, "$1\"$2\"$3")
                .into_owned();
        }

        text = replace_bare_literals(&text);

        let text = match balanced_object_span(&text) {
            Some(span) => span.to_string(),
            None => close_truncated(&text),
        };

        TRAILING_COMMA.replace_all(&text, "$1").into_owned()
    }
}

impl ParseStrategy for CorrectedJsonStrategy {
    fn stage(&self) -> ParseStage {
        ParseStage::Corrected
    }

    fn attempt(&self, raw: &str, schema: &RecordSchema) -> Option<StructuredRecord> {
        let stripped = strip_code_fences(raw);
        let start = stripped.find('{')?;
        let corrected = Self::correct(&stripped[start..]);
        record_from_json(&corrected, schema)
    }
}

/// Stage 3: pull each expected field out with a pattern, keeping whatever matches
#[derive(Debug, Default)]
pub struct FieldRegexStrategy;

impl FieldRegexStrategy {
    fn key_prefix(name: &str) -> String {
        format!(r#"(?i)["']?{}["']?\s*[:=]\s*"#, regex::escape(name))
    }

    fn extract(field: &FieldSpec, text: &str) -> Option<FieldValue> {
        let prefix = Self::key_prefix(field.name());

        match field.kind() {
            FieldKind::Number => {
                let pattern = Regex::new(&format!(r#"{}["']?(-?\d+(?:\.\d+)?)"#, prefix)).ok()?;
                let captured = pattern.captures(text)?.get(1)?.as_str();
                leading_number(captured).map(FieldValue::Number)
            }
            FieldKind::Text => {
                let pattern = Regex::new(&format!(
                    r#"(?s){}"(.*?)"\s*(?:,\s*["']?[A-Za-z_][A-Za-z0-9_ ]*["']?\s*:|\}}|$)"#,
                    prefix
                ))
                .ok()?;
                let captured = pattern.captures(text)?.get(1)?.as_str();
                let value = unescape(captured);
                (!value.trim().is_empty()).then(|| FieldValue::Text(value.trim().to_string()))
            }
            FieldKind::List => {
                let pattern = Regex::new(&format!(r#"(?s){}\[(.*?)\]"#, prefix)).ok()?;
                let body = pattern.captures(text)?.get(1)?.as_str();
                Some(FieldValue::List(list_items(body)))
            }
        }
    }
}

fn unescape(text: &str) -> String {
    text.replace("\\\"", "\"")
        .replace("\\n", "\n")
        .replace("\\t", "\t")
        .replace("\\\\", "\\")
}

fn list_items(body: &str) -> Vec<String> {
    let quoted: Vec<String> = QUOTED_ITEM
        .captures_iter(body)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| unescape(m.as_str()).trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();

    if !quoted.is_empty() {
        return quoted;
    }

    body.split(',')
        .map(|item| item.trim().trim_matches(['"', '\'']).trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

impl ParseStrategy for FieldRegexStrategy {
    fn stage(&self) -> ParseStage {
        ParseStage::FieldExtraction
    }

    fn attempt(&self, raw: &str, schema: &RecordSchema) -> Option<StructuredRecord> {
        let text = strip_code_fences(raw);
        let mut record = StructuredRecord::new();

        for field in schema.fields() {
            if let Some(value) = Self::extract(field, text) {
                record.insert(field.name().to_string(), value);
            }
        }

        (!record.is_empty()).then_some(record)
    }
}
