//! Parsing of the text our AppleScript snippets return.
//!
//! Scripts emit records separated by ASCII 30 and fields separated by
//! ASCII 31, each field written as `KEY:value`. A value wrapped in braces is a
//! list. Keys are case-insensitive.
//!
//! For robustness the parser also accepts `|` as the field separator
//! (`ID:x|TITLE:y|TAGS:{a,b}`), a native list of such strings (quoted, or as
//! osascript prints it: `ID:1|TITLE:a, ID:2|TITLE:b`) and AppleScript's own
//! record notation (`{id:"x", name:"y"}` or a list of those).

use std::collections::BTreeMap;

use super::parse_applescript_list;

pub const RECORD_SEPARATOR: char = '\u{1e}';
pub const FIELD_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no KEY:value fields in segment '{0}'")]
    Malformed(String),
    #[error("unbalanced braces in '{0}'")]
    Unbalanced(String),
}

/// One parsed record. Values are kept as raw text; missing fields read as
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.trim().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// Text value, `""` when absent.
    pub fn text(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    /// Non-empty text or `None`. AppleScript's `missing value` counts as empty.
    pub fn optional(&self, key: &str) -> Option<String> {
        let trimmed = self.get(key)?.trim();
        if trimmed.is_empty() || trimmed == "missing value" {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// List value, `[]` when absent. Accepts `{a, b}` or `a, b`.
    pub fn list(&self, key: &str) -> Vec<String> {
        let Some(raw) = self.get(key) else {
            return Vec::new();
        };
        let trimmed = raw.trim();
        if trimmed.starts_with('{') && trimmed.ends_with('}') {
            return parse_applescript_list(trimmed);
        }
        trimmed
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// Parse a single record. Empty input yields an empty record.
pub fn parse_record(text: &str) -> Result<Record, ParseError> {
    let mut records = parse_record_list(text)?;
    match records.len() {
        0 => Ok(Record::default()),
        _ => Ok(records.swap_remove(0)),
    }
}

/// Parse zero or more records. `""` and `{}` yield an empty list; a lone
/// record without separators yields a list of one.
pub fn parse_record_list(text: &str) -> Result<Vec<Record>, ParseError> {
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == RECORD_SEPARATOR);
    if trimmed.is_empty() || trimmed == "{}" {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('{') && !trimmed.contains(FIELD_SEPARATOR) {
        return parse_brace_records(trimmed);
    }

    let mut records = Vec::new();
    for segment in trimmed.split(RECORD_SEPARATOR) {
        if segment.trim().is_empty() {
            continue;
        }
        if segment.contains(FIELD_SEPARATOR) {
            records.push(parse_delimited(segment)?);
        } else {
            for item in split_plain_list(segment)? {
                records.push(parse_delimited(&item)?);
            }
        }
    }
    Ok(records)
}

/// osascript prints a list of strings as `a, b`. A comma starts a new record
/// only when the text after it opens with the segment's leading key.
fn split_plain_list(segment: &str) -> Result<Vec<String>, ParseError> {
    let Some((lead, _)) = segment.trim_start().split_once(':') else {
        return Ok(vec![segment.to_string()]);
    };
    if lead.contains('|') || lead.trim().is_empty() {
        return Ok(vec![segment.to_string()]);
    }
    let marker = format!("{}:", lead.trim().to_ascii_lowercase());

    let mut items: Vec<String> = Vec::new();
    for part in split_outside_braces(segment, ',')? {
        let starts_record = part.trim_start().to_ascii_lowercase().starts_with(&marker);
        match items.last_mut() {
            Some(current) if !starts_record => {
                current.push(',');
                current.push_str(part);
                continue;
            }
            _ => {}
        }
        items.push(part.trim_start().to_string());
    }
    Ok(items)
}

fn parse_delimited(segment: &str) -> Result<Record, ParseError> {
    // Free text (notes, titles) may hold quotes and braces, so the control
    // character separator is split verbatim.
    let fields: Vec<&str> = if segment.contains(FIELD_SEPARATOR) {
        segment.split(FIELD_SEPARATOR).collect()
    } else {
        split_outside_braces(segment, '|')?
    };

    let mut record = Record::default();
    for field in fields {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        record.insert(key, value.trim_matches(|c: char| c == '\r' || c == '\n'));
    }

    if record.is_empty() {
        return Err(ParseError::Malformed(truncate(segment)));
    }
    Ok(record)
}

/// `{id:"x", name:"y"}`, `{{id:"x"}, {id:"y"}}` or `{"ID:x|TITLE:y", ...}`.
fn parse_brace_records(text: &str) -> Result<Vec<Record>, ParseError> {
    let inner = strip_braces(text)?;
    if inner.trim_start().starts_with('"') {
        parse_applescript_list(text)
            .iter()
            .map(|item| parse_delimited(item))
            .collect()
    } else if inner.trim_start().starts_with('{') {
        split_outside_braces(inner, ',')?
            .into_iter()
            .filter(|part| !part.trim().is_empty())
            .map(|part| {
                let part = part.trim();
                strip_braces(part).and_then(parse_brace_fields)
            })
            .collect()
    } else {
        parse_brace_fields(inner).map(|record| vec![record])
    }
}

fn parse_brace_fields(inner: &str) -> Result<Record, ParseError> {
    let mut record = Record::default();
    for part in split_outside_braces(inner, ',')? {
        let Some((key, value)) = part.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.starts_with('{') {
            record.insert(key, value);
        } else {
            record.insert(key, unquote(value));
        }
    }
    if record.is_empty() {
        return Err(ParseError::Malformed(truncate(inner)));
    }
    Ok(record)
}

fn strip_braces(text: &str) -> Result<&str, ParseError> {
    let text = text.trim();
    if text.starts_with('{') && text.ends_with('}') && text.len() >= 2 {
        Ok(&text[1..text.len() - 1])
    } else {
        Err(ParseError::Unbalanced(truncate(text)))
    }
}

/// Split on `separator` while ignoring separators nested in braces or quotes.
fn split_outside_braces(text: &str, separator: char) -> Result<Vec<&str>, ParseError> {
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (idx, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '{' if !in_quotes => depth += 1,
            '}' if !in_quotes => {
                depth -= 1;
                if depth < 0 {
                    return Err(ParseError::Unbalanced(truncate(text)));
                }
            }
            c if c == separator && depth == 0 && !in_quotes => {
                parts.push(&text[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ParseError::Unbalanced(truncate(text)));
    }
    parts.push(&text[start..]);
    Ok(parts)
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        value[1..value.len() - 1]
            .replace("\\\"", "\"")
            .replace("\\\\", "\\")
    } else {
        value.to_string()
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(80).collect()
}
