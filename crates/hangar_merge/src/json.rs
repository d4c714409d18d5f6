//! Lenient parsing of game JSON and the replace-arrays deep merge.
//!
//! Game data files are often hand-edited: they carry `//` and `/* */`
//! comments and sometimes miss the comma between two values on separate
//! lines. [`parse_game_json`] tries a strict parse first and only falls back
//! to cleaning the text when that fails.

use crate::error::{kind_name, Error, Result};
use camino::Utf8Path;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static MISSING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\]|\}|"|[A-Za-z0-9])\s*\n\s*(\[|\{|")"#).unwrap());

/// Parses a game JSON document, tolerating comments and missing commas.
///
/// The root must be an object.
pub fn parse_game_json(content: &str) -> Result<Value> {
    let value = match serde_json::from_str::<Value>(content) {
        Ok(value) => value,
        Err(strict_err) => {
            let stripped = strip_comments(content);
            let fixed = fix_missing_commas(&stripped);
            tracing::trace!("strict parse failed ({strict_err}), retrying with cleaned content");
            serde_json::from_str::<Value>(&fixed)?
        }
    };

    if !value.is_object() {
        return Err(Error::NotAnObject(kind_name(&value)));
    }
    Ok(value)
}

pub fn parse_game_json_file(path: &Utf8Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    parse_game_json(&content)
}

/// Serializes a document the way merged outputs are written: two-space indent.
pub fn to_indented_string(value: &Value) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Removes `//` line comments and `/* */` block comments outside strings.
///
/// Line comments keep their terminating newline so line structure survives.
pub fn strip_comments(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Inserts a comma between a value end and a value start on the next line.
pub fn fix_missing_commas(content: &str) -> String {
    MISSING_COMMA.replace_all(content, "$1,\n$2").into_owned()
}

/// Deep-merges `incoming` into `target`.
///
/// - objects merge key by key, recursively
/// - an array replaces an existing array wholesale
/// - a value of a different kind replaces the existing one
/// - `null` never overwrites an existing key, but is added for a new key
pub fn merge_replace_arrays(target: &mut Value, incoming: Value) {
    match (target, incoming) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    None => {
                        existing.insert(key, value);
                    }
                    Some(slot) => merge_property(slot, value),
                }
            }
        }
        (Value::Array(existing), Value::Array(incoming)) => {
            *existing = incoming;
        }
        (target, incoming) => {
            if !incoming.is_null() {
                *target = incoming;
            }
        }
    }
}

fn merge_property(slot: &mut Value, value: Value) {
    let same_container = matches!(
        (&*slot, &value),
        (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_))
    );
    if same_container {
        merge_replace_arrays(slot, value);
    } else if !value.is_null() {
        *slot = value;
    }
}
