//! Typed column values.
//!
//! [`Value`] is what callers bind and what rows decode to. Each non-null
//! variant maps to exactly one [`OriginalFormat`] tag, which is the type name
//! written into the ciphertext header so decryption can restore the type.

use crate::{DatabaseError, DatabaseResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use std::fmt;

/// A value as bound to, or read from, a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Str(String),
    Int(i32),
    Int64(i64),
    Float(f64),
    Bool(bool),
    StrList(Vec<String>),
    Bytes(Vec<u8>),
}

/// Type tag carried in the ciphertext header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginalFormat {
    String,
    Int,
    Int64,
    Float64,
    Bool,
    StringList,
    Bytes,
    /// Untyped passthrough, decoded as a string.
    Opaque,
}

impl OriginalFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OriginalFormat::String => "string",
            OriginalFormat::Int => "int",
            OriginalFormat::Int64 => "int64",
            OriginalFormat::Float64 => "float64",
            OriginalFormat::Bool => "bool",
            OriginalFormat::StringList => "[]string",
            OriginalFormat::Bytes => "[]byte",
            OriginalFormat::Opaque => "*interface{}",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "string" => Some(OriginalFormat::String),
            "int" => Some(OriginalFormat::Int),
            "int64" => Some(OriginalFormat::Int64),
            "float64" => Some(OriginalFormat::Float64),
            "bool" => Some(OriginalFormat::Bool),
            "[]string" => Some(OriginalFormat::StringList),
            "[]byte" => Some(OriginalFormat::Bytes),
            "*interface{}" => Some(OriginalFormat::Opaque),
            _ => None,
        }
    }
}

impl fmt::Display for OriginalFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean spellings accepted when re-typing strings.
fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn looks_like_list(text: &str) -> bool {
    text.len() >= 2 && text.starts_with('[') && text.ends_with(']')
}

/// Split a list rendering (`[a b]` or `["a","b"]`) into its elements.
fn parse_list(text: &str) -> Vec<String> {
    text.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|token| token.trim_matches(|c| c == '"' || c == '\''))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

impl Value {
    /// Integer value, narrowed to `Int` when it fits in 32 bits.
    pub fn from_integer(value: i64) -> Self {
        match i32::try_from(value) {
            Ok(narrow) => Value::Int(narrow),
            Err(_) => Value::Int64(value),
        }
    }

    /// Re-type a string by probing, in order: list, int, int64, float64, bool.
    /// Anything else stays a string.
    pub fn infer_str(text: &str) -> Self {
        if looks_like_list(text) {
            return Value::StrList(parse_list(text));
        }
        if let Ok(i) = text.parse::<i32>() {
            return Value::Int(i);
        }
        if let Ok(i) = text.parse::<i64>() {
            return Value::Int64(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            return Value::Float(f);
        }
        if let Some(b) = parse_bool(text) {
            return Value::Bool(b);
        }
        Value::Str(text.to_string())
    }

    /// Apply [`Value::infer_str`] to strings, leave every other variant as is.
    pub fn inferred(self) -> Self {
        match self {
            Value::Str(text) => Value::infer_str(&text),
            other => other,
        }
    }

    /// Tag describing this value, `None` for `Null`.
    pub fn format(&self) -> Option<OriginalFormat> {
        match self {
            Value::Null => None,
            Value::Str(_) => Some(OriginalFormat::String),
            Value::Int(_) => Some(OriginalFormat::Int),
            Value::Int64(_) => Some(OriginalFormat::Int64),
            Value::Float(_) => Some(OriginalFormat::Float64),
            Value::Bool(_) => Some(OriginalFormat::Bool),
            Value::StrList(_) => Some(OriginalFormat::StringList),
            Value::Bytes(_) => Some(OriginalFormat::Bytes),
        }
    }

    /// Text that gets encrypted. Lists are space-joined, bytes are base64.
    pub fn canonical(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Str(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Int64(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::StrList(items) => items.join(" "),
            Value::Bytes(bytes) => STANDARD.encode(bytes),
        }
    }

    /// Rebuild a value from its tag and canonical text.
    pub fn from_tagged(format: OriginalFormat, text: &str) -> DatabaseResult<Self> {
        let invalid = || {
            DatabaseError::Codec(format!(
                "'{}' is not a valid {} value",
                text,
                format.as_str()
            ))
        };

        match format {
            OriginalFormat::String => Ok(Value::Str(text.to_string())),
            OriginalFormat::Int => text
                .trim()
                .parse::<i64>()
                .map(Value::from_integer)
                .map_err(|_| invalid()),
            OriginalFormat::Int64 => text
                .trim()
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|_| invalid()),
            OriginalFormat::Float64 => {
                let text = text.trim();
                if !text.contains('.') {
                    if let Ok(i) = text.parse::<i64>() {
                        return Ok(Value::from_integer(i));
                    }
                }
                text.parse::<f64>().map(Value::Float).map_err(|_| invalid())
            }
            OriginalFormat::Bool => parse_bool(text.trim()).map(Value::Bool).ok_or_else(invalid),
            OriginalFormat::StringList => Ok(Value::StrList(parse_list(text))),
            OriginalFormat::Bytes => STANDARD
                .decode(text.trim())
                .map(Value::Bytes)
                .map_err(|_| invalid()),
            OriginalFormat::Opaque => match text {
                "<nil>" => Ok(Value::Null),
                other => Ok(Value::Str(other.to_string())),
            },
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            Value::Int64(i) => Some(*i),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Elements of a list value; a lone string counts as a one-element list.
    pub fn as_list(&self) -> Option<Vec<String>> {
        match self {
            Value::StrList(items) => Some(items.clone()),
            Value::Str(s) => Some(vec![s.clone()]),
            _ => None,
        }
    }

    /// Text form used when a value is bound as text (lists keep their brackets).
    fn bound_text(&self) -> String {
        match self {
            Value::StrList(items) => format!("[{}]", items.join(" ")),
            other => other.canonical(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            other => f.write_str(&other.bound_text()),
        }
    }
}

/// Render values as `[a b c]` for audit snapshots.
pub fn render_values(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(" "))
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Str(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Int(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(i64::from(*i))),
            Value::Int64(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*f)),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Value::Bool(_) | Value::StrList(_) => {
                ToSqlOutput::Owned(rusqlite::types::Value::Text(self.bound_text()))
            }
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::from_integer(i),
            ValueRef::Real(f) => Value::Float(f),
            ValueRef::Text(_) => Value::Str(value.as_str()?.to_string()),
            ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
        })
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::Str(value.clone())
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<String>> for Value {
    fn from(value: Vec<String>) -> Self {
        Value::StrList(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}
