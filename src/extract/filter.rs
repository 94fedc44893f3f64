//! Closed filter registry.
//!
//! Definitions name filters as strings; [`Filter::compile`] resolves each name
//! and its arguments once, at load time, into a variant that is a pure
//! `String -> Result<String, _>` transform.

use chrono::FixedOffset;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::DefinitionError;
use crate::units::{format_number, parse_number, parse_size, parse_time, parse_timezone};

/// Filter reference as written in a definition.
///
/// Either a bare name (`"parseSize"`) or `{"name": "split", "args": [" ", 0]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    /// Filter without arguments.
    Name(String),
    /// Filter with arguments.
    Full {
        /// Filter name.
        name: String,
        /// Positional arguments.
        #[serde(default)]
        args: Vec<Value>,
    },
}

impl FilterSpec {
    fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::Full { name, .. } => name,
        }
    }

    fn args(&self) -> &[Value] {
        match self {
            Self::Name(_) => &[],
            Self::Full { args, .. } => args,
        }
    }
}

/// A compiled filter.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Human size to bytes.
    ParseSize,
    /// Locale-tolerant number; yields `"0"` when nothing parses.
    ParseNumber,
    /// Site-local timestamp to Unix epoch.
    ParseTime(FixedOffset),
    /// Split on `sep` and pick `index` (negative counts from the end).
    Split {
        /// Separator.
        sep: String,
        /// Element index.
        index: i64,
    },
    /// First capture group (or the whole match when the pattern has no groups).
    Regex(Regex),
    /// Value of `key` in a URL or bare query string.
    QueryString(String),
    /// Trim surrounding whitespace.
    Trim,
    /// Replace every occurrence of `from` with `to`.
    Replace {
        /// Needle.
        from: String,
        /// Replacement.
        to: String,
    },
    /// Append a fixed suffix.
    Append(String),
}

impl Filter {
    /// Resolves a filter reference. `offset` is the definition's timezone,
    /// used by `parseTime` unless the filter names its own.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError`] for unknown names or bad arguments.
    pub fn compile(
        field: &str,
        spec: &FilterSpec,
        offset: FixedOffset,
    ) -> Result<Self, DefinitionError> {
        let name = spec.name();
        let args = spec.args();
        let key = name.to_ascii_lowercase().replace(['_', '-'], "");

        let filter = match key.as_str() {
            "parsesize" => Self::ParseSize,
            "parsenumber" => Self::ParseNumber,
            "parsetime" => match args.first() {
                None => Self::ParseTime(offset),
                Some(tz) => {
                    let tz = arg_str(field, name, tz)?;
                    Self::ParseTime(parse_timezone(tz).ok_or_else(|| {
                        args_error(field, name, format!("invalid timezone '{tz}'"))
                    })?)
                }
            },
            "split" => {
                let sep = arg_str(field, name, required(field, name, args, 0)?)?.to_string();
                let index = args
                    .get(1)
                    .map_or(Ok(0), |v| arg_int(field, name, v))?;
                Self::Split { sep, index }
            }
            "regex" | "re" => {
                let pattern = arg_str(field, name, required(field, name, args, 0)?)?;
                let regex = Regex::new(pattern).map_err(|source| DefinitionError::InvalidRegex {
                    field: field.to_string(),
                    pattern: pattern.to_string(),
                    source,
                })?;
                Self::Regex(regex)
            }
            "querystring" | "query" => {
                let key = arg_str(field, name, required(field, name, args, 0)?)?;
                Self::QueryString(key.to_string())
            }
            "trim" => Self::Trim,
            "replace" => Self::Replace {
                from: arg_str(field, name, required(field, name, args, 0)?)?.to_string(),
                to: args
                    .get(1)
                    .map_or(Ok(""), |v| arg_str(field, name, v))?
                    .to_string(),
            },
            "append" => {
                Self::Append(arg_str(field, name, required(field, name, args, 0)?)?.to_string())
            }
            _ => {
                return Err(DefinitionError::UnknownFilter {
                    field: field.to_string(),
                    name: name.to_string(),
                });
            }
        };
        Ok(filter)
    }

    /// Stable filter name for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ParseSize => "parseSize",
            Self::ParseNumber => "parseNumber",
            Self::ParseTime(_) => "parseTime",
            Self::Split { .. } => "split",
            Self::Regex(_) => "regex",
            Self::QueryString(_) => "querystring",
            Self::Trim => "trim",
            Self::Replace { .. } => "replace",
            Self::Append(_) => "append",
        }
    }

    /// Applies the filter to `value`.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the value cannot be transformed.
    pub fn apply(&self, value: &str) -> Result<String, String> {
        match self {
            Self::ParseSize => parse_size(value)
                .map(|bytes| bytes.to_string())
                .ok_or_else(|| "not a size".to_string()),
            Self::ParseNumber => {
                Ok(parse_number(value).map_or_else(|| "0".to_string(), format_number))
            }
            Self::ParseTime(offset) => parse_time(value, *offset)
                .map(|epoch| epoch.to_string())
                .ok_or_else(|| "unrecognised timestamp".to_string()),
            Self::Split { sep, index } => {
                let parts: Vec<&str> = value.split(sep.as_str()).collect();
                let position = if *index < 0 {
                    i64::try_from(parts.len()).unwrap_or(i64::MAX) + index
                } else {
                    *index
                };
                usize::try_from(position)
                    .ok()
                    .and_then(|i| parts.get(i))
                    .map(|part| part.trim().to_string())
                    .ok_or_else(|| format!("index {index} out of range ({} parts)", parts.len()))
            }
            Self::Regex(regex) => {
                let caps = regex
                    .captures(value)
                    .ok_or_else(|| "pattern did not match".to_string())?;
                Ok(caps
                    .get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default())
            }
            Self::QueryString(key) => query_value(value, key)
                .ok_or_else(|| format!("query key '{key}' missing")),
            Self::Trim => Ok(value.trim().to_string()),
            Self::Replace { from, to } => Ok(value.replace(from.as_str(), to)),
            Self::Append(suffix) => Ok(format!("{value}{suffix}")),
        }
    }
}

fn query_value(value: &str, key: &str) -> Option<String> {
    let value = value.trim();
    let query = match value.split_once('?') {
        Some((_, query)) => query,
        None => value,
    };
    let query = query.split('#').next().unwrap_or_default();
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn required<'a>(
    field: &str,
    name: &str,
    args: &'a [Value],
    index: usize,
) -> Result<&'a Value, DefinitionError> {
    args.get(index)
        .ok_or_else(|| args_error(field, name, format!("missing argument #{}", index + 1)))
}

fn arg_str<'a>(field: &str, name: &str, value: &'a Value) -> Result<&'a str, DefinitionError> {
    value
        .as_str()
        .ok_or_else(|| args_error(field, name, format!("expected string, got {value}")))
}

fn arg_int(field: &str, name: &str, value: &Value) -> Result<i64, DefinitionError> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| args_error(field, name, format!("expected integer, got {value}")))
}

fn args_error(field: &str, name: &str, reason: String) -> DefinitionError {
    DefinitionError::FilterArgs {
        field: field.to_string(),
        name: name.to_string(),
        reason,
    }
}
