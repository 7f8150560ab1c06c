//! Header and URI parameter sets
//!
//! A parameter set keeps the declared key order separately from the values.
//! Rendering walks the declared order and skips any key that has no stored
//! value.

use std::collections::HashMap;

/// Value of a single parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// `key=value`; the text is emitted as stored, quotes included
    Text(String),
    /// Bare `key` (e.g. `lr`, `rport`)
    Flag,
}

impl ParamValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(value) => Some(value),
            ParamValue::Flag => None,
        }
    }
}

/// Parameter names compare case-insensitively; values are stored under the
/// lowercased name while `order` keeps the spelling first declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SipParams {
    order: Vec<String>,
    values: HashMap<String, ParamValue>,
}

impl SipParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from an explicit key order and value map, as received
    pub fn from_parts(order: Vec<String>, values: HashMap<String, ParamValue>) -> Self {
        let values = values
            .into_iter()
            .map(|(key, value)| (key.to_ascii_lowercase(), value))
            .collect();
        Self { order, values }
    }

    /// Parse `a=1;b;c="x;y"` style text. Separators inside double quotes
    /// are part of the value.
    pub fn parse(input: &str, sep: char) -> Self {
        let mut params = Self::new();
        for part in split_unquoted(input, sep) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.split_once('=') {
                Some((key, value)) => {
                    params.add(key.trim(), ParamValue::Text(value.trim().to_string()))
                }
                None => params.add(part, ParamValue::Flag),
            }
        }
        params
    }

    /// Set `key`, overwriting the value but keeping its original position
    /// and spelling
    pub fn add(&mut self, key: &str, value: ParamValue) {
        if !self.order.iter().any(|k| k.eq_ignore_ascii_case(key)) {
            self.order.push(key.to_string());
        }
        self.values.insert(key.to_ascii_lowercase(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(&key.to_ascii_lowercase())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(&key.to_ascii_lowercase())
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.order.retain(|k| !k.eq_ignore_ascii_case(key));
        self.values.remove(&key.to_ascii_lowercase())
    }

    /// Declared key order
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Render with `sep` between entries. No escaping is done here.
    pub fn to_string_with(&self, sep: char) -> String {
        params_to_string(self, sep)
    }
}

/// Render `params` as `key` / `key=value` entries joined by `sep`.
///
/// Keys are visited in declared order; a key without a stored value is
/// skipped. Values are written verbatim, so callers must have escaped or
/// quoted them before insertion.
pub fn params_to_string(params: &SipParams, sep: char) -> String {
    let mut buffer = String::new();
    let mut first = true;

    for key in params.keys() {
        let Some(value) = params.get(key) else {
            continue;
        };

        if !first {
            buffer.push(sep);
        }
        first = false;

        buffer.push_str(key);
        if let ParamValue::Text(text) = value {
            buffer.push('=');
            buffer.push_str(text);
        }
    }

    buffer
}

/// Split on `sep`, ignoring separators inside double-quoted runs
pub(crate) fn split_unquoted(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (idx, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}
