//! Contact header handling and response enrichment
//!
//! Responses to GB28181 registrations echo the device's Contact back with
//! the granted `expires` and a `+sip.instance` that is quoted exactly once,
//! whatever form the device sent it in.

use super::message::{
    expand_compact, header_matches, header_name, header_value, SipError, SipRequest, SipResponse,
};
use super::params::{params_to_string, ParamValue, SipParams};
use rsip::Header;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

pub const SIP_INSTANCE: &str = "+sip.instance";
pub const EXPIRES: &str = "expires";

/// One entry of a Contact header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactHeader {
    pub display_name: Option<String>,
    pub uri: String,
    pub params: SipParams,
    bracketed: bool,
}

impl ContactHeader {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            display_name: None,
            uri: uri.into(),
            params: SipParams::new(),
            bracketed: true,
        }
    }

    pub fn instance(&self) -> Option<&str> {
        self.params.get(SIP_INSTANCE).and_then(ParamValue::as_text)
    }

    pub fn expires(&self) -> Option<u32> {
        self.params
            .get(EXPIRES)
            .and_then(ParamValue::as_text)
            .and_then(|v| v.parse().ok())
    }
}

fn find_unquoted(input: &str, target: char) -> Option<usize> {
    let mut in_quotes = false;
    for (idx, ch) in input.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == target && !in_quotes => return Some(idx),
            _ => {}
        }
    }
    None
}

impl FromStr for ContactHeader {
    type Err = SipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SipError::InvalidMessage("empty Contact".to_string()));
        }

        let (display_name, uri, rest, bracketed) = match find_unquoted(s, '<') {
            Some(open) => {
                let close = s[open..]
                    .find('>')
                    .map(|idx| idx + open)
                    .ok_or_else(|| SipError::InvalidMessage(format!("unterminated Contact: {}", s)))?;
                let display = s[..open].trim();
                let rest = s[close + 1..].trim_start();
                if !rest.is_empty() && !rest.starts_with(';') {
                    return Err(SipError::InvalidMessage(format!(
                        "unexpected text after Contact URI: {}",
                        s
                    )));
                }
                (
                    (!display.is_empty()).then(|| display.to_string()),
                    s[open + 1..close].trim(),
                    rest.trim_start_matches(';'),
                    true,
                )
            }
            None => match s.split_once(';') {
                Some((uri, rest)) => (None, uri.trim(), rest, false),
                None => (None, s, "", false),
            },
        };

        if uri.is_empty() {
            return Err(SipError::InvalidMessage(format!("Contact without URI: {}", s)));
        }

        Ok(Self {
            display_name,
            uri: uri.to_string(),
            params: SipParams::parse(rest, ';'),
            bracketed,
        })
    }
}

impl fmt::Display for ContactHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.display_name, self.bracketed) {
            (Some(name), _) => write!(f, "{} <{}>", name, self.uri)?,
            (None, true) => write!(f, "<{}>", self.uri)?,
            (None, false) => write!(f, "{}", self.uri)?,
        }
        let params = params_to_string(&self.params, ';');
        if !params.is_empty() {
            write!(f, ";{}", params)?;
        }
        Ok(())
    }
}

/// Wrap `value` in double quotes, dropping one existing pair first. Bare
/// quotes left inside are escaped so the result stays one quoted-string.
fn quote_once(value: &str) -> String {
    let inner = if value.len() >= 2 {
        value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value)
    } else {
        value
    };

    let mut quoted = String::with_capacity(inner.len() + 2);
    quoted.push('"');
    let mut escaped = false;
    for ch in inner.chars() {
        if ch == '"' && !escaped {
            quoted.push('\\');
        }
        escaped = ch == '\\' && !escaped;
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Quote `+sip.instance` and set `expires` on a contact
pub fn add_params_to_contact(contact: &mut ContactHeader, expires: Option<u32>) {
    if let Some(urn) = contact.instance().map(str::to_string) {
        contact
            .params
            .add(SIP_INSTANCE, ParamValue::Text(quote_once(&urn)));
    }
    if let Some(expires) = expires {
        contact
            .params
            .add(EXPIRES, ParamValue::Text(expires.to_string()));
    }
}

/// Split a Contact value into its comma separated entries. Commas inside
/// quotes or angle brackets do not separate entries.
fn split_contact_list(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut start = 0;

    for (idx, ch) in value.char_indices() {
        match ch {
            '"' if !in_brackets => in_quotes = !in_quotes,
            '<' if !in_quotes => in_brackets = true,
            '>' if !in_quotes => in_brackets = false,
            ',' if !in_quotes && !in_brackets => {
                parts.push(value[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(value[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

fn enrich_contact_value(value: &str, expires: Option<u32>) -> Result<String, SipError> {
    let mut rendered = Vec::new();
    for entry in split_contact_list(value) {
        if entry == "*" {
            rendered.push(entry.to_string());
            continue;
        }
        let mut contact: ContactHeader = entry.parse()?;
        add_params_to_contact(&mut contact, expires);
        rendered.push(contact.to_string());
    }
    Ok(rendered.join(", "))
}

/// Copy every `name` header of `source` into `target` as an independent
/// copy. Contact copies get their `+sip.instance` quoted once and, when
/// `expires` is given, an `expires` parameter. The request is never touched.
pub fn build_contact_header(
    name: &str,
    source: &SipRequest,
    target: &mut SipResponse,
    expires: Option<u32>,
) {
    for header in source.headers().iter().filter(|h| header_matches(h, name)) {
        let header = expand_compact(header);
        let copy = match &header {
            Header::Contact(_) => {
                let value = header_value(&header);
                match enrich_contact_value(&value, expires) {
                    Ok(enriched) => {
                        debug!("Enriched Contact: {}", enriched);
                        Header::Contact(enriched.into())
                    }
                    Err(e) => {
                        warn!("Copying unparseable Contact verbatim: {}", e);
                        header.clone()
                    }
                }
            }
            other => {
                debug!("Copying {} header without enrichment", header_name(other));
                other.clone()
            }
        };
        target.append_header(copy);
    }
}

/// Copy every `name` header of `source` into `target` unchanged
pub fn copy_headers(name: &str, source: &SipRequest, target: &mut SipResponse) {
    for header in source.headers().iter().filter(|h| header_matches(h, name)) {
        target.append_header(expand_compact(header));
    }
}
