//! MANSCDP command bodies
//!
//! GB28181 devices carry XML commands (Keepalive, Catalog, DeviceInfo,
//! Alarm...) in MESSAGE bodies. Most declare `encoding="GB2312"`, so the
//! body is decoded in its declared charset before it is parsed.

use super::message::SipError;
use encoding_rs::{Encoding, UTF_8};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use std::borrow::Cow;
use tracing::warn;

/// Fields shared by Notify, Query, Response and Control commands
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ManscdpMessage {
    pub cmd_type: String,

    #[serde(rename = "SN", default)]
    pub sn: Option<u32>,

    #[serde(rename = "DeviceID", default)]
    pub device_id: Option<String>,

    /// Keepalive / DeviceStatus
    #[serde(default)]
    pub status: Option<String>,

    /// DeviceInfo
    #[serde(default)]
    pub device_name: Option<String>,
}

impl ManscdpMessage {
    pub fn parse(body: &[u8]) -> Result<Self, SipError> {
        let text = decode_body(body);
        quick_xml::de::from_str(&text)
            .map_err(|e| SipError::ParseError(format!("MANSCDP body: {}", e)))
    }

    pub fn is_keepalive(&self) -> bool {
        self.cmd_type.eq_ignore_ascii_case("Keepalive")
    }
}

/// Charset named by the XML declaration, if it names a known one
pub fn declared_encoding(body: &[u8]) -> Option<&'static Encoding> {
    let mut reader = Reader::from_reader(body);
    reader.trim_text(true);
    let mut buf = Vec::new();

    match reader.read_event_into(&mut buf) {
        Ok(Event::Decl(decl)) => decl
            .encoding()
            .and_then(Result::ok)
            .and_then(|label| Encoding::for_label(&label)),
        _ => None,
    }
}

/// Body text in its declared charset; UTF-8 when none is declared
pub fn decode_body(body: &[u8]) -> Cow<'_, str> {
    let encoding = declared_encoding(body).unwrap_or(UTF_8);
    let (text, used, had_errors) = encoding.decode(body);
    if had_errors {
        warn!("MANSCDP body is not valid {}", used.name());
    }
    text
}
