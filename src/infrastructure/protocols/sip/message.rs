//! SIP message types
//!
//! Thin wrappers over `rsip` messages plus the header helpers the policy
//! layer needs: name matching that ignores case and header values without
//! the `Name: ` prefix `rsip` puts in front of them when displayed.

use bytes::Bytes;
use rsip::{Header, Headers, Method, Request, Response, Uri};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SipError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// A request could not be assembled from the given fields
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rsip::Error> for SipError {
    fn from(err: rsip::Error) -> Self {
        SipError::ParseError(err.to_string())
    }
}

/// SIP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SipMethod {
    Register,
    Invite,
    Ack,
    Cancel,
    Bye,
    Options,
    Info,
    Update,
    Prack,
    Subscribe,
    Notify,
    Refer,
    Message,
    Publish,
}

impl SipMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SipMethod::Register => "REGISTER",
            SipMethod::Invite => "INVITE",
            SipMethod::Ack => "ACK",
            SipMethod::Cancel => "CANCEL",
            SipMethod::Bye => "BYE",
            SipMethod::Options => "OPTIONS",
            SipMethod::Info => "INFO",
            SipMethod::Update => "UPDATE",
            SipMethod::Prack => "PRACK",
            SipMethod::Subscribe => "SUBSCRIBE",
            SipMethod::Notify => "NOTIFY",
            SipMethod::Refer => "REFER",
            SipMethod::Message => "MESSAGE",
            SipMethod::Publish => "PUBLISH",
        }
    }

    pub fn from_rsip(method: &Method) -> Option<Self> {
        match method {
            Method::Register => Some(SipMethod::Register),
            Method::Invite => Some(SipMethod::Invite),
            Method::Ack => Some(SipMethod::Ack),
            Method::Cancel => Some(SipMethod::Cancel),
            Method::Bye => Some(SipMethod::Bye),
            Method::Options => Some(SipMethod::Options),
            Method::Info => Some(SipMethod::Info),
            Method::Update => Some(SipMethod::Update),
            Method::PRack => Some(SipMethod::Prack),
            Method::Subscribe => Some(SipMethod::Subscribe),
            Method::Notify => Some(SipMethod::Notify),
            Method::Refer => Some(SipMethod::Refer),
            Method::Message => Some(SipMethod::Message),
            Method::Publish => Some(SipMethod::Publish),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    pub fn to_rsip(&self) -> Method {
        match self {
            SipMethod::Register => Method::Register,
            SipMethod::Invite => Method::Invite,
            SipMethod::Ack => Method::Ack,
            SipMethod::Cancel => Method::Cancel,
            SipMethod::Bye => Method::Bye,
            SipMethod::Options => Method::Options,
            SipMethod::Info => Method::Info,
            SipMethod::Update => Method::Update,
            SipMethod::Prack => Method::PRack,
            SipMethod::Subscribe => Method::Subscribe,
            SipMethod::Notify => Method::Notify,
            SipMethod::Refer => Method::Refer,
            SipMethod::Message => Method::Message,
            SipMethod::Publish => Method::Publish,
        }
    }
}

impl fmt::Display for SipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Full name of an RFC 3261 compact header name
pub fn expand_compact_name(name: &str) -> Option<&'static str> {
    let full = match name.to_ascii_lowercase().as_str() {
        "c" => "Content-Type",
        "e" => "Content-Encoding",
        "f" => "From",
        "i" => "Call-ID",
        "k" => "Supported",
        "l" => "Content-Length",
        "m" => "Contact",
        "s" => "Subject",
        "t" => "To",
        "v" => "Via",
        _ => return None,
    };
    Some(full)
}

/// Header name (`Contact`, `Expires`, ...), compact forms given in full
pub fn header_name(header: &Header) -> String {
    match header {
        Header::Other(name, _) => expand_compact_name(name.trim())
            .map(str::to_string)
            .unwrap_or_else(|| name.clone()),
        other => other
            .to_string()
            .split_once(':')
            .map(|(name, _)| name.trim().to_string())
            .unwrap_or_default(),
    }
}

/// The typed header for a compact-form header rsip left untyped; any other
/// header is returned as is
pub fn expand_compact(header: &Header) -> Header {
    let Header::Other(name, value) = header else {
        return header.clone();
    };
    let value = value.trim().to_string();
    match expand_compact_name(name.trim()) {
        Some("Content-Type") => Header::ContentType(value.into()),
        Some("From") => Header::From(value.into()),
        Some("Call-ID") => Header::CallId(value.into()),
        Some("Content-Length") => Header::ContentLength(value.into()),
        Some("Contact") => Header::Contact(value.into()),
        Some("To") => Header::To(value.into()),
        Some("Via") => Header::Via(value.into()),
        _ => header.clone(),
    }
}

/// Header value without the `Name:` prefix
pub fn header_value(header: &Header) -> String {
    match header {
        Header::Other(_, value) => value.trim().to_string(),
        other => other
            .to_string()
            .split_once(':')
            .map(|(_, value)| value.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Case-insensitive header name comparison
pub fn header_matches(header: &Header, name: &str) -> bool {
    header_name(header).eq_ignore_ascii_case(name)
}

fn values_named(headers: &Headers, name: &str) -> Vec<String> {
    headers
        .iter()
        .filter(|h| header_matches(h, name))
        .map(header_value)
        .collect()
}

/// SIP Request wrapper
#[derive(Debug, Clone)]
pub struct SipRequest {
    pub inner: Request,
}

impl SipRequest {
    pub fn new(inner: Request) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let request = rsip::Request::try_from(data)?;
        Ok(Self::new(request))
    }

    /// `None` for methods the server has no name for
    pub fn method(&self) -> Option<SipMethod> {
        SipMethod::from_rsip(&self.inner.method)
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    /// Values of every header called `name`, in message order
    pub fn header_values(&self, name: &str) -> Vec<String> {
        values_named(&self.inner.headers, name)
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.header_values(name).into_iter().next()
    }

    pub fn call_id(&self) -> Option<String> {
        self.header("Call-ID")
    }

    pub fn cseq(&self) -> Option<u32> {
        self.header("CSeq")
            .and_then(|v| v.split_whitespace().next().and_then(|s| s.parse().ok()))
    }

    /// Value of the Expires header, if present and numeric
    pub fn expires(&self) -> Option<u32> {
        self.header("Expires").and_then(|v| v.parse().ok())
    }

    /// One-line summary for logs
    pub fn short(&self) -> String {
        format!(
            "{} {} (Call-ID: {})",
            self.inner.method,
            self.inner.uri,
            self.call_id().unwrap_or_else(|| "-".to_string())
        )
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

/// SIP Response wrapper
#[derive(Debug, Clone)]
pub struct SipResponse {
    pub inner: Response,
}

impl SipResponse {
    pub fn new(inner: Response) -> Self {
        Self { inner }
    }

    pub fn parse(data: &[u8]) -> Result<Self, SipError> {
        let response = rsip::Response::try_from(data)?;
        Ok(Self::new(response))
    }

    pub fn status_code(&self) -> u16 {
        self.inner.status_code.clone().into()
    }

    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.inner.headers
    }

    /// Append a header the response owns outright
    pub fn append_header(&mut self, header: Header) {
        self.inner.headers.push(header);
    }

    pub fn header_values(&self, name: &str) -> Vec<String> {
        values_named(&self.inner.headers, name)
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.header_values(name).into_iter().next()
    }

    pub fn body(&self) -> &[u8] {
        &self.inner.body
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.inner.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTER: &[u8] = b"REGISTER sip:34020000002000000001@3402000000 SIP/2.0\r\n\
                     Via: SIP/2.0/UDP 192.168.1.64:5060;rport;branch=z9hG4bK1371463273\r\n\
                     From: <sip:34020000001320000001@3402000000>;tag=2043466181\r\n\
                     To: <sip:34020000001320000001@3402000000>\r\n\
                     Call-ID: 1011047669\r\n\
                     CSeq: 1 REGISTER\r\n\
                     Contact: <sip:34020000001320000001@192.168.1.64:5060>\r\n\
                     Max-Forwards: 70\r\n\
                     User-Agent: IP Camera\r\n\
                     Expires: 3600\r\n\
                     Content-Length: 0\r\n\r\n";

    #[test]
    fn test_parse_register_request() {
        let req = SipRequest::parse(REGISTER).unwrap();

        assert_eq!(req.method(), Some(SipMethod::Register));
        assert_eq!(req.call_id(), Some("1011047669".to_string()));
        assert_eq!(req.cseq(), Some(1));
        assert_eq!(req.expires(), Some(3600));
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let req = SipRequest::parse(REGISTER).unwrap();

        assert_eq!(
            req.header_values("contact"),
            vec!["<sip:34020000001320000001@192.168.1.64:5060>".to_string()]
        );
        assert_eq!(req.header("USER-AGENT"), Some("IP Camera".to_string()));
        assert!(req.header("Authorization").is_none());
    }

    #[test]
    fn test_compact_header_names() {
        let mut req = SipRequest::parse(REGISTER).unwrap();
        req.inner
            .headers
            .retain(|h| !matches!(h, Header::CallId(_) | Header::Contact(_)));
        req.inner
            .headers
            .push(Header::Other("i".to_string(), "compact-call".to_string()));
        req.inner
            .headers
            .push(Header::Other("M".to_string(), "<sip:dev@10.0.0.1>".to_string()));

        assert_eq!(req.call_id(), Some("compact-call".to_string()));
        assert_eq!(req.header_values("Contact"), vec!["<sip:dev@10.0.0.1>".to_string()]);
        assert!(matches!(
            expand_compact(&Header::Other("m".to_string(), "<sip:dev@10.0.0.1>".to_string())),
            Header::Contact(_)
        ));
        assert_eq!(expand_compact_name("x"), None);
    }

    #[test]
    fn test_method_round_trip_through_rsip() {
        for method in [SipMethod::Register, SipMethod::Message, SipMethod::Prack] {
            assert_eq!(SipMethod::from_rsip(&method.to_rsip()), Some(method));
        }
    }

    #[test]
    fn test_parse_response() {
        let data = b"SIP/2.0 200 OK\r\n\
                     Via: SIP/2.0/UDP 192.168.1.64:5060;branch=z9hG4bK1371463273\r\n\
                     From: <sip:34020000001320000001@3402000000>;tag=2043466181\r\n\
                     To: <sip:34020000001320000001@3402000000>;tag=a6c85cf\r\n\
                     Call-ID: 1011047669\r\n\
                     CSeq: 1 REGISTER\r\n\
                     Content-Length: 0\r\n\r\n";

        let resp = SipResponse::parse(data).unwrap();
        assert_eq!(resp.status_code(), 200);
        assert_eq!(resp.header("call-id"), Some("1011047669".to_string()));
    }
}
