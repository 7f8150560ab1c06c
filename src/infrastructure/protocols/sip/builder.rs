//! SIP message builders
//!
//! `ResponseBuilder` turns an inbound request into a response skeleton;
//! `RequestBuilder` assembles outbound requests from typed fields and
//! refuses to build one that misses a mandatory field.

use super::message::{expand_compact, header_value, SipError, SipMethod, SipRequest, SipResponse};
use super::params::{params_to_string, ParamValue, SipParams};
use super::transport::TransportProtocol;
use rand::Rng;
use rsip::{Header, Headers, Request, Response, StatusCode, Uri, Version};
use std::fmt;

/// Random numeric tag, the form GB28181 devices use themselves
pub fn generate_tag() -> String {
    rand::thread_rng().gen_range(1_000_000_000u64..10_000_000_000).to_string()
}

/// RFC 3261 branch with the magic cookie
pub fn generate_branch() -> String {
    format!("z9hG4bK{}", uuid::Uuid::new_v4().simple())
}

/// Build a simple SIP response from a request
pub struct ResponseBuilder {
    status_code: u16,
    headers: Vec<Header>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn unauthorized() -> Self {
        Self::new(401)
    }

    pub fn forbidden() -> Self {
        Self::new(403)
    }

    pub fn method_not_allowed() -> Self {
        Self::new(405)
    }

    pub fn proxy_auth_required() -> Self {
        Self::new(407)
    }

    pub fn server_internal_error() -> Self {
        Self::new(500)
    }

    pub fn service_unavailable() -> Self {
        Self::new(503)
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn header(mut self, header: Header) -> Self {
        self.headers.push(header);
        self
    }

    pub fn build_for_request(self, request: &SipRequest) -> Result<SipResponse, SipError> {
        let mut headers = Vec::new();

        // Dialog-identifying headers come first, in request order
        for header in request.headers().iter().map(expand_compact) {
            match header {
                Header::Via(_) | Header::From(_) | Header::CallId(_) | Header::CSeq(_) => {
                    headers.push(header);
                }
                Header::To(_) => {
                    let to = header_value(&header);
                    if self.status_code > 100 && !to.contains(";tag=") {
                        headers.push(Header::To(format!("{};tag={}", to, generate_tag()).into()));
                    } else {
                        headers.push(header);
                    }
                }
                _ => {}
            }
        }

        headers.extend(self.headers);
        headers.push(Header::ContentLength(self.body.len().to_string().into()));

        let response = Response {
            status_code: StatusCode::from(self.status_code),
            headers: Headers::from(headers),
            body: self.body,
            version: Version::V2,
        };

        Ok(SipResponse::new(response))
    }
}

/// Name-addr used in From, To and Contact
#[derive(Debug, Clone, PartialEq)]
pub struct SipAddress {
    pub display_name: Option<String>,
    pub uri: Uri,
    pub params: SipParams,
}

impl SipAddress {
    pub fn new(uri: Uri) -> Self {
        Self {
            display_name: None,
            uri,
            params: SipParams::new(),
        }
    }

    pub fn parse_uri(uri: &str) -> Result<Self, SipError> {
        Ok(Self::new(Uri::try_from(uri)?))
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.params.add("tag", ParamValue::Text(tag.into()));
        self
    }

    pub fn tag(&self) -> Option<&str> {
        self.params.get("tag").and_then(ParamValue::as_text)
    }

    fn validate(&self, field: &str) -> Result<(), SipError> {
        let uri = self.uri.to_string().to_ascii_lowercase();
        if !(uri.starts_with("sip:") || uri.starts_with("sips:")) {
            return Err(SipError::Validation(format!(
                "{} must be a sip or sips URI: {}",
                field, self.uri
            )));
        }
        Ok(())
    }
}

impl fmt::Display for SipAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.display_name {
            Some(name) => write!(f, "\"{}\" <{}>", name, self.uri)?,
            None => write!(f, "<{}>", self.uri)?,
        }
        let params = params_to_string(&self.params, ';');
        if !params.is_empty() {
            write!(f, ";{}", params)?;
        }
        Ok(())
    }
}

/// Outbound request builder
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Option<SipMethod>,
    recipient: Option<Uri>,
    from: Option<SipAddress>,
    to: Option<SipAddress>,
    contact: Option<SipAddress>,
    routes: Vec<Uri>,
    call_id: Option<String>,
    content_type: Option<String>,
    cseq: u32,
    max_forwards: u32,
    via: Option<(String, u16, TransportProtocol)>,
    user_agent: Option<String>,
    body: Vec<u8>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            recipient: None,
            from: None,
            to: None,
            contact: None,
            routes: Vec::new(),
            call_id: None,
            content_type: None,
            cseq: 1,
            max_forwards: 70,
            via: None,
            user_agent: None,
            body: Vec::new(),
        }
    }

    pub fn set_method(&mut self, method: SipMethod) -> &mut Self {
        self.method = Some(method);
        self
    }

    pub fn set_recipient(&mut self, recipient: Uri) -> &mut Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn set_from(&mut self, from: SipAddress) -> &mut Self {
        self.from = Some(from);
        self
    }

    pub fn set_to(&mut self, to: SipAddress) -> &mut Self {
        self.to = Some(to);
        self
    }

    pub fn set_contact(&mut self, contact: SipAddress) -> &mut Self {
        self.contact = Some(contact);
        self
    }

    pub fn set_routes(&mut self, routes: Vec<Uri>) -> &mut Self {
        self.routes = routes;
        self
    }

    pub fn set_call_id(&mut self, call_id: impl Into<String>) -> &mut Self {
        self.call_id = Some(call_id.into());
        self
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) -> &mut Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn set_cseq(&mut self, cseq: u32) -> &mut Self {
        self.cseq = cseq;
        self
    }

    pub fn set_max_forwards(&mut self, max_forwards: u32) -> &mut Self {
        self.max_forwards = max_forwards;
        self
    }

    /// Local address for the top Via; a fresh branch is generated per build
    pub fn set_via(&mut self, host: impl Into<String>, port: u16, transport: TransportProtocol) -> &mut Self {
        self.via = Some((host.into(), port, transport));
        self
    }

    pub fn set_user_agent(&mut self, user_agent: impl Into<String>) -> &mut Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn set_body(&mut self, body: Vec<u8>) -> &mut Self {
        self.body = body;
        self
    }

    pub fn build(&self) -> Result<SipRequest, SipError> {
        let method = self
            .method
            .ok_or_else(|| SipError::Validation("method is required".to_string()))?;
        let recipient = self
            .recipient
            .clone()
            .ok_or_else(|| SipError::Validation("recipient is required".to_string()))?;
        let from = self
            .from
            .as_ref()
            .ok_or_else(|| SipError::Validation("From is required".to_string()))?;
        let to = self
            .to
            .as_ref()
            .ok_or_else(|| SipError::Validation("To is required".to_string()))?;

        from.validate("From")?;
        to.validate("To")?;
        if let Some(contact) = &self.contact {
            contact.validate("Contact")?;
        }

        let mut from = from.clone();
        if from.tag().is_none() {
            from = from.with_tag(generate_tag());
        }

        let mut headers = Vec::new();
        if let Some((host, port, transport)) = &self.via {
            headers.push(Header::Via(
                format!(
                    "SIP/2.0/{} {}:{};rport;branch={}",
                    transport,
                    host,
                    port,
                    generate_branch()
                )
                .into(),
            ));
        }
        headers.push(Header::MaxForwards(self.max_forwards.to_string().into()));
        headers.push(Header::From(from.to_string().into()));
        headers.push(Header::To(to.to_string().into()));
        headers.push(Header::CallId(
            self.call_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
                .into(),
        ));
        headers.push(Header::CSeq(format!("{} {}", self.cseq, method).into()));
        if let Some(contact) = &self.contact {
            headers.push(Header::Contact(contact.to_string().into()));
        }
        if !self.routes.is_empty() {
            let route = self
                .routes
                .iter()
                .map(|uri| format!("<{}>", uri))
                .collect::<Vec<_>>()
                .join(", ");
            headers.push(Header::Route(route.into()));
        }
        if let Some(user_agent) = &self.user_agent {
            headers.push(Header::UserAgent(user_agent.clone().into()));
        }
        if let Some(content_type) = &self.content_type {
            headers.push(Header::ContentType(content_type.clone().into()));
        }
        headers.push(Header::ContentLength(self.body.len().to_string().into()));

        Ok(SipRequest::new(Request {
            method: method.to_rsip(),
            uri: recipient,
            version: Version::V2,
            headers: Headers::from(headers),
            body: self.body.clone(),
        }))
    }
}

/// Assemble an outbound request.
///
/// `from`, `to` and `recipient` are mandatory; optional fields are only set
/// when present and an empty route set emits no Route header. Errors from
/// the builder are returned as they are.
#[allow(clippy::too_many_arguments)]
pub fn build_request(
    method: SipMethod,
    from: Option<&SipAddress>,
    to: Option<&SipAddress>,
    contact: Option<&SipAddress>,
    recipient: &Uri,
    routes: &[Uri],
    call_id: Option<&str>,
    content_type: Option<&str>,
) -> Result<SipRequest, SipError> {
    let mut builder = RequestBuilder::new();

    builder.set_method(method);
    if let Some(from) = from {
        builder.set_from(from.clone());
    }
    if let Some(to) = to {
        builder.set_to(to.clone());
    }
    if let Some(contact) = contact {
        builder.set_contact(contact.clone());
    }
    builder.set_recipient(recipient.clone());

    if !routes.is_empty() {
        builder.set_routes(routes.to_vec());
    }

    if let Some(call_id) = call_id {
        builder.set_call_id(call_id);
    }

    if let Some(content_type) = content_type {
        builder.set_content_type(content_type);
    }

    builder.build()
}
