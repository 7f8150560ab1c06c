//! Small helpers shared by the handlers

use super::message::SipRequest;
use super::params::{ParamValue, SipParams};

/// `branch` parameter of the top Via
pub fn branch_id(request: &SipRequest) -> Option<String> {
    let via = request.header("Via")?;
    let (_, params) = via.split_once(';')?;
    SipParams::parse(params, ';')
        .get("branch")
        .and_then(ParamValue::as_text)
        .map(str::to_string)
}

/// Host part of a `host:port` string; `None` when there is no port
pub fn host_of(addr: &str) -> Option<&str> {
    addr.split_once(':').map(|(host, _)| host)
}

/// Port part of a `host:port` string
pub fn port_of(addr: &str) -> Option<&str> {
    addr.split_once(':').map(|(_, rest)| rest.split(':').next().unwrap_or(rest))
}

/// User part of the first `sip:`/`sips:` URI in a header value, which for
/// GB28181 is the device id
pub fn uri_user(value: &str) -> Option<&str> {
    let start = value
        .find("sip:")
        .map(|idx| idx + 4)
        .or_else(|| value.find("sips:").map(|idx| idx + 5))?;
    let rest = &value[start..];
    let (user, _) = rest.split_once('@')?;
    Some(user)
}
