//! MESSAGE handling
//!
//! MESSAGE bodies carry MANSCDP commands. They are decoded for logging and
//! acknowledged; acting on them is left to the command layer.

use super::builder::ResponseBuilder;
use super::handler::SipHandler;
use super::manscdp::ManscdpMessage;
use super::message::{SipError, SipMethod, SipRequest, SipResponse};
use async_trait::async_trait;
use tracing::{debug, info, warn};

pub struct MessageHandler;

impl MessageHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MessageHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SipHandler for MessageHandler {
    async fn handle_request(&self, request: SipRequest) -> Result<SipResponse, SipError> {
        if request.body().is_empty() {
            info!("MESSAGE without body => {}", request.short());
        } else {
            match ManscdpMessage::parse(request.body()) {
                Ok(command) if command.is_keepalive() => debug!(
                    "Keepalive from {} (SN {:?}) => {}",
                    command.device_id.as_deref().unwrap_or("-"),
                    command.sn,
                    request.short()
                ),
                Ok(command) => info!(
                    "{} from {} (SN {:?}) => {}",
                    command.cmd_type,
                    command.device_id.as_deref().unwrap_or("-"),
                    command.sn,
                    request.short()
                ),
                Err(e) => warn!("Unreadable MESSAGE body => {}: {}", request.short(), e),
            }
        }

        ResponseBuilder::ok().build_for_request(&request)
    }

    fn can_handle(&self, method: SipMethod) -> bool {
        matches!(method, SipMethod::Message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEEPALIVE: &str = "<?xml version=\"1.0\" encoding=\"GB2312\"?>\r\n\
        <Notify>\r\n\
        <CmdType>Keepalive</CmdType>\r\n\
        <SN>43</SN>\r\n\
        <DeviceID>34020000001320000001</DeviceID>\r\n\
        <Status>OK</Status>\r\n\
        </Notify>\r\n";

    #[tokio::test]
    async fn test_message_is_acknowledged() {
        let data = format!(
            "MESSAGE sip:34020000002000000001@3402000000 SIP/2.0\r\n\
             Via: SIP/2.0/UDP 192.168.1.64:5060;branch=z9hG4bK2\r\n\
             From: <sip:34020000001320000001@3402000000>;tag=1\r\n\
             To: <sip:34020000002000000001@3402000000>\r\n\
             Call-ID: 88\r\n\
             CSeq: 20 MESSAGE\r\n\
             Content-Type: Application/MANSCDP+xml\r\n\
             Content-Length: {}\r\n\r\n{}",
            KEEPALIVE.len(),
            KEEPALIVE
        );
        let request = SipRequest::parse(data.as_bytes()).unwrap();

        let response = MessageHandler::new().handle_request(request).await.unwrap();
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.header("CSeq"), Some("20 MESSAGE".to_string()));
    }

    #[tokio::test]
    async fn test_unreadable_body_is_still_acknowledged() {
        let body = "<Notify><CmdType>Keepalive";
        let data = format!(
            "MESSAGE sip:34020000002000000001@3402000000 SIP/2.0\r\n\
             Via: SIP/2.0/UDP 192.168.1.64:5060;branch=z9hG4bK3\r\n\
             From: <sip:34020000001320000001@3402000000>;tag=1\r\n\
             To: <sip:34020000002000000001@3402000000>\r\n\
             Call-ID: 89\r\n\
             CSeq: 21 MESSAGE\r\n\
             Content-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let request = SipRequest::parse(data.as_bytes()).unwrap();

        let response = MessageHandler::new().handle_request(request).await.unwrap();
        assert_eq!(response.status_code(), 200);
    }
}
