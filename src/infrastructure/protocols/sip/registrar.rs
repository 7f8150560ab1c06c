//! REGISTER handling
//!
//! Devices are admitted by the auth manager before they get here; the
//! handler only answers. Bindings are not kept past the request.

use super::builder::ResponseBuilder;
use super::contact::{build_contact_header, copy_headers};
use super::handler::SipHandler;
use super::message::{SipError, SipMethod, SipRequest, SipResponse};
use super::utils::uri_user;
use crate::domain::device::identity::ServerIdentity;
use async_trait::async_trait;
use chrono::Local;
use rsip::Header;
use std::sync::Arc;
use tracing::{debug, info};

/// Time format GB28181 devices read from the Date header to sync clocks
pub const GB_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub struct RegisterHandler {
    identity: Arc<ServerIdentity>,
    default_expires: u32,
}

impl RegisterHandler {
    /// `default_expires` is granted to registrations without an Expires header
    pub fn new(identity: Arc<ServerIdentity>, default_expires: u32) -> Self {
        Self {
            identity,
            default_expires,
        }
    }

    fn device_id(request: &SipRequest) -> String {
        request
            .header("To")
            .or_else(|| request.header("From"))
            .and_then(|value| uri_user(&value).map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

#[async_trait]
impl SipHandler for RegisterHandler {
    async fn handle_request(&self, request: SipRequest) -> Result<SipResponse, SipError> {
        debug!("Handling REGISTER request");

        let requested = request.expires();
        let expires = requested.unwrap_or(self.default_expires);
        let device_id = Self::device_id(&request);

        let mut response = ResponseBuilder::ok()
            .header(Header::Date(Local::now().format(GB_DATE_FORMAT).to_string().into()))
            .header(Header::UserAgent(self.identity.user_agent().to_string().into()))
            .build_for_request(&request)?;

        if requested.is_some() {
            copy_headers("Expires", &request, &mut response);
        } else {
            response.append_header(Header::Expires(expires.to_string().into()));
        }
        build_contact_header("Contact", &request, &mut response, Some(expires));

        if expires == 0 {
            info!("Device {} unregistered", device_id);
        } else {
            info!("Device {} registered (expires in {}s)", device_id, expires);
        }

        Ok(response)
    }

    fn can_handle(&self, method: SipMethod) -> bool {
        matches!(method, SipMethod::Register)
    }
}
