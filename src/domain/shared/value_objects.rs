//! Shared value objects

use super::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// GB28181 device or platform identifier.
///
/// A 20 digit code: 8 digits of administrative region, 2 of industry,
/// 3 of device type, 7 of serial number. The first 10 digits double as the
/// SIP domain (realm) of the platform that owns the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub const LEN: usize = 20;

    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let value = value.trim();
        if value.len() != Self::LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DomainError::ValidationError(format!(
                "GB28181 id must be {} digits: {:?}",
                Self::LEN,
                value
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Region + industry prefix, used as the default SIP domain
    pub fn domain_code(&self) -> &str {
        &self.0[..10]
    }

    /// Device type code (e.g. 132 camera, 200 SIP server)
    pub fn type_code(&self) -> &str {
        &self.0[10..13]
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
