//! Transport identifiers and transport-level events
//!
//! Sockets are owned by the SIP stack; this module only names the transports
//! the server asks the stack to bind and describes the connection failures
//! the stack reports back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::message::SipError;

/// Transport protocol type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Udp,
    Tcp,
    Tls,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Udp => "UDP",
            TransportProtocol::Tcp => "TCP",
            TransportProtocol::Tls => "TLS",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            TransportProtocol::Udp => 5060,
            TransportProtocol::Tcp => 5060,
            TransportProtocol::Tls => 5061,
        }
    }

    pub fn is_reliable(&self) -> bool {
        !matches!(self, TransportProtocol::Udp)
    }
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransportProtocol {
    type Err = SipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UDP" => Ok(TransportProtocol::Udp),
            "TCP" => Ok(TransportProtocol::Tcp),
            "TLS" => Ok(TransportProtocol::Tls),
            other => Err(SipError::InvalidMessage(format!(
                "unknown transport: {}",
                other
            ))),
        }
    }
}

/// A connection the stack lost or failed to use
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    pub source: String,
    pub destination: String,
    pub network: String,
}

impl ConnectionError {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            network: network.into(),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({})",
            self.source, self.destination, self.network
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transport() {
        assert_eq!("udp".parse::<TransportProtocol>().unwrap(), TransportProtocol::Udp);
        assert_eq!("TCP".parse::<TransportProtocol>().unwrap(), TransportProtocol::Tcp);
        assert!("sctp".parse::<TransportProtocol>().is_err());
    }

    #[test]
    fn test_reliability() {
        assert!(!TransportProtocol::Udp.is_reliable());
        assert!(TransportProtocol::Tcp.is_reliable());
        assert_eq!(TransportProtocol::Tls.default_port(), 5061);
    }
}
