//! GB28181 SIP signaling core
//!
//! Registration and authentication-challenge policy for a GB28181 video
//! surveillance platform: which requests get a digest challenge, how
//! credentials are resolved, how REGISTER responses echo the device's
//! Contact, how outbound requests are built and how lost connections are
//! reported.

pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use config::{ConfigError, ServerConfig};
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
pub use infrastructure::protocols::sip::{GbServer, ServerDeps};
