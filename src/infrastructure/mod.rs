//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Protocol implementations (SIP)
//! - Logging setup

pub mod protocols;
pub mod telemetry;
