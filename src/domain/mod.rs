//! Domain layer - Core business logic and rules
//!
//! This layer contains:
//! - Value Objects: Immutable objects without identity
//! - Device registry and credential resolution ports

pub mod device;
pub mod shared;

// Re-export commonly used types
pub use shared::{DomainError, Result};
