//! Configuration management
//!
//! The server configuration is read from an optional file (any format the
//! `config` crate understands) and overridden by `GB28181_*` environment
//! variables, e.g. `GB28181_SERVER_PORT=15060`.

use crate::domain::shared::value_objects::DeviceId;
use crate::infrastructure::protocols::sip::TransportProtocol;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to parse TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Platform id, e.g. 34020000002000000001
    pub server_id: String,
    /// SIP domain, e.g. 3402000000
    pub realm: String,
    /// Public address advertised to devices
    pub server_ip: String,
    pub server_port: u16,
    /// Account used when this platform registers upstream; empty means `server_id`
    pub user_name: String,
    pub password: String,
    pub user_agent: String,
    /// Registration lifetime in seconds granted when a REGISTER names none
    pub reg_expire: u32,
    pub transports: Vec<TransportProtocol>,
    pub disable_auth: bool,
    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,
    pub credential_lookup_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_id: "34020000002000000001".to_string(),
            realm: "3402000000".to_string(),
            server_ip: "127.0.0.1".to_string(),
            server_port: 5060,
            user_name: String::new(),
            password: String::new(),
            user_agent: "gb28181-sip".to_string(),
            reg_expire: 3600,
            transports: vec![TransportProtocol::Udp, TransportProtocol::Tcp],
            disable_auth: false,
            log_level: "info".to_string(),
            credential_lookup_timeout_ms: 2000,
        }
    }
}

impl ServerConfig {
    /// Layer `path` (optional) and the environment over the defaults
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("GB28181").try_parsing(true))
            .build()?;

        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        DeviceId::parse(&self.server_id)
            .map_err(|e| ConfigError::Invalid(format!("server_id: {}", e)))?;

        if self.realm.trim().is_empty() {
            return Err(ConfigError::Invalid("realm must not be empty".to_string()));
        }
        if self.server_port == 0 {
            return Err(ConfigError::Invalid("server_port must not be 0".to_string()));
        }
        if self.transports.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one transport is required".to_string(),
            ));
        }

        Ok(())
    }

    pub fn credential_lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.credential_lookup_timeout_ms)
    }
}
