//! Identity of this platform

use super::credential::Credential;
use crate::config::ServerConfig;

/// Who this server is on the wire. Built once at startup and shared
/// read-only for the lifetime of the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    server_id: String,
    realm: String,
    host: String,
    port: u16,
    user_agent: String,
    credentials: Credential,
}

impl ServerIdentity {
    pub fn new(
        server_id: impl Into<String>,
        realm: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user_agent: impl Into<String>,
        credentials: Credential,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            realm: realm.into(),
            host: host.into(),
            port,
            user_agent: user_agent.into(),
            credentials,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        let account = if config.user_name.is_empty() {
            config.server_id.clone()
        } else {
            config.user_name.clone()
        };

        Self::new(
            config.server_id.clone(),
            config.realm.clone(),
            config.server_ip.clone(),
            config.server_port,
            config.user_agent.clone(),
            Credential::new(account, config.realm.clone(), config.password.clone()),
        )
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn credentials(&self) -> &Credential {
        &self.credentials
    }

    /// `sip:<server_id>@<host>:<port>`
    pub fn sip_uri(&self) -> String {
        format!("sip:{}@{}:{}", self.server_id, self.host, self.port)
    }
}
