//! Device credential resolution
//!
//! The digest authenticator asks a [`CredentialResolver`] for the realm and
//! shared secret of the identity named in an Authorization header. An
//! unknown identity is reported as [`DomainError::NotFound`]; it is a normal
//! outcome that ends in a 403, not a server failure.

use super::registry::DeviceRegistry;
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::shared::value_objects::DeviceId;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Secret material for one authentication attempt. Never cached here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub public_id: String,
    pub realm: String,
    pub secret: String,
}

impl Credential {
    pub fn new(
        public_id: impl Into<String>,
        realm: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            public_id: public_id.into(),
            realm: realm.into(),
            secret: secret.into(),
        }
    }
}

/// Credential lookup capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Resolve the realm and secret of a public identity
    async fn resolve(&self, public_id: &str) -> Result<Credential>;
}

/// Run a lookup under a caller supplied deadline
pub async fn resolve_with_deadline(
    resolver: &dyn CredentialResolver,
    public_id: &str,
    deadline: Duration,
) -> Result<Credential> {
    match tokio::time::timeout(deadline, resolver.resolve(public_id)).await {
        Ok(result) => result,
        Err(_) => Err(DomainError::Unavailable(format!(
            "credential lookup for {} exceeded {:?}",
            public_id, deadline
        ))),
    }
}

/// Resolver backed by a device registry
pub struct RegistryCredentialResolver {
    registry: Arc<dyn DeviceRegistry>,
    default_realm: String,
}

impl RegistryCredentialResolver {
    pub fn new(registry: Arc<dyn DeviceRegistry>, default_realm: impl Into<String>) -> Self {
        Self {
            registry,
            default_realm: default_realm.into(),
        }
    }
}

#[async_trait]
impl CredentialResolver for RegistryCredentialResolver {
    async fn resolve(&self, public_id: &str) -> Result<Credential> {
        let record = self
            .registry
            .find_device(public_id)
            .await?
            .filter(|record| record.enabled)
            .ok_or_else(|| DomainError::NotFound(format!("device {}", public_id)))?;

        debug!("Resolved credential for device {}", public_id);

        Ok(Credential {
            public_id: record.device_id,
            realm: record.realm.unwrap_or_else(|| self.default_realm.clone()),
            secret: record.password,
        })
    }
}

/// One platform-wide password for every well-formed device id.
///
/// This is how most GB28181 platforms are provisioned: the password on the
/// platform configuration page is entered on every camera and NVR.
pub struct SharedSecretResolver {
    realm: String,
    secret: String,
}

impl SharedSecretResolver {
    pub fn new(realm: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl CredentialResolver for SharedSecretResolver {
    async fn resolve(&self, public_id: &str) -> Result<Credential> {
        let device_id = DeviceId::parse(public_id)
            .map_err(|_| DomainError::NotFound(format!("device {}", public_id)))?;

        Ok(Credential::new(
            device_id.as_str(),
            self.realm.clone(),
            self.secret.clone(),
        ))
    }
}
