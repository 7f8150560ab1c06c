//! Device registry interface
//!
//! The registry is the external store that knows which devices may register
//! with this platform and which secret each of them shares with us.

use crate::domain::shared::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Provisioning record of a single device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub device_id: String,
    pub password: String,
    /// Realm override; `None` means the platform realm applies
    pub realm: Option<String>,
    pub enabled: bool,
}

impl DeviceRecord {
    pub fn new(device_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            password: password.into(),
            realm: None,
            enabled: true,
        }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }
}

/// Device registry trait
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Find a device by its public id
    async fn find_device(&self, device_id: &str) -> Result<Option<DeviceRecord>>;
}

/// In-memory device registry
#[derive(Default)]
pub struct InMemoryDeviceRegistry {
    devices: Arc<RwLock<HashMap<String, DeviceRecord>>>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a device
    pub async fn add_device(&self, record: DeviceRecord) {
        let mut devices = self.devices.write().await;
        info!("Added device: {}", record.device_id);
        devices.insert(record.device_id.clone(), record);
    }

    pub async fn remove_device(&self, device_id: &str) -> Option<DeviceRecord> {
        let mut devices = self.devices.write().await;
        devices.remove(device_id)
    }

    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryDeviceRegistry {
    async fn find_device(&self, device_id: &str) -> Result<Option<DeviceRecord>> {
        let devices = self.devices.read().await;
        Ok(devices.get(device_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_and_find_device() {
        let registry = InMemoryDeviceRegistry::new();
        registry
            .add_device(DeviceRecord::new("34020000001320000001", "12345678"))
            .await;

        let found = registry.find_device("34020000001320000001").await.unwrap();
        assert_eq!(found.unwrap().password, "12345678");
        assert!(registry.find_device("34020000001320000002").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_device() {
        let registry = InMemoryDeviceRegistry::new();
        registry
            .add_device(DeviceRecord::new("34020000001320000001", "12345678"))
            .await;
        assert_eq!(registry.device_count().await, 1);

        registry.remove_device("34020000001320000001").await;
        assert_eq!(registry.device_count().await, 0);
    }
}
