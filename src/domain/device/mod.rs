//! Device bounded context - credentials and the identity of this platform

pub mod credential;
pub mod identity;
pub mod registry;

pub use credential::{
    resolve_with_deadline, Credential, CredentialResolver, RegistryCredentialResolver,
    SharedSecretResolver,
};
pub use identity::ServerIdentity;
pub use registry::{DeviceRecord, DeviceRegistry, InMemoryDeviceRegistry};
