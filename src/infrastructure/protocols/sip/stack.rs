//! Interface of the SIP stack this server runs on
//!
//! Sockets, message parsing, transactions and retransmissions live in the
//! stack. The server only binds transports, registers per-method handlers
//! and a connection-error hook, and hands over its auth manager.

use super::auth::ServerAuthManager;
use super::message::{SipError, SipMethod, SipRequest, SipResponse};
use super::transport::{ConnectionError, TransportProtocol};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;

/// Server side of one request/response exchange
#[async_trait]
pub trait ServerTransaction: Send + Sync {
    async fn respond(&self, response: SipResponse) -> Result<(), SipError>;
}

/// Callback the stack invokes for every admitted request of a method
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn on_request(&self, request: SipRequest, tx: Arc<dyn ServerTransaction>);
}

/// Hook for connections the stack lost. Invoked on the stack's own error
/// path, so it must return promptly.
pub type ConnectionErrorCallback = Arc<dyn Fn(ConnectionError) + Send + Sync>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SipStack: Send + Sync {
    /// Bind a transport
    async fn listen(&self, protocol: TransportProtocol, addr: SocketAddr) -> Result<(), SipError>;

    fn on_request(&self, method: SipMethod, handler: Arc<dyn RequestHandler>);

    fn on_connection_error(&self, callback: ConnectionErrorCallback);

    /// Consulted before any handler runs
    fn set_auth_manager(&self, manager: Arc<ServerAuthManager>);
}
