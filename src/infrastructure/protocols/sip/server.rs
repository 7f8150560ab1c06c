//! GB28181 platform server
//!
//! Wires the policy core onto a SIP stack: auth manager, connection-loss
//! hook, transports and the REGISTER / MESSAGE handlers.

use super::auth::{DigestAuthenticator, ServerAuthManager, SipAuthenticator};
use super::challenge::ChallengePolicy;
use super::handler::{SipHandler, TransactionalHandler};
use super::message::{SipError, SipMethod};
use super::message_handler::MessageHandler;
use super::notifier::{
    ConnectionLossNotifier, NotifierTask, SessionRegistry, DEFAULT_QUEUE_CAPACITY,
};
use super::registrar::RegisterHandler;
use super::stack::SipStack;
use crate::config::ServerConfig;
use crate::domain::device::credential::CredentialResolver;
use crate::domain::device::identity::ServerIdentity;
use crate::infrastructure::telemetry;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Collaborators injected into the server
pub struct ServerDeps {
    pub stack: Arc<dyn SipStack>,
    pub credentials: Arc<dyn CredentialResolver>,
    pub sessions: Option<Arc<dyn SessionRegistry>>,
    pub policy: ChallengePolicy,
}

impl ServerDeps {
    pub fn new(stack: Arc<dyn SipStack>, credentials: Arc<dyn CredentialResolver>) -> Self {
        Self {
            stack,
            credentials,
            sessions: None,
            policy: ChallengePolicy::default(),
        }
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionRegistry>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_policy(mut self, policy: ChallengePolicy) -> Self {
        self.policy = policy;
        self
    }
}

pub struct GbServer {
    identity: Arc<ServerIdentity>,
    auth: Arc<ServerAuthManager>,
    notifier: Arc<ConnectionLossNotifier>,
    notifier_task: Option<NotifierTask>,
}

impl GbServer {
    /// Configure the stack and bind every configured transport. A transport
    /// that cannot be bound is returned as an error; the caller is expected
    /// to exit.
    pub async fn start(config: &ServerConfig, deps: ServerDeps) -> Result<Self, SipError> {
        config
            .validate()
            .map_err(|e| SipError::Validation(e.to_string()))?;
        telemetry::init(&config.log_level);

        let identity = Arc::new(ServerIdentity::from_config(config));
        info!(
            "Starting GB28181 server {} (realm {})",
            identity.server_id(),
            identity.realm()
        );

        let authenticator: Option<Arc<dyn SipAuthenticator>> = if config.disable_auth {
            warn!("Authentication disabled");
            None
        } else {
            Some(Arc::new(DigestAuthenticator::new(
                config.realm.clone(),
                deps.credentials,
                config.credential_lookup_timeout(),
            )))
        };
        let auth = Arc::new(ServerAuthManager::new(authenticator, Arc::new(deps.policy)));
        deps.stack.set_auth_manager(auth.clone());

        let (notifier, notifier_task) = match deps.sessions {
            Some(sessions) => {
                let (notifier, task) = ConnectionLossNotifier::start(sessions, DEFAULT_QUEUE_CAPACITY);
                (notifier, Some(task))
            }
            None => (ConnectionLossNotifier::logging_only(), None),
        };
        let notifier = Arc::new(notifier);
        deps.stack.on_connection_error(notifier.callback());

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.server_port);
        for protocol in &config.transports {
            if let Err(e) = deps.stack.listen(*protocol, addr).await {
                error!("Failed to listen on {} {}: {}", protocol, addr, e);
                if let Some(task) = notifier_task {
                    if let Err(join) = task.shutdown().await {
                        error!("Connection-loss task failed: {}", join);
                    }
                }
                return Err(e);
            }
            info!("Listening on {} {}", protocol, addr);
        }

        let handlers: Vec<(SipMethod, Arc<dyn SipHandler>)> = vec![
            (SipMethod::Register, Arc::new(RegisterHandler::new(identity.clone(), config.reg_expire))),
            (SipMethod::Message, Arc::new(MessageHandler::new())),
        ];
        for (method, handler) in handlers {
            deps.stack
                .on_request(method, Arc::new(TransactionalHandler::new(handler)));
            info!("Registered handler for SIP method: {}", method);
        }

        Ok(Self {
            identity,
            auth,
            notifier,
            notifier_task,
        })
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn auth_manager(&self) -> Arc<ServerAuthManager> {
        self.auth.clone()
    }

    pub fn notifier(&self) -> Arc<ConnectionLossNotifier> {
        self.notifier.clone()
    }

    pub async fn shutdown(mut self) {
        info!("Shutting down GB28181 server {}", self.identity.server_id());
        if let Some(task) = self.notifier_task.take() {
            if let Err(e) = task.shutdown().await {
                error!("Connection-loss task failed: {}", e);
            }
        }
    }
}
