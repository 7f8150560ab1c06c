//! SIP side of the GB28181 platform
//!
//! Challenge policy, digest authentication, Contact enrichment, outbound
//! request construction and connection-loss notification. The transport
//! stack itself is abstracted behind [`stack::SipStack`].

pub mod auth;
pub mod builder;
pub mod challenge;
pub mod contact;
pub mod handler;
pub mod manscdp;
pub mod message;
pub mod message_handler;
pub mod notifier;
pub mod params;
pub mod registrar;
pub mod server;
pub mod stack;
pub mod transport;
pub mod utils;

pub use auth::{
    AuthChallenge, AuthError, AuthOutcome, AuthorizationHeader, DigestAuthenticator,
    ServerAuthManager, SipAuthenticator,
};
pub use builder::{build_request, RequestBuilder, ResponseBuilder, SipAddress};
pub use challenge::{ChallengeDecision, ChallengePolicy, ChallengeRule, DialogLookup};
pub use contact::{add_params_to_contact, build_contact_header, copy_headers, ContactHeader};
pub use handler::{SipHandler, TransactionalHandler};
pub use manscdp::ManscdpMessage;
pub use message::{SipError, SipMethod, SipRequest, SipResponse};
pub use message_handler::MessageHandler;
pub use notifier::{ConnectionLossNotifier, NotifierTask, SessionRegistry};
pub use params::{params_to_string, ParamValue, SipParams};
pub use registrar::RegisterHandler;
pub use server::{GbServer, ServerDeps};
pub use stack::{ConnectionErrorCallback, RequestHandler, ServerTransaction, SipStack};
pub use transport::{ConnectionError, TransportProtocol};
