//! End-to-end tests of the GB28181 server over an in-process SIP stack

use async_trait::async_trait;
use futures::future::join_all;
use gb28181_sip::domain::device::{
    Credential, CredentialResolver, DeviceRecord, InMemoryDeviceRegistry,
    RegistryCredentialResolver, SharedSecretResolver,
};
use gb28181_sip::domain::DomainError;
use gb28181_sip::infrastructure::protocols::sip::auth::digest_response;
use gb28181_sip::infrastructure::protocols::sip::{
    AuthOutcome, ConnectionError, ConnectionErrorCallback, RequestHandler, ServerAuthManager,
    ServerTransaction, SessionRegistry, SipError, SipMethod, SipRequest, SipResponse, SipStack,
    TransportProtocol,
};
use gb28181_sip::{GbServer, ServerConfig, ServerDeps};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DEVICE: &str = "34020000001320000001";
const REALM: &str = "3402000000";
const PASSWORD: &str = "12345678";
const REQUEST_URI: &str = "sip:34020000002000000001@3402000000";

/// SIP stack that keeps everything in memory and dispatches raw requests
#[derive(Default)]
struct LoopbackStack {
    listening: Mutex<Vec<(TransportProtocol, SocketAddr)>>,
    handlers: Mutex<HashMap<SipMethod, Arc<dyn RequestHandler>>>,
    auth: Mutex<Option<Arc<ServerAuthManager>>>,
    on_error: Mutex<Option<ConnectionErrorCallback>>,
    refuse: Option<TransportProtocol>,
}

impl LoopbackStack {
    fn refusing(protocol: TransportProtocol) -> Self {
        Self {
            refuse: Some(protocol),
            ..Self::default()
        }
    }

    async fn dispatch(&self, raw: &str) -> SipResponse {
        let request = SipRequest::parse(raw.as_bytes()).unwrap();

        let auth = self.auth.lock().unwrap().clone();
        if let Some(auth) = auth {
            if let AuthOutcome::Rejected(response) = auth.authorize(&request).await.unwrap() {
                return response;
            }
        }

        let handler = self
            .handlers
            .lock()
            .unwrap()
            .get(&request.method().unwrap())
            .cloned()
            .expect("no handler for method");

        let tx = Arc::new(RecordingTransaction::default());
        handler.on_request(request, tx.clone()).await;
        let response = tx.response.lock().unwrap().take();
        response.expect("handler did not respond")
    }

    fn lose_connection(&self, event: ConnectionError) {
        let callback = self.on_error.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }
}

#[async_trait]
impl SipStack for LoopbackStack {
    async fn listen(&self, protocol: TransportProtocol, addr: SocketAddr) -> Result<(), SipError> {
        if self.refuse == Some(protocol) {
            return Err(SipError::TransportError(format!("{} {} in use", protocol, addr)));
        }
        self.listening.lock().unwrap().push((protocol, addr));
        Ok(())
    }

    fn on_request(&self, method: SipMethod, handler: Arc<dyn RequestHandler>) {
        self.handlers.lock().unwrap().insert(method, handler);
    }

    fn on_connection_error(&self, callback: ConnectionErrorCallback) {
        *self.on_error.lock().unwrap() = Some(callback);
    }

    fn set_auth_manager(&self, manager: Arc<ServerAuthManager>) {
        *self.auth.lock().unwrap() = Some(manager);
    }
}

#[derive(Default)]
struct RecordingTransaction {
    response: Mutex<Option<SipResponse>>,
}

#[async_trait]
impl ServerTransaction for RecordingTransaction {
    async fn respond(&self, response: SipResponse) -> Result<(), SipError> {
        *self.response.lock().unwrap() = Some(response);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSessions {
    lost: Mutex<Vec<ConnectionError>>,
}

#[async_trait]
impl SessionRegistry for RecordingSessions {
    async fn handle_connection_error(&self, error: &ConnectionError) {
        self.lost.lock().unwrap().push(error.clone());
    }
}

struct StalledResolver;

#[async_trait]
impl CredentialResolver for StalledResolver {
    async fn resolve(&self, public_id: &str) -> gb28181_sip::Result<Credential> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Err(DomainError::NotFound(public_id.to_string()))
    }
}

fn register(authorization: Option<&str>) -> String {
    let mut raw = format!(
        "REGISTER {uri} SIP/2.0\r\n\
         Via: SIP/2.0/UDP 192.168.1.64:5060;rport;branch=z9hG4bK1371463273\r\n\
         From: <sip:{dev}@{realm}>;tag=2043466181\r\n\
         To: <sip:{dev}@{realm}>\r\n\
         Call-ID: 1011047669\r\n\
         CSeq: 1 REGISTER\r\n\
         Contact: <sip:{dev}@192.168.1.64:5060>;+sip.instance=\"urn:uuid:0001\"\r\n\
         Max-Forwards: 70\r\n\
         User-Agent: IP Camera\r\n\
         Expires: 3600\r\n",
        uri = REQUEST_URI,
        dev = DEVICE,
        realm = REALM,
    );
    if let Some(value) = authorization {
        raw.push_str(&format!("Authorization: {}\r\n", value));
    }
    raw.push_str("Content-Length: 0\r\n\r\n");
    raw
}

fn keepalive(sn: u32) -> String {
    let body = format!(
        "<?xml version=\"1.0\"?>\r\n<Notify>\r\n<CmdType>Keepalive</CmdType>\r\n\
         <SN>{}</SN>\r\n<DeviceID>{}</DeviceID>\r\n<Status>OK</Status>\r\n</Notify>\r\n",
        sn, DEVICE
    );
    format!(
        "MESSAGE {uri} SIP/2.0\r\n\
         Via: SIP/2.0/UDP 192.168.1.64:5060;rport;branch=z9hG4bK{sn}\r\n\
         From: <sip:{dev}@{realm}>;tag={sn}\r\n\
         To: <sip:34020000002000000001@{realm}>\r\n\
         Call-ID: keepalive-{sn}\r\n\
         CSeq: {sn} MESSAGE\r\n\
         Content-Type: Application/MANSCDP+xml\r\n\
         Max-Forwards: 70\r\n\
         Content-Length: {len}\r\n\r\n{body}",
        uri = REQUEST_URI,
        dev = DEVICE,
        realm = REALM,
        sn = sn,
        len = body.len(),
        body = body,
    )
}

fn challenge_nonce(response: &SipResponse) -> String {
    let value = response.header("WWW-Authenticate").expect("missing challenge");
    let start = value.find("nonce=\"").expect("missing nonce") + "nonce=\"".len();
    let end = value[start..].find('"').unwrap() + start;
    value[start..end].to_string()
}

fn authorization(username: &str, password: &str, nonce: &str) -> String {
    let response = digest_response(
        username,
        password,
        REALM,
        nonce,
        "REGISTER",
        REQUEST_URI,
        Some("auth"),
        Some("00000001"),
        Some("0a4f113b"),
    );
    format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", \
         response=\"{}\", algorithm=MD5, qop=auth, nc=00000001, cnonce=\"0a4f113b\"",
        username, REALM, nonce, REQUEST_URI, response
    )
}

async fn start(stack: Arc<LoopbackStack>, resolver: Arc<dyn CredentialResolver>) -> GbServer {
    GbServer::start(&ServerConfig::default(), ServerDeps::new(stack, resolver))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_register_challenge_then_admit() {
    let stack = Arc::new(LoopbackStack::default());
    let server = start(stack.clone(), Arc::new(SharedSecretResolver::new(REALM, PASSWORD))).await;

    let challenge = stack.dispatch(&register(None)).await;
    assert_eq!(challenge.status_code(), 401);
    let nonce = challenge_nonce(&challenge);

    let auth = authorization(DEVICE, PASSWORD, &nonce);
    let response = stack.dispatch(&register(Some(&auth))).await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("Expires"), Some("3600".to_string()));
    assert!(response.header("Date").is_some());

    let contacts = response.header_values("Contact");
    assert_eq!(contacts.len(), 1);
    assert!(contacts[0].contains("expires=3600"));
    assert!(contacts[0].contains("+sip.instance=\"urn:uuid:0001\""));
    assert!(!contacts[0].contains("\"\""));

    server.shutdown().await;
}

#[tokio::test]
async fn test_register_with_wrong_password_is_challenged_again() {
    let stack = Arc::new(LoopbackStack::default());
    let _server = start(stack.clone(), Arc::new(SharedSecretResolver::new(REALM, PASSWORD))).await;

    let nonce = challenge_nonce(&stack.dispatch(&register(None)).await);
    let auth = authorization(DEVICE, "wrong", &nonce);
    let response = stack.dispatch(&register(Some(&auth))).await;

    assert_eq!(response.status_code(), 401);
    assert_ne!(challenge_nonce(&response), nonce);
}

#[tokio::test]
async fn test_replayed_register_is_challenged() {
    let stack = Arc::new(LoopbackStack::default());
    let _server = start(stack.clone(), Arc::new(SharedSecretResolver::new(REALM, PASSWORD))).await;

    let nonce = challenge_nonce(&stack.dispatch(&register(None)).await);
    let raw = register(Some(&authorization(DEVICE, PASSWORD, &nonce)));

    assert_eq!(stack.dispatch(&raw).await.status_code(), 200);
    assert_eq!(stack.dispatch(&raw).await.status_code(), 401);
}

#[tokio::test]
async fn test_register_without_expires_gets_configured_lifetime() {
    let stack = Arc::new(LoopbackStack::default());
    let config = ServerConfig {
        disable_auth: true,
        reg_expire: 1800,
        ..ServerConfig::default()
    };
    let _server = GbServer::start(
        &config,
        ServerDeps::new(stack.clone(), Arc::new(StalledResolver)),
    )
    .await
    .unwrap();

    let raw = register(None).replace("Expires: 3600\r\n", "");
    let response = stack.dispatch(&raw).await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(response.header("Expires"), Some("1800".to_string()));
    assert!(response.header("Contact").unwrap().contains("expires=1800"));
}

#[tokio::test]
async fn test_unknown_device_is_forbidden() {
    let registry = Arc::new(InMemoryDeviceRegistry::new());
    registry
        .add_device(DeviceRecord::new("34020000001320000099", PASSWORD))
        .await;
    let resolver = Arc::new(RegistryCredentialResolver::new(registry, REALM));

    let stack = Arc::new(LoopbackStack::default());
    let _server = start(stack.clone(), resolver).await;

    let nonce = challenge_nonce(&stack.dispatch(&register(None)).await);
    let auth = authorization(DEVICE, PASSWORD, &nonce);
    let response = stack.dispatch(&register(Some(&auth))).await;

    assert_eq!(response.status_code(), 403);
}

#[tokio::test]
async fn test_stalled_credential_store_answers_503() {
    let stack = Arc::new(LoopbackStack::default());
    let config = ServerConfig {
        credential_lookup_timeout_ms: 50,
        ..ServerConfig::default()
    };
    let _server = GbServer::start(
        &config,
        ServerDeps::new(stack.clone(), Arc::new(StalledResolver)),
    )
    .await
    .unwrap();

    let nonce = challenge_nonce(&stack.dispatch(&register(None)).await);
    let auth = authorization(DEVICE, PASSWORD, &nonce);
    let response = stack.dispatch(&register(Some(&auth))).await;

    assert_eq!(response.status_code(), 503);
}

#[tokio::test]
async fn test_keepalive_messages_are_answered_without_credentials() {
    let stack = Arc::new(LoopbackStack::default());
    let _server = start(stack.clone(), Arc::new(SharedSecretResolver::new(REALM, PASSWORD))).await;

    let requests: Vec<String> = (1..=5).map(keepalive).collect();
    let responses = join_all(requests.iter().map(|raw| stack.dispatch(raw))).await;

    assert_eq!(responses.len(), 5);
    assert!(responses.iter().all(|r| r.status_code() == 200));
}

#[tokio::test]
async fn test_disabled_auth_admits_register_directly() {
    let stack = Arc::new(LoopbackStack::default());
    let config = ServerConfig {
        disable_auth: true,
        ..ServerConfig::default()
    };
    let _server = GbServer::start(
        &config,
        ServerDeps::new(stack.clone(), Arc::new(StalledResolver)),
    )
    .await
    .unwrap();

    let response = stack.dispatch(&register(None)).await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn test_lost_connection_reaches_session_registry() {
    let stack = Arc::new(LoopbackStack::default());
    let sessions = Arc::new(RecordingSessions::default());
    let deps = ServerDeps::new(stack.clone(), Arc::new(SharedSecretResolver::new(REALM, PASSWORD)))
        .with_sessions(sessions.clone());
    let server = GbServer::start(&ServerConfig::default(), deps).await.unwrap();

    stack.lose_connection(ConnectionError::new(
        "192.168.1.64:5060",
        "0.0.0.0:5060",
        "tcp",
    ));

    for _ in 0..50 {
        if !sessions.lost.lock().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let lost = sessions.lost.lock().unwrap().clone();
    assert_eq!(lost.len(), 1);
    assert_eq!(lost[0].network, "tcp");

    server.shutdown().await;
}

#[test]
fn test_start_fails_when_transport_cannot_bind() {
    let stack = Arc::new(LoopbackStack::refusing(TransportProtocol::Tcp));
    let deps = ServerDeps::new(
        stack.clone(),
        Arc::new(SharedSecretResolver::new(REALM, PASSWORD)),
    );

    let result = tokio_test::block_on(GbServer::start(&ServerConfig::default(), deps));

    assert!(matches!(result, Err(SipError::TransportError(_))));
    assert_eq!(stack.listening.lock().unwrap().len(), 1);
    assert!(stack.handlers.lock().unwrap().is_empty());
}
