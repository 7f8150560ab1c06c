//! SIP Digest Authentication (RFC 2617, RFC 3261)
//!
//! `ServerAuthManager` is what the SIP stack consults before a request is
//! handed to its handler: the challenge policy says whether credentials are
//! needed, the digest authenticator checks them against the credential
//! resolver.

use super::builder::ResponseBuilder;
use super::challenge::ChallengePolicy;
use super::message::{header_value, SipError, SipMethod, SipRequest, SipResponse};
use super::params::split_unquoted;
use crate::domain::device::credential::{resolve_with_deadline, CredentialResolver};
use crate::domain::shared::error::DomainError;
use async_trait::async_trait;
use rand::Rng;
use rsip::Header;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Nonce lifetime
const NONCE_TTL: Duration = Duration::from_secs(300);

/// Outstanding challenges kept at most; the oldest is evicted beyond this
pub const DEFAULT_NONCE_CAPACITY: usize = 4096;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No Authorization header found")]
    MissingCredentials,

    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Invalid or expired nonce")]
    StaleNonce,

    #[error("Credential store unavailable: {0}")]
    Unavailable(String),
}

/// SIP authenticator trait
#[async_trait]
pub trait SipAuthenticator: Send + Sync {
    /// Generate an authentication challenge
    async fn create_challenge(&self, stale: bool) -> AuthChallenge;

    /// Verify the credentials of a request, returning the authenticated identity
    async fn verify_request(&self, request: &SipRequest) -> Result<String, AuthError>;
}

/// Authentication challenge
#[derive(Debug, Clone)]
pub struct AuthChallenge {
    pub realm: String,
    pub nonce: String,
    pub algorithm: String,
    pub qop: Option<String>,
    pub stale: bool,
}

impl AuthChallenge {
    /// Create a new authentication challenge
    pub fn new(realm: &str) -> Self {
        Self {
            realm: realm.to_string(),
            nonce: Self::generate_nonce(),
            algorithm: "MD5".to_string(),
            qop: Some("auth".to_string()),
            stale: false,
        }
    }

    /// Generate a random nonce
    fn generate_nonce() -> String {
        let mut rng = rand::thread_rng();
        let random_bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
        hex::encode(random_bytes)
    }

    /// Format as WWW-Authenticate / Proxy-Authenticate header value
    pub fn to_header_value(&self) -> String {
        let mut value = format!(
            r#"Digest realm="{}", nonce="{}", algorithm={}"#,
            self.realm, self.nonce, self.algorithm
        );
        if let Some(qop) = &self.qop {
            value.push_str(&format!(r#", qop="{}""#, qop));
        }
        if self.stale {
            value.push_str(", stale=TRUE");
        }
        value
    }
}

/// Parsed Authorization header
#[derive(Debug, Clone)]
pub struct AuthorizationHeader {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub algorithm: Option<String>,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
}

impl AuthorizationHeader {
    /// Parse Authorization or Proxy-Authorization header from request
    pub fn from_request(request: &SipRequest) -> Result<Self, AuthError> {
        let auth_value = request
            .headers()
            .iter()
            .find(|h| matches!(h, Header::Authorization(_) | Header::ProxyAuthorization(_)))
            .map(header_value)
            .ok_or(AuthError::MissingCredentials)?;

        debug!("Parsing Authorization header: {}", auth_value);
        Self::parse(&auth_value)
    }

    pub fn parse(auth_value: &str) -> Result<Self, AuthError> {
        let params = Self::parse_digest_params(auth_value);

        let required = |name: &str| {
            params.get(name).cloned().ok_or_else(|| {
                AuthError::InvalidCredentials(format!("Missing {} in Authorization", name))
            })
        };

        Ok(Self {
            username: required("username")?,
            realm: required("realm")?,
            nonce: required("nonce")?,
            uri: required("uri")?,
            response: required("response")?,
            algorithm: params.get("algorithm").cloned(),
            qop: params.get("qop").cloned(),
            nc: params.get("nc").cloned(),
            cnonce: params.get("cnonce").cloned(),
        })
    }

    /// Parse Digest authentication parameters
    fn parse_digest_params(auth_value: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();

        let trimmed = auth_value.trim();
        let digest_str = match trimmed.split_once(char::is_whitespace) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("Digest") => rest.trim(),
            _ => trimmed,
        };

        for part in split_unquoted(digest_str, ',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                let key = key.trim().to_ascii_lowercase();
                let value = value.trim().trim_matches('"');
                params.insert(key, value.to_string());
            }
        }

        params
    }
}

/// RFC 2617 digest response
#[allow(clippy::too_many_arguments)]
pub fn digest_response(
    username: &str,
    password: &str,
    realm: &str,
    nonce: &str,
    method: &str,
    uri: &str,
    qop: Option<&str>,
    nc: Option<&str>,
    cnonce: Option<&str>,
) -> String {
    // HA1 = MD5(username:realm:password)
    let ha1 = format!("{:x}", md5::compute(format!("{}:{}:{}", username, realm, password)));

    // HA2 = MD5(method:uri)
    let ha2 = format!("{:x}", md5::compute(format!("{}:{}", method, uri)));

    match qop {
        Some(qop_value) => {
            let nc_value = nc.unwrap_or("00000001");
            let cnonce_value = cnonce.unwrap_or("");
            format!(
                "{:x}",
                md5::compute(format!(
                    "{}:{}:{}:{}:{}:{}",
                    ha1, nonce, nc_value, cnonce_value, qop_value, ha2
                ))
            )
        }
        None => format!("{:x}", md5::compute(format!("{}:{}:{}", ha1, nonce, ha2))),
    }
}

/// Issue time and highest nonce count accepted for one nonce
#[derive(Debug, Clone, Copy)]
struct NonceState {
    issued: Instant,
    last_nc: u32,
}

/// Digest authenticator backed by a credential resolver
pub struct DigestAuthenticator {
    realm: String,
    resolver: Arc<dyn CredentialResolver>,
    lookup_timeout: Duration,
    nonce_capacity: usize,
    active_nonces: Arc<RwLock<HashMap<String, NonceState>>>,
}

impl DigestAuthenticator {
    pub fn new(
        realm: impl Into<String>,
        resolver: Arc<dyn CredentialResolver>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            realm: realm.into(),
            resolver,
            lookup_timeout,
            nonce_capacity: DEFAULT_NONCE_CAPACITY,
            active_nonces: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_nonce_capacity(mut self, capacity: usize) -> Self {
        self.nonce_capacity = capacity.max(1);
        self
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    pub async fn active_nonce_count(&self) -> usize {
        self.active_nonces.read().await.len()
    }

    /// Drop nonces older than their lifetime
    pub async fn cleanup_nonces(&self) {
        let mut nonces = self.active_nonces.write().await;
        nonces.retain(|_, state| state.issued.elapsed() < NONCE_TTL);
    }

    async fn check_nonce(&self, nonce: &str) -> Result<(), AuthError> {
        let nonces = self.active_nonces.read().await;
        match nonces.get(nonce) {
            Some(state) if state.issued.elapsed() < NONCE_TTL => Ok(()),
            _ => Err(AuthError::StaleNonce),
        }
    }

    /// Record a verified use of a nonce. With qop the nonce count must grow
    /// on every use; without qop the nonce is good for one request only.
    async fn consume_nonce(&self, auth: &AuthorizationHeader) -> Result<(), AuthError> {
        let mut nonces = self.active_nonces.write().await;

        let Some(state) = nonces.get(&auth.nonce).copied() else {
            return Err(AuthError::StaleNonce);
        };
        if state.issued.elapsed() >= NONCE_TTL {
            nonces.remove(&auth.nonce);
            return Err(AuthError::StaleNonce);
        }

        if auth.qop.is_none() {
            nonces.remove(&auth.nonce);
            return Ok(());
        }

        let nc = auth
            .nc
            .as_deref()
            .and_then(|nc| u32::from_str_radix(nc, 16).ok())
            .ok_or_else(|| AuthError::InvalidCredentials("Missing or malformed nc".to_string()))?;
        if nc <= state.last_nc {
            warn!(
                "Replayed nonce count {:08x} for {} (last {:08x})",
                nc, auth.username, state.last_nc
            );
            return Err(AuthError::InvalidCredentials("Nonce count replayed".to_string()));
        }
        nonces.insert(
            auth.nonce.clone(),
            NonceState {
                last_nc: nc,
                ..state
            },
        );
        Ok(())
    }
}

#[async_trait]
impl SipAuthenticator for DigestAuthenticator {
    async fn create_challenge(&self, stale: bool) -> AuthChallenge {
        let mut challenge = AuthChallenge::new(&self.realm);
        challenge.stale = stale;

        let mut nonces = self.active_nonces.write().await;
        nonces.retain(|_, state| state.issued.elapsed() < NONCE_TTL);
        while nonces.len() >= self.nonce_capacity {
            let oldest = nonces
                .iter()
                .min_by_key(|(_, state)| state.issued)
                .map(|(nonce, _)| nonce.clone());
            match oldest {
                Some(nonce) => {
                    nonces.remove(&nonce);
                }
                None => break,
            }
        }
        nonces.insert(
            challenge.nonce.clone(),
            NonceState {
                issued: Instant::now(),
                last_nc: 0,
            },
        );

        debug!("Created auth challenge with nonce: {}", challenge.nonce);
        challenge
    }

    async fn verify_request(&self, request: &SipRequest) -> Result<String, AuthError> {
        let auth = AuthorizationHeader::from_request(request)?;

        self.check_nonce(&auth.nonce).await?;

        let credential =
            resolve_with_deadline(self.resolver.as_ref(), &auth.username, self.lookup_timeout)
                .await
                .map_err(|e| match e {
                    DomainError::NotFound(_) => {
                        warn!("Authentication failed: unknown device {}", auth.username);
                        AuthError::UnknownIdentity(auth.username.clone())
                    }
                    other => AuthError::Unavailable(other.to_string()),
                })?;

        if auth.realm != credential.realm {
            warn!(
                "Realm mismatch for {}: expected {}, got {}",
                auth.username, credential.realm, auth.realm
            );
            return Err(AuthError::InvalidCredentials("Realm mismatch".to_string()));
        }

        let expected = digest_response(
            &auth.username,
            &credential.secret,
            &auth.realm,
            &auth.nonce,
            &request.inner.method.to_string(),
            &auth.uri,
            auth.qop.as_deref(),
            auth.nc.as_deref(),
            auth.cnonce.as_deref(),
        );

        if !auth.response.eq_ignore_ascii_case(&expected) {
            warn!("Authentication failed for {}: response mismatch", auth.username);
            return Err(AuthError::InvalidCredentials(
                "Digest response mismatch".to_string(),
            ));
        }

        self.consume_nonce(&auth).await?;

        info!("Authentication successful for device: {}", auth.username);
        Ok(auth.username)
    }
}

/// Result of running a request through the auth manager
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// Pass the request on to its handler
    Admitted { identity: Option<String> },
    /// Answer with this response instead
    Rejected(SipResponse),
}

impl AuthOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AuthOutcome::Admitted { .. })
    }
}

/// The auth manager handed to the SIP stack
#[derive(Clone)]
pub struct ServerAuthManager {
    authenticator: Option<Arc<dyn SipAuthenticator>>,
    policy: Arc<ChallengePolicy>,
}

impl ServerAuthManager {
    /// `authenticator` is `None` when authentication is disabled
    pub fn new(
        authenticator: Option<Arc<dyn SipAuthenticator>>,
        policy: Arc<ChallengePolicy>,
    ) -> Self {
        Self {
            authenticator,
            policy,
        }
    }

    pub fn policy(&self) -> &ChallengePolicy {
        &self.policy
    }

    pub fn requires_challenge(&self, request: &SipRequest) -> bool {
        self.policy.decide(request).is_required()
    }

    pub async fn authorize(&self, request: &SipRequest) -> Result<AuthOutcome, SipError> {
        let Some(authenticator) = &self.authenticator else {
            return Ok(AuthOutcome::Admitted { identity: None });
        };

        if !self.requires_challenge(request) {
            return Ok(AuthOutcome::Admitted { identity: None });
        }

        match authenticator.verify_request(request).await {
            Ok(identity) => Ok(AuthOutcome::Admitted {
                identity: Some(identity),
            }),
            Err(AuthError::MissingCredentials) => {
                debug!("{} without credentials - sending challenge", request.short());
                let challenge = authenticator.create_challenge(false).await;
                Ok(AuthOutcome::Rejected(Self::challenge_response(request, &challenge)?))
            }
            Err(AuthError::UnknownIdentity(identity)) => {
                warn!("Rejecting request from unknown device {}", identity);
                Ok(AuthOutcome::Rejected(
                    ResponseBuilder::forbidden().build_for_request(request)?,
                ))
            }
            Err(AuthError::Unavailable(reason)) => {
                warn!("Credential lookup failed: {}", reason);
                Ok(AuthOutcome::Rejected(
                    ResponseBuilder::service_unavailable().build_for_request(request)?,
                ))
            }
            Err(e) => {
                warn!("Authentication failed: {}", e);
                let stale = matches!(e, AuthError::StaleNonce);
                let challenge = authenticator.create_challenge(stale).await;
                Ok(AuthOutcome::Rejected(Self::challenge_response(request, &challenge)?))
            }
        }
    }

    /// 401 with WWW-Authenticate for REGISTER, 407 with Proxy-Authenticate
    /// for everything else
    fn challenge_response(
        request: &SipRequest,
        challenge: &AuthChallenge,
    ) -> Result<SipResponse, SipError> {
        let (builder, header) = if request.method() == Some(SipMethod::Register) {
            (ResponseBuilder::unauthorized(), "WWW-Authenticate")
        } else {
            (ResponseBuilder::proxy_auth_required(), "Proxy-Authenticate")
        };

        builder
            .header(Header::Other(
                header.to_string(),
                challenge.to_header_value(),
            ))
            .build_for_request(request)
    }
}
