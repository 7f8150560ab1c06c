//! SIP message handlers

use super::builder::ResponseBuilder;
use super::message::{SipError, SipMethod, SipRequest, SipResponse};
use super::stack::{RequestHandler, ServerTransaction};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Trait for handling SIP requests
#[async_trait]
pub trait SipHandler: Send + Sync {
    /// Handle a SIP request
    async fn handle_request(&self, request: SipRequest) -> Result<SipResponse, SipError>;

    /// Check if this handler can handle the given method
    fn can_handle(&self, method: SipMethod) -> bool;
}

/// Runs a [`SipHandler`] and sends its answer through the transaction.
/// A method the handler does not take is answered with 405, a failing
/// handler with 500.
pub struct TransactionalHandler {
    inner: Arc<dyn SipHandler>,
}

impl TransactionalHandler {
    pub fn new(inner: Arc<dyn SipHandler>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RequestHandler for TransactionalHandler {
    async fn on_request(&self, request: SipRequest, tx: Arc<dyn ServerTransaction>) {
        let accepted = request
            .method()
            .map(|method| self.inner.can_handle(method))
            .unwrap_or(false);

        let outcome = if accepted {
            self.inner.handle_request(request.clone()).await
        } else {
            warn!("No handler accepts {}", request.short());
            ResponseBuilder::method_not_allowed().build_for_request(&request)
        };

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                error!("Handler error for {}: {}", request.short(), e);
                match ResponseBuilder::server_internal_error().build_for_request(&request) {
                    Ok(response) => response,
                    Err(e) => {
                        error!("Failed to build error response: {}", e);
                        return;
                    }
                }
            }
        };

        debug!("Responding {} to {}", response.status_code(), request.short());
        if let Err(e) = tx.respond(response).await {
            error!("Failed to send response: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::Mutex;

    struct Failing;

    #[async_trait]
    impl SipHandler for Failing {
        async fn handle_request(&self, _request: SipRequest) -> Result<SipResponse, SipError> {
            Err(SipError::Internal("boom".to_string()))
        }

        fn can_handle(&self, method: SipMethod) -> bool {
            method == SipMethod::Message
        }
    }

    #[derive(Default)]
    struct Recorded {
        responses: Mutex<Vec<SipResponse>>,
    }

    #[async_trait]
    impl ServerTransaction for Recorded {
        async fn respond(&self, response: SipResponse) -> Result<(), SipError> {
            self.responses.lock().await.push(response);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unaccepted_method_gets_405() {
        let request = SipRequest::parse(
            b"REGISTER sip:34020000002000000001@3402000000 SIP/2.0\r\n\
              Via: SIP/2.0/UDP 192.168.1.64:5060;branch=z9hG4bK1\r\n\
              From: <sip:34020000001320000001@3402000000>;tag=1\r\n\
              To: <sip:34020000001320000001@3402000000>\r\n\
              Call-ID: 8\r\n\
              CSeq: 1 REGISTER\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap();
        let tx = Arc::new(Recorded::default());

        TransactionalHandler::new(Arc::new(Failing))
            .on_request(request, tx.clone())
            .await;

        let responses = tx.responses.lock().await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status_code(), 405);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_500() {
        let request = SipRequest::parse(
            b"MESSAGE sip:34020000002000000001@3402000000 SIP/2.0\r\n\
              Via: SIP/2.0/UDP 192.168.1.64:5060;branch=z9hG4bK1\r\n\
              From: <sip:34020000001320000001@3402000000>;tag=1\r\n\
              To: <sip:34020000002000000001@3402000000>\r\n\
              Call-ID: 7\r\n\
              CSeq: 1 MESSAGE\r\n\
              Content-Length: 0\r\n\r\n",
        )
        .unwrap();
        let tx = Arc::new(Recorded::default());

        TransactionalHandler::new(Arc::new(Failing))
            .on_request(request, tx.clone())
            .await;

        let responses = tx.responses.lock().await;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].status_code(), 500);
    }
}
