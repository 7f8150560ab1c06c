//! Connection-loss notification
//!
//! The stack reports lost connections on its own error path. The notifier
//! logs the event and queues it for session bookkeeping without ever
//! waiting: when the queue is full the event is dropped.

use super::stack::ConnectionErrorCallback;
use super::transport::ConnectionError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Session bookkeeping that invalidates whatever rode on a lost connection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn handle_connection_error(&self, error: &ConnectionError);
}

/// The task draining a notifier's queue
pub struct NotifierTask {
    handle: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

impl NotifierTask {
    /// Refuse further events, deliver the queued ones and wait for the task
    pub async fn shutdown(self) -> Result<(), JoinError> {
        if self.shutdown.send(()).is_err() {
            debug!("Connection-loss task already stopped");
        }
        self.handle.await
    }
}

pub struct ConnectionLossNotifier {
    tx: Option<mpsc::Sender<ConnectionError>>,
}

impl ConnectionLossNotifier {
    /// Notifier that only logs
    pub fn logging_only() -> Self {
        Self { tx: None }
    }

    /// Notifier plus the receiving end of its queue
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ConnectionError>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// Notifier whose events are drained into `registry` by a spawned task.
    /// The task ends on [`NotifierTask::shutdown`] or once every clone of
    /// the notifier is dropped.
    pub fn start(registry: Arc<dyn SessionRegistry>, capacity: usize) -> (Self, NotifierTask) {
        let (notifier, mut rx) = Self::channel(capacity);
        let (shutdown, mut shutdown_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = rx.recv() => match event {
                        Some(event) => registry.handle_connection_error(&event).await,
                        None => break,
                    },
                    _ = &mut shutdown_rx => {
                        rx.close();
                        while let Some(event) = rx.recv().await {
                            registry.handle_connection_error(&event).await;
                        }
                        break;
                    }
                }
            }
            debug!("Connection-loss queue closed");
        });

        (notifier, NotifierTask { handle, shutdown })
    }

    /// Log and queue `event`. Returns whether it was queued.
    pub fn notify(&self, event: ConnectionError) -> bool {
        debug!(
            "Handle Connection Lost: Source: {}, Dest: {}, Network: {}",
            event.source, event.destination, event.network
        );

        let Some(tx) = &self.tx else {
            return false;
        };

        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Connection-loss queue full, dropping event {}", event);
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!("Connection-loss queue closed, dropping event {}", event);
                false
            }
        }
    }

    /// Callback to register with the stack
    pub fn callback(self: &Arc<Self>) -> ConnectionErrorCallback {
        let notifier = Arc::clone(self);
        Arc::new(move |event| {
            notifier.notify(event);
        })
    }
}
