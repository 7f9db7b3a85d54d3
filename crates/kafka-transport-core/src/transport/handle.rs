//! The public, thread-safe transport façade.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cert::{CertificateStore, DirectoryTrustStore, TrustedPeerStore, YamlIndexStore};
use crate::config::{Endpoint, TransportOptions};
use crate::error::{Result, TransportError};
use crate::events::EventListeners;
use crate::net::ConnectionFactory;
use crate::queue::RequestQueue;
use crate::transport::driver::TransportDriver;
use crate::transport::request::{ReadRequest, WriteRequest, WritePayload};

struct TransportInner {
    endpoint: Endpoint,
    options: TransportOptions,
    send_queue: Arc<RequestQueue<WriteRequest>>,
    read_queue: Arc<RequestQueue<ReadRequest>>,
    events: Arc<EventListeners>,
    shutdown: CancellationToken,
    disposed: AtomicBool,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for TransportInner {
    fn drop(&mut self) {
        // Last handle gone: stop the loop even without an explicit shutdown.
        self.shutdown.cancel();
    }
}

/// A resilient duplex transport to a single Kafka broker.
///
/// Cheap to clone; all clones share one connection, one transport loop and
/// one pair of request queues. Reads and writes may be enqueued from any
/// task concurrently. Within each direction requests complete in enqueue
/// order; across directions no ordering is promised.
#[derive(Clone)]
pub struct KafkaTransport {
    inner: Arc<TransportInner>,
}

impl KafkaTransport {
    /// Create a transport and start its connection loop.
    ///
    /// Uses the file-based certificate and trusted-peer stores named in the
    /// TLS options. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the options fail validation or the client
    /// certificate cannot be resolved.
    pub fn new(endpoint: Endpoint, options: TransportOptions) -> Result<Self> {
        let (store_index, peers_dir) = match &options.tls {
            Some(tls) => (tls.store_index_path.clone(), tls.trusted_peers_dir.clone()),
            None => (None, None),
        };
        Self::with_stores(
            endpoint,
            options,
            Arc::new(YamlIndexStore::from_options(store_index)),
            Arc::new(DirectoryTrustStore::from_options(peers_dir)),
        )
    }

    /// Create a transport with custom certificate and trusted-peer stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the options fail validation or the client
    /// certificate cannot be resolved.
    pub fn with_stores(
        endpoint: Endpoint,
        options: TransportOptions,
        store: Arc<dyn CertificateStore>,
        trusted_peers: Arc<dyn TrustedPeerStore>,
    ) -> Result<Self> {
        options.validate()?;

        let factory = ConnectionFactory::new(endpoint.clone(), &options, store, trusted_peers)?;

        let send_queue = Arc::new(RequestQueue::new());
        let read_queue = Arc::new(RequestQueue::new());
        let events = Arc::new(EventListeners::default());
        let shutdown = CancellationToken::new();

        let driver = TransportDriver {
            endpoint: endpoint.clone(),
            options: options.clone(),
            factory,
            send_queue: Arc::clone(&send_queue),
            read_queue: Arc::clone(&read_queue),
            events: Arc::clone(&events),
            shutdown: shutdown.clone(),
        };
        let driver_task = tokio::spawn(driver.run());

        Ok(Self {
            inner: Arc::new(TransportInner {
                endpoint,
                options,
                send_queue,
                read_queue,
                events,
                shutdown,
                disposed: AtomicBool::new(false),
                driver: Mutex::new(Some(driver_task)),
            }),
        })
    }

    /// The endpoint this transport is bound to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    /// Read exactly `size` bytes from the connection.
    ///
    /// # Errors
    ///
    /// Fails with `ServerDisconnected` if the stream dies before `size`
    /// bytes arrive, or `Disposed` after shutdown. Never returns a short
    /// buffer.
    pub async fn read(&self, size: u32) -> Result<Bytes> {
        self.read_with_cancel(size, CancellationToken::new()).await
    }

    /// Read exactly `size` bytes, honouring a cancellation token.
    ///
    /// Cancellation cooperates at the next buffer boundary; a read cancelled
    /// after partial bytes were consumed forces a reconnect, since the
    /// stream position is no longer known.
    ///
    /// # Errors
    ///
    /// As [`read`](Self::read), plus `Cancelled`.
    pub async fn read_with_cancel(&self, size: u32, cancel: CancellationToken) -> Result<Bytes> {
        if size == 0 {
            return Err(TransportError::InvalidRequest(
                "read size must be non-zero".to_string(),
            ));
        }

        let (done, completion) = oneshot::channel();
        let request = ReadRequest { size, done, cancel };
        if self.inner.read_queue.push(request).is_err() {
            return Err(TransportError::Disposed);
        }

        match completion.await {
            Ok(result) => result,
            Err(_) => Err(self.abandoned_error()),
        }
    }

    /// Write a payload to the connection.
    ///
    /// Resolves with the payload once the buffer has been written in full.
    /// A failed write may have been partially transmitted; the caller must
    /// not assume atomicity.
    ///
    /// # Errors
    ///
    /// Fails with the underlying I/O error, or `Disposed` after shutdown.
    pub async fn write(&self, payload: WritePayload) -> Result<WritePayload> {
        self.write_with_cancel(payload, CancellationToken::new())
            .await
    }

    /// Write a payload, honouring a cancellation token.
    ///
    /// Cancellation only applies while the request is still queued; an
    /// in-flight write is never interrupted.
    ///
    /// # Errors
    ///
    /// As [`write`](Self::write), plus `Cancelled`.
    pub async fn write_with_cancel(
        &self,
        payload: WritePayload,
        cancel: CancellationToken,
    ) -> Result<WritePayload> {
        let (done, completion) = oneshot::channel();
        let request = WriteRequest {
            payload,
            done,
            cancel,
        };
        if self.inner.send_queue.push(request).is_err() {
            return Err(TransportError::Disposed);
        }

        match completion.await {
            Ok(result) => result,
            Err(_) => Err(self.abandoned_error()),
        }
    }

    /// Subscribe to server-disconnect notifications.
    pub fn on_server_disconnected(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.inner
            .events
            .add_server_disconnected(Box::new(listener));
    }

    /// Subscribe to connection attempts; the argument is the attempt number
    /// within the current reconnect sequence.
    pub fn on_reconnection_attempt(&self, listener: impl Fn(u32) + Send + Sync + 'static) {
        self.inner
            .events
            .add_reconnection_attempt(Box::new(listener));
    }

    /// Subscribe to socket read attempts; the argument is the number of
    /// bytes still outstanding for the current request.
    pub fn on_read_from_socket_attempt(&self, listener: impl Fn(usize) + Send + Sync + 'static) {
        self.inner.events.add_read_attempt(Box::new(listener));
    }

    /// Subscribe to completed socket reads; the argument is the chunk size.
    pub fn on_bytes_received(&self, listener: impl Fn(usize) + Send + Sync + 'static) {
        self.inner.events.add_bytes_received(Box::new(listener));
    }

    /// Subscribe to socket write attempts.
    pub fn on_write_to_socket_attempt(
        &self,
        listener: impl Fn(&WritePayload) + Send + Sync + 'static,
    ) {
        self.inner.events.add_write_attempt(Box::new(listener));
    }

    /// Shut the transport down.
    ///
    /// Idempotent and safe to call from any task. Signals the transport
    /// loop, fails every pending and future request with `Disposed`, and
    /// waits up to the configured shutdown timeout for the loop to exit.
    pub async fn shutdown(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.shutdown.cancel();
        self.inner.send_queue.close_and_drain(|request| {
            let _ = request.done.send(Err(TransportError::Disposed));
        });
        self.inner.read_queue.close_and_drain(|request| {
            let _ = request.done.send(Err(TransportError::Disposed));
        });

        let driver = {
            let mut guard = self
                .inner
                .driver
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(task) = driver {
            if timeout(self.inner.options.shutdown_timeout(), task)
                .await
                .is_err()
            {
                warn!(
                    endpoint = %self.inner.endpoint,
                    "transport loop did not exit within the shutdown timeout"
                );
            }
        }
    }

    /// Error for a request whose completion was dropped: the loop abandoned
    /// it either because the transport was disposed or because the session
    /// was torn down mid-operation.
    fn abandoned_error(&self) -> TransportError {
        if self.inner.shutdown.is_cancelled() {
            TransportError::Disposed
        } else {
            TransportError::ServerDisconnected
        }
    }
}
