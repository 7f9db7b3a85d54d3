//! The transport loop: the single task owning the connection.
//!
//! The loop pulls requests from the send and read queues, executes them
//! against the live stream, and reconnects with backoff when the stream
//! dies. The stream is split once per session; each direction has at most
//! one operation in flight, spawned with ownership of its half and joined
//! before the next operation starts. One writer plus one reader on the same
//! stream is safe; a second of either would corrupt framing.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::config::{Endpoint, TransportOptions};
use crate::error::{Result, TransportError};
use crate::events::EventListeners;
use crate::net::{ConnectionFactory, TransportStream};
use crate::queue::RequestQueue;
use crate::transport::request::{ReadRequest, WriteRequest};

/// Upper bound on a single socket read.
const READ_CHUNK: usize = 64 * 1024;

type WriterTask = JoinHandle<(WriteHalf<TransportStream>, Result<()>)>;
type ReaderTask = JoinHandle<(ReadHalf<TransportStream>, Result<()>)>;

pub(crate) struct TransportDriver {
    pub(crate) endpoint: Endpoint,
    pub(crate) options: TransportOptions,
    pub(crate) factory: ConnectionFactory,
    pub(crate) send_queue: Arc<RequestQueue<WriteRequest>>,
    pub(crate) read_queue: Arc<RequestQueue<ReadRequest>>,
    pub(crate) events: Arc<EventListeners>,
    pub(crate) shutdown: CancellationToken,
}

impl TransportDriver {
    /// Run sessions until the transport is disposed.
    pub(crate) async fn run(self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            match self.run_session().await {
                Err(TransportError::Disposed) => break,
                Err(TransportError::ServerDisconnected) => {
                    debug!(endpoint = %self.endpoint, "server disconnected");
                    self.events.emit_server_disconnected();
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "session ended");
                }
                Ok(()) => {}
            }
        }
        self.drain_disposed();
        debug!(endpoint = %self.endpoint, "transport loop exited");
    }

    /// Fail every still-queued request with `Disposed`.
    fn drain_disposed(&self) {
        self.send_queue.close_and_drain(|request| {
            let _ = request.done.send(Err(TransportError::Disposed));
        });
        self.read_queue.close_and_drain(|request| {
            let _ = request.done.send(Err(TransportError::Disposed));
        });
    }

    /// Connect with backoff, then service requests until the stream dies.
    async fn run_session(&self) -> Result<()> {
        let stream = self.establish().await?;
        let (read_half, write_half) = tokio::io::split(stream);

        let mut idle_writer = Some(write_half);
        let mut idle_reader = Some(read_half);
        let mut writer_task: Option<WriterTask> = None;
        let mut reader_task: Option<ReaderTask> = None;

        let err = 'session: loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    break 'session TransportError::Disposed;
                }

                joined = join_slot(&mut writer_task), if writer_task.is_some() => {
                    writer_task = None;
                    match joined {
                        Ok((half, Ok(()))) => idle_writer = Some(half),
                        Ok((_, Err(e))) => break 'session e,
                        Err(e) => break 'session TransportError::Io(std::io::Error::other(e)),
                    }
                }

                joined = join_slot(&mut reader_task), if reader_task.is_some() => {
                    reader_task = None;
                    match joined {
                        Ok((half, Ok(()))) => idle_reader = Some(half),
                        Ok((_, Err(e))) => break 'session e,
                        Err(e) => break 'session TransportError::Io(std::io::Error::other(e)),
                    }
                }

                () = self.send_queue.wait_available(), if writer_task.is_none() && idle_writer.is_some() => {
                    while let Some(request) = self.send_queue.try_pop() {
                        if request.cancel.is_cancelled() {
                            let _ = request.done.send(Err(TransportError::Cancelled));
                            continue;
                        }
                        let half = match idle_writer.take() {
                            Some(half) => half,
                            None => break,
                        };
                        writer_task = Some(tokio::spawn(process_write(
                            half,
                            request,
                            Arc::clone(&self.events),
                            self.shutdown.clone(),
                        )));
                        break;
                    }
                }

                () = self.read_queue.wait_available(), if reader_task.is_none() && idle_reader.is_some() => {
                    while let Some(request) = self.read_queue.try_pop() {
                        if request.cancel.is_cancelled() {
                            let _ = request.done.send(Err(TransportError::Cancelled));
                            continue;
                        }
                        let half = match idle_reader.take() {
                            Some(half) => half,
                            None => break,
                        };
                        reader_task = Some(tokio::spawn(process_read(
                            half,
                            request,
                            Arc::clone(&self.events),
                            self.shutdown.clone(),
                        )));
                        break;
                    }
                }
            }
        };

        // Abandoning an in-flight operation drops its half of the stream and
        // fails its request: with an I/O error from the operation itself, or
        // with a dropped completion the caller maps to a disconnect.
        if let Some(task) = writer_task.take() {
            task.abort();
        }
        if let Some(task) = reader_task.take() {
            task.abort();
        }

        Err(err)
    }

    /// Reconnect loop. Every attempt emits the attempt counter; the delay
    /// sequence restarts from the initial value each session.
    async fn establish(&self) -> Result<TransportStream> {
        let mut backoff = BackoffPolicy::from_options(&self.options);
        let mut attempt: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                return Err(TransportError::Disposed);
            }

            attempt += 1;
            self.events.emit_reconnection_attempt(attempt);

            match self.factory.connect().await {
                Ok(stream) => {
                    info!(endpoint = %self.endpoint, attempt, tls = stream.is_tls(), "connected");
                    return Ok(stream);
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    debug!(
                        endpoint = %self.endpoint,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "connect attempt failed"
                    );
                    tokio::select! {
                        () = self.shutdown.cancelled() => return Err(TransportError::Disposed),
                        () = sleep(delay) => {}
                    }
                }
            }
        }
    }
}

async fn join_slot<T>(
    slot: &mut Option<JoinHandle<T>>,
) -> std::result::Result<T, tokio::task::JoinError> {
    match slot.as_mut() {
        Some(task) => task.await,
        // Never polled: the empty slot disables the select branch.
        None => std::future::pending().await,
    }
}

/// Write one payload in full, then complete its request.
async fn process_write(
    mut half: WriteHalf<TransportStream>,
    request: WriteRequest,
    events: Arc<EventListeners>,
    shutdown: CancellationToken,
) -> (WriteHalf<TransportStream>, Result<()>) {
    events.emit_write_attempt(&request.payload);

    let io_result: std::io::Result<()> = async {
        half.write_all(&request.payload.buffer).await?;
        half.flush().await
    }
    .await;

    match io_result {
        Ok(()) => {
            debug!(
                correlation_id = request.payload.correlation_id,
                api_key = request.payload.api_key,
                bytes = request.payload.buffer.len(),
                "write complete"
            );
            let _ = request.done.send(Ok(request.payload));
            (half, Ok(()))
        }
        Err(_) if shutdown.is_cancelled() => {
            let _ = request.done.send(Err(TransportError::Disposed));
            (half, Err(TransportError::Disposed))
        }
        Err(e) => {
            // The buffer may have been partially transmitted; the caller
            // must not assume atomicity.
            let session_err = TransportError::Io(std::io::Error::new(e.kind(), e.to_string()));
            let _ = request.done.send(Err(TransportError::Io(e)));
            (half, Err(session_err))
        }
    }
}

/// Accumulate exactly `size` bytes, then complete the request. A short
/// buffer is never delivered: the request either gets all its bytes or
/// fails.
async fn process_read(
    mut half: ReadHalf<TransportStream>,
    request: ReadRequest,
    events: Arc<EventListeners>,
    shutdown: CancellationToken,
) -> (ReadHalf<TransportStream>, Result<()>) {
    let size = request.size as usize;
    let mut received = BytesMut::with_capacity(size.min(READ_CHUNK));
    let mut chunk = vec![0u8; size.min(READ_CHUNK)];

    while received.len() < size {
        let remaining = size - received.len();
        events.emit_read_attempt(remaining);
        let want = remaining.min(READ_CHUNK);

        tokio::select! {
            () = request.cancel.cancelled() => {
                let _ = request.done.send(Err(TransportError::Cancelled));
                // With bytes already consumed the stream position is
                // undefined, so the session must not survive.
                return if received.is_empty() {
                    (half, Ok(()))
                } else {
                    (half, Err(TransportError::ServerDisconnected))
                };
            }
            result = half.read(&mut chunk[..want]) => match result {
                Ok(0) => {
                    let _ = request.done.send(Err(TransportError::ServerDisconnected));
                    return (half, Err(TransportError::ServerDisconnected));
                }
                Ok(n) => {
                    events.emit_bytes_received(n);
                    received.extend_from_slice(&chunk[..n]);
                }
                Err(_) if shutdown.is_cancelled() => {
                    let _ = request.done.send(Err(TransportError::Disposed));
                    return (half, Err(TransportError::Disposed));
                }
                Err(e) => {
                    let session_err =
                        TransportError::Io(std::io::Error::new(e.kind(), e.to_string()));
                    let _ = request.done.send(Err(TransportError::Io(e)));
                    return (half, Err(session_err));
                }
            }
        }
    }

    debug!(bytes = received.len(), "read complete");
    let _ = request.done.send(Ok(received.freeze()));
    (half, Ok(()))
}
