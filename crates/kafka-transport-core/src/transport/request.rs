//! Request records flowing through the queues.

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// An outgoing buffer plus the metadata surfaced in observability events.
///
/// The buffer passes through the transport unchanged; `correlation_id`,
/// `api_key` and `message_count` are opaque to the transport itself.
#[derive(Debug, Clone)]
pub struct WritePayload {
    /// The bytes written to the socket, verbatim.
    pub buffer: Bytes,
    /// Correlation ID of the request the buffer encodes.
    pub correlation_id: i32,
    /// Kafka API key of the request the buffer encodes.
    pub api_key: i16,
    /// Number of application messages carried by the buffer.
    pub message_count: u32,
}

impl WritePayload {
    /// Bundle a buffer with its observability metadata.
    #[must_use]
    pub fn new(buffer: Bytes, correlation_id: i32, api_key: i16, message_count: u32) -> Self {
        Self {
            buffer,
            correlation_id,
            api_key,
            message_count,
        }
    }
}

/// A queued read of exactly `size` bytes.
pub(crate) struct ReadRequest {
    pub(crate) size: u32,
    pub(crate) done: oneshot::Sender<Result<Bytes>>,
    pub(crate) cancel: CancellationToken,
}

/// A queued write of one payload.
pub(crate) struct WriteRequest {
    pub(crate) payload: WritePayload,
    pub(crate) done: oneshot::Sender<Result<WritePayload>>,
    pub(crate) cancel: CancellationToken,
}
